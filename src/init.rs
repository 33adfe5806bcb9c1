//! Project initialization
//!
//! Creates a starter Amsel project: one markup unit, one style sheet,
//! and a manifest.

use anyhow::Result;
use std::fs;
use std::path::Path;

/// Initialize a new Amsel project
pub fn init_project(name: &str, path: &Path) -> Result<InitResult> {
    let project_dir = if name == "." {
        path.to_path_buf()
    } else {
        path.join(name)
    };

    let ui_dir = project_dir.join("ui");
    let styles_dir = project_dir.join("styles");

    if ui_dir.exists() {
        anyhow::bail!("ui/ directory already exists");
    }

    fs::create_dir_all(&ui_dir)?;
    fs::create_dir_all(&styles_dir)?;

    fs::write(ui_dir.join("main.aml.yaml"), MAIN_UNIT_TEMPLATE)?;
    fs::write(styles_dir.join("default.style.yaml"), STYLE_TEMPLATE)?;

    let manifest = project_dir.join("amsel.yaml");
    let manifest_content = MANIFEST_TEMPLATE.replace("{{name}}", &project_name(name, path));
    fs::write(&manifest, manifest_content)?;

    Ok(InitResult {
        project_dir: project_dir.display().to_string(),
        files_created: vec![
            "ui/".to_string(),
            "ui/main.aml.yaml".to_string(),
            "styles/".to_string(),
            "styles/default.style.yaml".to_string(),
            "amsel.yaml".to_string(),
        ],
    })
}

fn project_name(name: &str, path: &Path) -> String {
    if name == "." {
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("my-project")
            .to_string()
    } else {
        name.to_string()
    }
}

/// Result of project initialization
pub struct InitResult {
    pub project_dir: String,
    pub files_created: Vec<String>,
}

const MAIN_UNIT_TEMPLATE: &str = r#"# Main markup unit
# Check with: amsel check ui/main.aml.yaml

Window:
  Caption: "Hello"
  children:
    - Stack:
        Orientation: Vertical
        children:
          - TextBox: { Name: Input, Text: "type here" }
          - Label: { Text: "{../Input.Text}" }
          - Button:
              Caption: "Reset"
              MouseClick: "{Input.Text=''}"
"#;

const STYLE_TEMPLATE: &str = r#"# Default style sheet
Label:
  FontSize: "12"
Button:
  Height: "28"
"#;

const MANIFEST_TEMPLATE: &str = r#"# Amsel Project Manifest
name: {{name}}
version: 0.1.0
description: An Amsel UI project

# Default markup unit
main: ui/main.aml.yaml

# Style sheets directory
styles: styles/
"#;
