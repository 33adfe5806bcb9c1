//! Amsel CLI - declarative UI binding compiler

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;

use amsel::error::FixSuggestion;
use amsel::{AmlError, Interface, Model};

#[derive(Parser)]
#[command(name = "amsel")]
#[command(about = "Amsel - declarative UI binding compiler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile markup units and report their binding plans
    Check {
        /// Paths to .aml.yaml files
        files: Vec<PathBuf>,

        /// Style sheet directory to load first
        #[arg(short, long)]
        styles: Option<PathBuf>,
    },

    /// Compile, instantiate, and dump the resulting tree as JSON
    Render {
        /// Path to an .aml.yaml file
        file: PathBuf,

        /// JSON file attached as the root datasource
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Style sheet directory to load first
        #[arg(short, long)]
        styles: Option<PathBuf>,
    },

    /// Create a starter project
    Init {
        /// Project name ('.' for the current directory)
        #[arg(default_value = ".")]
        name: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { files, styles } => check(&files, styles.as_deref()),
        Commands::Render { file, data, styles } => render(&file, data.as_deref(), styles.as_deref()),
        Commands::Init { name } => init(&name),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            if let Some(err) = e.downcast_ref::<AmlError>() {
                if let Some(suggestion) = err.fix_suggestion() {
                    eprintln!("  {} {}", "Fix:".yellow(), suggestion);
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn host(styles: Option<&std::path::Path>) -> anyhow::Result<Arc<Interface>> {
    let iface = Interface::new();
    if let Some(dir) = styles {
        let loaded = iface.styles().load_dir(dir)?;
        println!(
            "{} loaded {} style sheet(s) from {}",
            "→".cyan(),
            loaded,
            dir.display()
        );
        iface.add_search_path(dir);
    }
    Ok(iface)
}

fn check(files: &[PathBuf], styles: Option<&std::path::Path>) -> anyhow::Result<()> {
    if files.is_empty() {
        anyhow::bail!("no files given");
    }
    let iface = host(styles)?;
    let mut failed = 0usize;

    for file in files {
        if let Some(dir) = file.parent() {
            iface.add_search_path(dir);
        }
        match iface.load_file(file) {
            Ok(unit) => {
                let summary = unit.binding_summary();
                println!(
                    "{} {} — root {}, {} dispatcher group(s), {} channel(s), {} datasource, {} template",
                    "✓".green(),
                    file.display(),
                    unit.root_type_name().bold(),
                    summary.dispatcher_groups,
                    summary.channels,
                    summary.datasource,
                    summary.template,
                );
            }
            Err(e) => {
                failed += 1;
                println!("{} {} — {}", "✗".red(), file.display(), e);
                if let Some(suggestion) = e.fix_suggestion() {
                    println!("  {} {}", "Fix:".yellow(), suggestion);
                }
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} unit(s) failed to compile");
    }
    Ok(())
}

fn render(
    file: &std::path::Path,
    data: Option<&std::path::Path>,
    styles: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let iface = host(styles)?;
    if let Some(dir) = file.parent() {
        iface.add_search_path(dir);
    }

    let unit = iface.load_file(file)?;
    let root = unit.instantiate(&iface)?;

    if let Some(data_path) = data {
        let text = std::fs::read_to_string(data_path)?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        root.set_data_source(Some(Model::from_value("cli-data", value)));
    }

    println!("{}", serde_json::to_string_pretty(&root.dump())?);
    Ok(())
}

fn init(name: &str) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let result = amsel::init::init_project(name, &cwd)?;
    println!(
        "{} initialized project in {}",
        "✓".green(),
        result.project_dir.bold()
    );
    for file in &result.files_created {
        println!("  {} {}", "+".cyan(), file);
    }
    Ok(())
}
