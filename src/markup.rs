//! Markup unit source model
//!
//! The compiler consumes an element tree: element = target type name,
//! attributes = member name → literal or binding expression, children
//! under the reserved `children:` key. The YAML carrier below is a
//! thin adapter; tokenizer specifics are not the compiler's concern.
//!
//! ```yaml
//! Window:
//!   Caption: "Demo"
//!   children:
//!     - Label: { Name: Title, Text: "{../Input.Text}" }
//!     - TextBox: { Name: Input, Text: "type here" }
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value as Yaml;

use crate::error::AmlError;
use crate::limits::CompileLimits;

/// Registered names must be identifiers: they appear in binding
/// expressions where `/` and `.` already carry meaning
static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Valid `Name:` attribute value
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

/// Reserved attribute: style key lookup
pub const ATTR_STYLE: &str = "Style";
/// Reserved attribute: widget name, registered for subtree search
pub const ATTR_NAME: &str = "Name";
/// Reserved attribute: template loaded by path
pub const ATTR_TEMPLATE: &str = "Template";
/// Reserved attribute: declared datasource type for compile-time checks
pub const ATTR_DATASOURCE_TYPE: &str = "DataSourceType";

/// Reserved tag: inline template declaration
pub const TAG_TEMPLATE: &str = "Template";
/// Reserved tag: per-data-type item template declaration
pub const TAG_ITEM_TEMPLATE: &str = "ItemTemplate";

/// ItemTemplate sub-attributes
pub const ITEM_ATTR_DATA_TYPE: &str = "DataType";
pub const ITEM_ATTR_DATA: &str = "Data";
pub const ITEM_ATTR_PATH: &str = "Path";
pub const ITEM_ATTR_DATA_TEST: &str = "DataTest";

/// Mapping key that holds child elements
pub const KEY_CHILDREN: &str = "children";

/// One markup element: type name, ordered attributes, child elements
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute, used heavily by tests
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    /// Builder-style child
    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Look up an attribute value by name
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parse one markup unit from YAML text
    pub fn from_yaml_str(source: &str, limits: &CompileLimits) -> Result<Element, AmlError> {
        let doc: Yaml = serde_yaml::from_str(source)?;
        let (name, body) = single_key_entry(&doc, "markup unit root")?;
        element_from_yaml(name, body, limits, 1)
    }

    /// Deepest nesting level of this element tree (root = 1)
    pub fn depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(Element::depth)
            .max()
            .unwrap_or(0)
    }
}

fn single_key_entry<'a>(value: &'a Yaml, what: &str) -> Result<(&'a str, &'a Yaml), AmlError> {
    let mapping = value.as_mapping().ok_or_else(|| AmlError::MarkupShape {
        detail: format!("{what} must be a single-key mapping"),
    })?;
    if mapping.len() != 1 {
        return Err(AmlError::MarkupShape {
            detail: format!("{what} must have exactly one key, found {}", mapping.len()),
        });
    }
    let (key, body) = mapping.iter().next().expect("len checked above");
    let name = key.as_str().ok_or_else(|| AmlError::MarkupShape {
        detail: format!("{what} key must be a string"),
    })?;
    Ok((name, body))
}

fn element_from_yaml(
    name: &str,
    body: &Yaml,
    limits: &CompileLimits,
    depth: usize,
) -> Result<Element, AmlError> {
    if depth > limits.max_depth {
        return Err(AmlError::DepthExceeded {
            limit: limits.max_depth,
        });
    }

    let mut element = Element::new(name);

    let mapping = match body {
        Yaml::Null => return Ok(element),
        Yaml::Mapping(m) => m,
        other => {
            return Err(AmlError::MarkupShape {
                detail: format!(
                    "element '{name}' body must be a mapping or empty, found {}",
                    yaml_kind(other)
                ),
            })
        }
    };

    for (key, value) in mapping {
        let key = key.as_str().ok_or_else(|| AmlError::MarkupShape {
            detail: format!("attribute names on '{name}' must be strings"),
        })?;

        if key == KEY_CHILDREN {
            let seq = value.as_sequence().ok_or_else(|| AmlError::MarkupShape {
                detail: format!("'children' of '{name}' must be a sequence"),
            })?;
            if seq.len() > limits.max_children {
                return Err(AmlError::MarkupShape {
                    detail: format!(
                        "'{name}' has {} children, limit is {}",
                        seq.len(),
                        limits.max_children
                    ),
                });
            }
            for entry in seq {
                let (child_name, child_body) =
                    single_key_entry(entry, &format!("child of '{name}'"))?;
                element
                    .children
                    .push(element_from_yaml(child_name, child_body, limits, depth + 1)?);
            }
            continue;
        }

        let text = match value {
            Yaml::String(s) => s.clone(),
            Yaml::Bool(b) => b.to_string(),
            Yaml::Number(n) => n.to_string(),
            Yaml::Null => String::new(),
            other => {
                return Err(AmlError::MarkupShape {
                    detail: format!(
                        "attribute '{key}' on '{name}' must be scalar, found {}",
                        yaml_kind(other)
                    ),
                })
            }
        };
        element.attrs.push((key.to_string(), text));
    }

    Ok(element)
}

fn yaml_kind(value: &Yaml) -> &'static str {
    match value {
        Yaml::Null => "null",
        Yaml::Bool(_) => "bool",
        Yaml::Number(_) => "number",
        Yaml::String(_) => "string",
        Yaml::Sequence(_) => "sequence",
        Yaml::Mapping(_) => "mapping",
        Yaml::Tagged(_) => "tagged value",
    }
}
