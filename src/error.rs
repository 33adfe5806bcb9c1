//! Error types with fix suggestions

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Convenience alias used throughout the library
pub type Result<T> = std::result::Result<T, AmlError>;

/// All error variants are part of the public API.
/// Some variants are only constructed in library code/tests.
#[derive(Error, Debug)]
pub enum AmlError {
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Compile-time errors are surfaced wrapped with the markup unit
    /// they were found in. Nothing partial is cached for that unit.
    #[error("AML-001: compiling '{unit}' failed: {source}")]
    Compile {
        unit: String,
        #[source]
        source: Box<AmlError>,
    },

    // ─────────────────────────────────────────────────────────────
    // Syntax errors (AML-010 to AML-015)
    // ─────────────────────────────────────────────────────────────

    #[error("AML-010: malformed binding expression: {expr}")]
    MalformedExpression { expr: String },

    #[error("AML-011: unterminated string constant in binding expression: {expr}")]
    UnterminatedLiteral { expr: String },

    #[error("AML-012: '{expr}' climbs {levels} level(s) above the markup root")]
    AncestorOutOfRange { expr: String, levels: usize },

    #[error("AML-013: malformed event handler body: {detail}")]
    MalformedHandler { detail: String },

    #[error("AML-014: markup shape error: {detail}")]
    MarkupShape { detail: String },

    #[error("AML-015: reserved tag '{tag}' misused: {detail}")]
    ReservedTag { tag: String, detail: String },

    // ─────────────────────────────────────────────────────────────
    // Resolution errors (AML-020 to AML-025)
    // ─────────────────────────────────────────────────────────────

    #[error("AML-020: unknown element type '{name}'")]
    UnknownType { name: String },

    #[error("AML-021: member '{member}' not found on type '{type_name}'")]
    UnknownMember { type_name: String, member: String },

    #[error("AML-022: name '{name}' referenced by a binding was never declared in a matching subtree")]
    UnresolvedName { name: String },

    #[error("AML-023: expression '{expr}' targets a template root, but no ancestor is templated")]
    NoTemplatedAncestor { expr: String },

    #[error("AML-024: template '{path}' not found")]
    UnknownTemplate { path: String },

    #[error("AML-025: '{member}' is {actual}, expected {expected}")]
    MemberKindMismatch {
        member: String,
        actual: &'static str,
        expected: &'static str,
    },

    // ─────────────────────────────────────────────────────────────
    // Conversion errors (AML-030 to AML-032)
    // ─────────────────────────────────────────────────────────────

    #[error("AML-030: no conversion from {value} to {target}")]
    NoConversion { value: String, target: String },

    #[error("AML-031: literal '{literal}' is not a valid {target}")]
    BadLiteral { literal: String, target: String },

    #[error("AML-032: '{literal}' is not a variant of enum {enum_name}")]
    BadEnumVariant { literal: String, enum_name: String },

    // ─────────────────────────────────────────────────────────────
    // Runtime binding errors (AML-040) — non-fatal, logged
    // ─────────────────────────────────────────────────────────────

    #[error("AML-040: runtime binding degraded: {detail}")]
    RuntimeBinding { detail: String },

    // ─────────────────────────────────────────────────────────────
    // Limit violations (AML-050 to AML-052)
    // ─────────────────────────────────────────────────────────────

    #[error("AML-050: markup nesting exceeds the depth limit of {limit}")]
    DepthExceeded { limit: usize },

    #[error("AML-051: handler body has {count} statements, limit is {limit}")]
    HandlerTooLong { count: usize, limit: usize },

    #[error("AML-052: binding expression longer than {limit} bytes")]
    ExpressionTooLong { limit: usize },
}

impl AmlError {
    /// Wrap a compile-time error with the unit it came from.
    ///
    /// Already-wrapped errors pass through so nested template
    /// compilation keeps the innermost unit name.
    pub fn in_unit(self, unit: &str) -> AmlError {
        match self {
            AmlError::Compile { .. } => self,
            other => AmlError::Compile {
                unit: unit.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Stable `AML-0xx` code, if the variant carries one
    pub fn code(&self) -> Option<&'static str> {
        Some(match self {
            AmlError::Compile { .. } => "AML-001",
            AmlError::MalformedExpression { .. } => "AML-010",
            AmlError::UnterminatedLiteral { .. } => "AML-011",
            AmlError::AncestorOutOfRange { .. } => "AML-012",
            AmlError::MalformedHandler { .. } => "AML-013",
            AmlError::MarkupShape { .. } => "AML-014",
            AmlError::ReservedTag { .. } => "AML-015",
            AmlError::UnknownType { .. } => "AML-020",
            AmlError::UnknownMember { .. } => "AML-021",
            AmlError::UnresolvedName { .. } => "AML-022",
            AmlError::NoTemplatedAncestor { .. } => "AML-023",
            AmlError::UnknownTemplate { .. } => "AML-024",
            AmlError::MemberKindMismatch { .. } => "AML-025",
            AmlError::NoConversion { .. } => "AML-030",
            AmlError::BadLiteral { .. } => "AML-031",
            AmlError::BadEnumVariant { .. } => "AML-032",
            AmlError::RuntimeBinding { .. } => "AML-040",
            AmlError::DepthExceeded { .. } => "AML-050",
            AmlError::HandlerTooLong { .. } => "AML-051",
            AmlError::ExpressionTooLong { .. } => "AML-052",
            AmlError::YamlParse(_) | AmlError::Io(_) => return None,
        })
    }
}

impl FixSuggestion for AmlError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            AmlError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            AmlError::Io(_) => Some("Check file path and permissions"),
            AmlError::Compile { source, .. } => source.fix_suggestion(),

            AmlError::MalformedExpression { .. } => {
                Some("Use 'segments/separated/by/slashes' with an optional name.member tail")
            }
            AmlError::UnterminatedLiteral { .. } => {
                Some("Close the string constant: {'literal text'}")
            }
            AmlError::AncestorOutOfRange { .. } => {
                Some("Remove '../' segments until the path stays inside the markup unit")
            }
            AmlError::MalformedHandler { .. } => {
                Some("Handler bodies are assignment lists: {Member=value; other.Member=value}")
            }
            AmlError::MarkupShape { .. } => {
                Some("Each element is a single-key mapping; child elements go under 'children:'")
            }
            AmlError::ReservedTag { .. } => {
                Some("Template holds exactly one root element; ItemTemplate with Path has no body")
            }
            AmlError::UnknownType { .. } => {
                Some("Register the type before compiling, or fix the element name")
            }
            AmlError::UnknownMember { .. } => {
                Some("Check the member name against the type's declared and extension members")
            }
            AmlError::UnresolvedName { .. } => {
                Some("Declare Name: on the referenced element, inside the referencing subtree")
            }
            AmlError::NoTemplatedAncestor { .. } => {
                Some("'./' paths only work inside a Template of a templated control")
            }
            AmlError::UnknownTemplate { .. } => {
                Some("Check the Template path or register a default template for the type")
            }
            AmlError::MemberKindMismatch { .. } => {
                Some("Events take handler bodies or handler names; properties take values")
            }
            AmlError::NoConversion { .. } | AmlError::BadLiteral { .. } => {
                Some("Provide a value of the member's declared kind, or register a conversion")
            }
            AmlError::BadEnumVariant { .. } => {
                Some("Use a declared variant; flags combine with ',' or '|'")
            }
            AmlError::RuntimeBinding { .. } => {
                Some("The datasource lacks the bound member/handler; binding became a no-op")
            }
            AmlError::DepthExceeded { .. } => Some("Flatten the markup or raise CompileLimits"),
            AmlError::HandlerTooLong { .. } => {
                Some("Move the logic into a named datasource handler")
            }
            AmlError::ExpressionTooLong { .. } => Some("Shorten the binding expression"),
        }
    }
}
