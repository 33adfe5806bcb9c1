//! Binding expression parser
//!
//! One attribute value, already stripped of its `{ }` delimiter, is
//! parsed into a structured relative reference:
//!
//! - `'constant'`            string constant, not a binding
//! - `Member` / `a.b.c`      datasource member chain (no `/`)
//! - `/name.Member`          stay at current node, search `name` below it
//! - `../../name.Member`     climb ancestors, then search
//! - `./Member`              nearest template-owning ancestor
//!
//! The final `/`-segment is split on `.`: token[0] (possibly empty) is
//! an optional name to search for, remaining tokens form the member
//! chain.

use crate::error::AmlError;

/// Opening half of the binding delimiter
pub const DELIM_OPEN: char = '{';
/// Closing half of the binding delimiter
pub const DELIM_CLOSE: char = '}';
/// Two-way marker, first char inside the delimiter
pub const TWO_WAY_PREFIX: char = '^';
/// String-constant quote
pub const QUOTE: char = '\'';

/// True when an attribute value is delimited as a binding expression
pub fn is_binding(text: &str) -> bool {
    let t = text.trim();
    t.len() >= 2 && t.starts_with(DELIM_OPEN) && t.ends_with(DELIM_CLOSE)
}

/// Strip the delimiter and the optional two-way prefix.
///
/// Returns `(inner expression, two_way)`; `None` when the text is not
/// delimited at all.
pub fn strip_binding(text: &str) -> Option<(&str, bool)> {
    let t = text.trim();
    if !is_binding(t) {
        return None;
    }
    let inner = &t[DELIM_OPEN.len_utf8()..t.len() - DELIM_CLOSE.len_utf8()];
    match inner.strip_prefix(TWO_WAY_PREFIX) {
        Some(rest) => Some((rest, true)),
        None => Some((inner, false)),
    }
}

/// Parsed relative-path form of one binding expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingExpr {
    /// Levels to go up; −1 targets the nearest template-owning ancestor
    pub levels_up: i32,
    /// Final segment split on `.`; empty for the bare `{}` expression
    pub tokens: Vec<String>,
    /// Expression was a quoted string constant
    pub is_string_constant: bool,
}

impl BindingExpr {
    /// Parse one expression (delimiter and two-way prefix removed)
    pub fn parse(expression: &str) -> Result<BindingExpr, AmlError> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Ok(BindingExpr {
                levels_up: 0,
                tokens: Vec::new(),
                is_string_constant: false,
            });
        }

        let segments: Vec<&str> = expression.split('/').collect();

        if segments.len() == 1 {
            let seg = segments[0];
            if let Some(rest) = seg.strip_prefix(QUOTE) {
                return match rest.strip_suffix(QUOTE) {
                    Some(inner) => Ok(BindingExpr {
                        levels_up: 0,
                        tokens: vec![inner.to_string()],
                        is_string_constant: true,
                    }),
                    None => Err(AmlError::UnterminatedLiteral {
                        expr: expression.to_string(),
                    }),
                };
            }
            return Ok(BindingExpr {
                levels_up: 0,
                tokens: seg.split('.').map(str::to_string).collect(),
                is_string_constant: false,
            });
        }

        let mut levels_up = 0i32;
        let mut ptr = 0usize;
        if segments[0].is_empty() {
            // stay at the current node
            ptr = 1;
        } else if segments[0] == "." {
            levels_up = -1;
            ptr = 1;
        } else {
            while ptr < segments.len() && segments[ptr] == ".." {
                levels_up += 1;
                ptr += 1;
            }
        }

        if ptr != segments.len() - 1 {
            return Err(AmlError::MalformedExpression {
                expr: expression.to_string(),
            });
        }

        Ok(BindingExpr {
            levels_up,
            tokens: segments[ptr].split('.').map(str::to_string).collect(),
            is_string_constant: false,
        })
    }

    /// Bare `{}`: mirror the whole datasource object
    pub fn is_whole_datasource(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Targets the template root (expression began with `./`)
    pub fn is_template_binding(&self) -> bool {
        self.levels_up < 0
    }

    /// No level change and the expression was `.Member`
    pub fn is_current_node_property(&self) -> bool {
        self.levels_up == 0 && self.tokens.len() == 2 && self.tokens[0].is_empty()
    }

    /// No level change, single token — a datasource member when used
    /// as a property binding
    pub fn is_single_name(&self) -> bool {
        self.levels_up == 0 && self.tokens.len() == 1
    }

    /// Name to search for below the resolved node, when present
    pub fn search_name(&self) -> Option<&str> {
        match self.tokens.first() {
            Some(first) if self.tokens.len() > 1 && !first.is_empty() => Some(first),
            _ => None,
        }
    }

    /// Member chain after the optional search name
    pub fn member_chain(&self) -> String {
        if self.tokens.len() > 1 {
            self.tokens[1..].join(".")
        } else {
            self.tokens.first().cloned().unwrap_or_default()
        }
    }

    /// The whole final segment re-joined (datasource chains)
    pub fn full_chain(&self) -> String {
        self.tokens.join(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_two_way() {
        assert_eq!(strip_binding("{^IsChecked}"), Some(("IsChecked", true)));
        assert_eq!(strip_binding("{Text}"), Some(("Text", false)));
        assert_eq!(strip_binding("plain"), None);
        assert_eq!(strip_binding("{}"), Some(("", false)));
    }

    #[test]
    fn datasource_member_chain() {
        let e = BindingExpr::parse("price.amount").unwrap();
        assert_eq!(e.levels_up, 0);
        assert_eq!(e.tokens, vec!["price", "amount"]);
        assert!(!e.is_template_binding());
        assert_eq!(e.full_chain(), "price.amount");
    }

    #[test]
    fn single_name_predicate() {
        let e = BindingExpr::parse("Text").unwrap();
        assert!(e.is_single_name());
        assert!(!e.is_current_node_property());
    }

    #[test]
    fn current_node_property_predicate() {
        let e = BindingExpr::parse(".Width").unwrap();
        assert!(e.is_current_node_property());
        assert_eq!(e.member_chain(), "Width");
    }

    #[test]
    fn named_search_in_current_subtree() {
        let e = BindingExpr::parse("/Input.Text").unwrap();
        assert_eq!(e.levels_up, 0);
        assert_eq!(e.search_name(), Some("Input"));
        assert_eq!(e.member_chain(), "Text");
    }

    #[test]
    fn ancestor_levels_counted() {
        let e = BindingExpr::parse("../../Caption.Text").unwrap();
        assert_eq!(e.levels_up, 2);
        assert_eq!(e.search_name(), Some("Caption"));
    }

    #[test]
    fn template_binding_predicate() {
        let e = BindingExpr::parse("./Caption").unwrap();
        assert!(e.is_template_binding());
        assert_eq!(e.levels_up, -1);
        assert_eq!(e.tokens, vec!["Caption"]);
    }

    #[test]
    fn string_constant() {
        let e = BindingExpr::parse("'hello world'").unwrap();
        assert!(e.is_string_constant);
        assert_eq!(e.tokens, vec!["hello world"]);
    }

    #[test]
    fn unterminated_constant_rejected() {
        let err = BindingExpr::parse("'oops").unwrap_err();
        assert_eq!(err.code(), Some("AML-011"));
    }

    #[test]
    fn garbage_between_segments_rejected() {
        let err = BindingExpr::parse("../x/y").unwrap_err();
        assert_eq!(err.code(), Some("AML-010"));
        let err = BindingExpr::parse("a/").unwrap_err();
        assert_eq!(err.code(), Some("AML-010"));
    }

    #[test]
    fn whole_datasource_expression() {
        let e = BindingExpr::parse("").unwrap();
        assert!(e.is_whole_datasource());
    }
}
