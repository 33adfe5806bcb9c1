//! Inline event mini-handlers
//!
//! Event attributes may carry a restricted assignment list instead of
//! a named handler:
//!
//! ```yaml
//! Button: { Caption: "hide", MouseClick: "{/Panel.Visible=false; Caption='hidden'}" }
//! ```
//!
//! Grammar: statements split on `;`, each `lhs = rhs`. The left side
//! is `Member` (on the sender) or `name.Member` (on a named widget in
//! the sender's tree). The right side is a quoted string constant or a
//! literal converted to the member's kind when the handler fires.
//! No control flow — this is deliberately not a scripting language.
//!
//! Compiled handlers are cached by body text and shared across units.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::convert;
use crate::error::AmlError;
use crate::expr::QUOTE;
use crate::limits::CompileLimits;
use crate::widget::WidgetRef;

/// Assignment left side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignTarget {
    /// The widget the event fired on
    Sender,
    /// A named widget, searched from the sender's tree root
    Named(String),
}

/// One `lhs = rhs` statement
#[derive(Debug, Clone)]
pub struct Assign {
    pub target: AssignTarget,
    pub member: String,
    pub raw: String,
    pub quoted: bool,
}

/// A compiled, reusable assignment-list handler
#[derive(Debug)]
pub struct CompiledHandler {
    pub statements: Vec<Assign>,
    /// Original body, for tooling introspection
    pub source: String,
}

impl CompiledHandler {
    /// Parse a delimited handler body (`{a=1; b.c='x'}`)
    pub fn compile(text: &str, limits: &CompileLimits) -> Result<Arc<CompiledHandler>, AmlError> {
        let trimmed = text.trim();
        let body = trimmed
            .strip_prefix('{')
            .and_then(|t| t.strip_suffix('}'))
            .ok_or_else(|| AmlError::MalformedHandler {
                detail: format!("handler body must be brace-delimited: {trimmed}"),
            })?;

        let mut statements = Vec::new();
        for raw_stmt in body.split(';') {
            let stmt = raw_stmt.trim();
            if stmt.is_empty() {
                continue;
            }
            let (lhs, rhs) = stmt.split_once('=').ok_or_else(|| AmlError::MalformedHandler {
                detail: format!("expected 'member = value', found '{stmt}'"),
            })?;

            let lhs = lhs.trim();
            let rhs = rhs.trim();
            if lhs.is_empty() || rhs.is_empty() {
                return Err(AmlError::MalformedHandler {
                    detail: format!("empty side in '{stmt}'"),
                });
            }

            let (target, member) = match lhs.split('.').collect::<Vec<_>>()[..] {
                [member] => (AssignTarget::Sender, member.to_string()),
                [name, member] => (AssignTarget::Named(name.to_string()), member.to_string()),
                _ => {
                    return Err(AmlError::MalformedHandler {
                        detail: format!("left side must be 'Member' or 'name.Member': {lhs}"),
                    })
                }
            };

            let (raw, quoted) = match rhs.strip_prefix(QUOTE) {
                Some(rest) => {
                    let inner = rest.strip_suffix(QUOTE).ok_or_else(|| {
                        AmlError::UnterminatedLiteral {
                            expr: rhs.to_string(),
                        }
                    })?;
                    (inner.to_string(), true)
                }
                None => (rhs.to_string(), false),
            };

            statements.push(Assign {
                target,
                member,
                raw,
                quoted,
            });
        }

        if statements.len() > limits.max_handler_statements {
            return Err(AmlError::HandlerTooLong {
                count: statements.len(),
                limit: limits.max_handler_statements,
            });
        }
        if statements.is_empty() {
            return Err(AmlError::MalformedHandler {
                detail: "handler body has no statements".into(),
            });
        }

        Ok(Arc::new(CompiledHandler {
            statements,
            source: body.to_string(),
        }))
    }

    /// Execute against the widget the event fired on.
    ///
    /// Assignment failures degrade per-statement: one compiled handler
    /// may run against trees where a named widget is absent.
    pub fn run(&self, sender: &WidgetRef) {
        for assign in &self.statements {
            let target = match &assign.target {
                AssignTarget::Sender => Arc::clone(sender),
                AssignTarget::Named(name) => match tree_root(sender).find_by_name(name) {
                    Some(w) => w,
                    None => {
                        warn!(
                            code = "AML-040",
                            name = name.as_str(),
                            "handler target not found; statement skipped"
                        );
                        continue;
                    }
                },
            };

            let kind = match target
                .registry()
                .resolve_member(target.type_name(), &assign.member)
                .and_then(|m| m.value_kind())
            {
                Some(kind) => kind,
                None => {
                    warn!(
                        code = "AML-040",
                        member = assign.member.as_str(),
                        type_name = target.type_name(),
                        "handler member not found; statement skipped"
                    );
                    continue;
                }
            };

            let converted = if assign.quoted {
                convert::convert(&Value::String(assign.raw.clone()), &kind, target.registry())
            } else {
                convert::convert_literal(&assign.raw, &kind, target.registry())
            };
            match converted {
                Ok(value) => {
                    target.set_value(&assign.member, value);
                }
                Err(err) => warn!(
                    code = "AML-040",
                    member = assign.member.as_str(),
                    error = %err,
                    "handler value not convertible; statement skipped"
                ),
            }
        }
    }
}

/// Walk the rendered parents up to the tree root
pub fn tree_root(widget: &WidgetRef) -> WidgetRef {
    let mut current = Arc::clone(widget);
    while let Some(parent) = current.parent() {
        current = parent;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;
    use crate::widget::Widget;
    use serde_json::json;

    fn limits() -> CompileLimits {
        CompileLimits::default()
    }

    #[test]
    fn parses_sender_and_named_targets() {
        let h = CompiledHandler::compile("{Visible=false; Panel.Width=120}", &limits()).unwrap();
        assert_eq!(h.statements.len(), 2);
        assert_eq!(h.statements[0].target, AssignTarget::Sender);
        assert_eq!(
            h.statements[1].target,
            AssignTarget::Named("Panel".into())
        );
    }

    #[test]
    fn rejects_undelimited_and_malformed_bodies() {
        assert_eq!(
            CompiledHandler::compile("Visible=false", &limits())
                .unwrap_err()
                .code(),
            Some("AML-013")
        );
        assert_eq!(
            CompiledHandler::compile("{Visible}", &limits()).unwrap_err().code(),
            Some("AML-013")
        );
        assert_eq!(
            CompiledHandler::compile("{a.b.c=1}", &limits()).unwrap_err().code(),
            Some("AML-013")
        );
        assert_eq!(
            CompiledHandler::compile("{}", &limits()).unwrap_err().code(),
            Some("AML-013")
        );
    }

    #[test]
    fn statement_limit_enforced() {
        let tight = CompileLimits {
            max_handler_statements: 1,
            ..CompileLimits::default()
        };
        let err = CompiledHandler::compile("{A=1; B=2}", &tight).unwrap_err();
        assert_eq!(err.code(), Some("AML-051"));
    }

    #[test]
    fn run_assigns_with_conversion() {
        let registry = Arc::new(TypeRegistry::with_builtins());
        let stack = Widget::new(registry.get("Stack").unwrap(), Arc::clone(&registry));
        let button = Widget::new(registry.get("Button").unwrap(), Arc::clone(&registry));
        let label = Widget::new(registry.get("Label").unwrap(), Arc::clone(&registry));
        label.set_value("Name", json!("Status"));
        stack.attach_child(Arc::clone(&button)).unwrap();
        stack.attach_child(Arc::clone(&label)).unwrap();

        let h = CompiledHandler::compile(
            "{IsPressed=true; Status.Text='saved'; Status.FontSize=20}",
            &limits(),
        )
        .unwrap();
        h.run(&button);

        assert_eq!(button.get_value("IsPressed"), json!(true));
        assert_eq!(label.get_value("Text"), json!("saved"));
        assert_eq!(label.get_value("FontSize"), json!(20));
    }

    #[test]
    fn missing_named_target_degrades_gracefully() {
        let registry = Arc::new(TypeRegistry::with_builtins());
        let button = Widget::new(registry.get("Button").unwrap(), Arc::clone(&registry));
        let h =
            CompiledHandler::compile("{Ghost.Text='x'; IsPressed=true}", &limits()).unwrap();
        h.run(&button);
        // the miss was skipped, the rest still ran
        assert_eq!(button.get_value("IsPressed"), json!(true));
    }

    #[test]
    fn unterminated_quote_in_rhs() {
        let err = CompiledHandler::compile("{Text='oops}", &limits()).unwrap_err();
        assert_eq!(err.code(), Some("AML-011"));
    }
}
