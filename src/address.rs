//! Node address model
//!
//! A node address is the path of (type, sibling-index) pairs from the
//! markup root down to one node. Addresses are structural: equality
//! and hashing ignore everything but the (type, index) sequence, so
//! they serve as binding-table keys. The zero-length address is the
//! sentinel for "template-relative" — no fixed tree position.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::AmlError;
use crate::registry::TypeRegistry;

/// Sibling index marking a template root
pub const TEMPLATE_ROOT_INDEX: i32 = -1;

/// One element of a node address
#[derive(Debug, Clone)]
pub struct Node {
    /// Interned element type name
    pub type_name: Arc<str>,
    /// Index among the parent's markup children; −1 for a template root
    pub index: i32,
    /// Declared datasource type, when the element carries one
    pub datasource_type: Option<Arc<str>>,
}

impl Node {
    pub fn new(type_name: Arc<str>, index: i32) -> Self {
        Self {
            type_name,
            index,
            datasource_type: None,
        }
    }

    pub fn is_template_root(&self) -> bool {
        self.index == TEMPLATE_ROOT_INDEX
    }
}

// Structural identity is (type, index); the datasource override is
// carried along but never part of the key.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.type_name == other.type_name
    }
}
impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_name.as_ref().hash(state);
        self.index.hash(state);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.index)
    }
}

/// Root→target node path; the compile-time identity of one element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodeAddress(pub Vec<Node>);

impl NodeAddress {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self(nodes)
    }

    /// The sentinel for template-relative bindings
    pub fn template_sentinel() -> Self {
        Self(Vec::new())
    }

    pub fn is_template_sentinel(&self) -> bool {
        self.0.is_empty()
    }

    /// Document depth of the addressed node (root = 1)
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn last(&self) -> Option<&Node> {
        self.0.last()
    }

    /// Child address with the next node appended
    pub fn pushed(&self, node: Node) -> Self {
        let mut nodes = self.0.clone();
        nodes.push(node);
        Self(nodes)
    }

    /// Prefix of the first `len` nodes
    pub fn prefix(&self, len: usize) -> Self {
        Self(self.0[..len].to_vec())
    }

    /// True when `prefix` is a (non-strict) structural prefix of self
    pub fn starts_with(&self, prefix: &NodeAddress) -> bool {
        self.0.len() >= prefix.0.len()
            && self.0.iter().zip(prefix.0.iter()).all(|(a, b)| a == b)
    }

    /// Resolve the tree part of a binding expression against this
    /// address.
    ///
    /// Returns `None` for expressions with no `/` — those have no
    /// fixed address and bind against the runtime datasource.
    /// Otherwise returns the resolved prefix address plus the final,
    /// still-unparsed segment.
    pub fn resolve_expression<'e>(
        &self,
        expression: &'e str,
        registry: &TypeRegistry,
    ) -> Result<Option<(NodeAddress, &'e str)>, AmlError> {
        let segments: Vec<&str> = expression.split('/').collect();
        if segments.len() < 2 {
            return Ok(None);
        }

        let mut keep = self.0.len();
        let mut consumed = 0usize;

        if segments[0].is_empty() {
            // stay at the current node
            consumed = 1;
        } else if segments[0] == "." {
            // nearest ancestor whose type owns a template
            let mut ptr = self.0.len().checked_sub(1).unwrap_or(0);
            loop {
                if ptr == 0 {
                    return Err(AmlError::NoTemplatedAncestor {
                        expr: expression.to_string(),
                    });
                }
                ptr -= 1;
                if registry.is_templated(&self.0[ptr].type_name) {
                    break;
                }
            }
            keep = ptr + 1;
            consumed = 1;
        } else {
            let mut levels = 0usize;
            while consumed < segments.len() && segments[consumed] == ".." {
                levels += 1;
                consumed += 1;
            }
            if levels >= self.0.len() {
                return Err(AmlError::AncestorOutOfRange {
                    expr: expression.to_string(),
                    levels,
                });
            }
            keep = self.0.len() - levels;
        }

        if consumed != segments.len() - 1 {
            return Err(AmlError::MalformedExpression {
                expr: expression.to_string(),
            });
        }

        Ok(Some((self.prefix(keep), segments[segments.len() - 1])))
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<template>");
        }
        for (i, node) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{node}")?;
        }
        Ok(())
    }
}

/// A member on an addressed node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberAddress {
    pub address: NodeAddress,
    pub member: String,
}

impl MemberAddress {
    pub fn new(address: NodeAddress, member: impl Into<String>) -> Self {
        Self {
            address,
            member: member.into(),
        }
    }
}

impl fmt::Display for MemberAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.address, self.member)
    }
}
