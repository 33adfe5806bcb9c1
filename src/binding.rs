//! Binding definitions
//!
//! One attribute with a `{ }` expression produces one
//! `BindingDefinition`: the attribute side (the destination that gets
//! initialized and updated) plus the watched side, which is either a
//! fixed tree address, a name still waiting for the post-walk lookup,
//! or the node's runtime datasource. The zero-length address doubles
//! as the template-host sentinel.

use crate::address::{MemberAddress, NodeAddress};
use crate::registry::ValueKind;

/// The watched side of a binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingTarget {
    /// Fixed tree address. The sentinel (empty) address targets the
    /// nearest templated host at runtime; `member` may be a dot chain.
    Resolved { address: NodeAddress, member: String },

    /// Awaits the phase-2 name-table lookup. `partial` is the resolved
    /// prefix the candidate must live under.
    PendingName {
        name: String,
        partial: NodeAddress,
        member: String,
    },

    /// No fixed address: mirrors a member chain of whatever occupies
    /// the node's datasource slot
    DataSource { chain: String },
}

/// One parsed binding attribute
#[derive(Debug, Clone)]
pub struct BindingDefinition {
    /// The attribute side: the member that receives pushed values
    pub dest: MemberAddress,
    /// Declared kind of the destination member, for conversion
    pub dest_kind: ValueKind,
    pub target: BindingTarget,
    pub two_way: bool,
}

impl BindingDefinition {
    pub fn is_pending(&self) -> bool {
        matches!(self.target, BindingTarget::PendingName { .. })
    }

    pub fn is_template_relative(&self) -> bool {
        matches!(
            &self.target,
            BindingTarget::Resolved { address, .. } if address.is_template_sentinel()
        )
    }
}
