//! Parse context: the depth-first compile accumulator
//!
//! One context lives for exactly one compile pass and is mutated by a
//! single thread. It owns the live node-address stack, the
//! per-source-member binding table, the name registry and the pending
//! (name-waiting) bindings.
//!
//! Two-phase resolution: bindings whose target address is already
//! determinable register directly (phase 1); bindings that search by
//! name wait until the whole tree and every `Name:` declaration is
//! known, then resolve in a single pass (phase 2).

use rustc_hash::FxHashMap;

use crate::address::{MemberAddress, Node, NodeAddress};
use crate::binding::{BindingDefinition, BindingTarget};
use crate::error::AmlError;
use crate::registry::ValueKind;

/// One fan-out destination in the binding table
#[derive(Debug, Clone)]
pub struct DestEntry {
    pub dest: MemberAddress,
    pub dest_kind: ValueKind,
    pub two_way: bool,
}

/// Watched member → destinations, per watched address
pub type MemberTable = FxHashMap<String, Vec<DestEntry>>;

/// Depth-first accumulator for one compile pass
#[derive(Default)]
pub struct ParseContext {
    stack: Vec<Node>,
    /// Watched address → member name → destinations
    pub bindings: FxHashMap<NodeAddress, MemberTable>,
    /// `Name:` declarations in document order
    pub names: Vec<(String, NodeAddress)>,
    /// Phase-2 work list
    pub unresolved: Vec<BindingDefinition>,
}

impl ParseContext {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────
    // Address stack
    // ─────────────────────────────────────────────────────────────

    pub fn push(&mut self, node: Node) {
        self.stack.push(node);
    }

    pub fn pop(&mut self) {
        self.stack.pop();
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Snapshot of the current stack as a node address
    pub fn current_address(&self) -> NodeAddress {
        NodeAddress::new(self.stack.clone())
    }

    // ─────────────────────────────────────────────────────────────
    // Phase 1
    // ─────────────────────────────────────────────────────────────

    pub fn register_name(&mut self, name: impl Into<String>, address: NodeAddress) {
        self.names.push((name.into(), address));
    }

    /// Route one definition: determinable targets register now,
    /// name-waiting ones queue for phase 2. Datasource bindings have
    /// no fixed address and never pass through the table.
    pub fn add_definition(&mut self, def: BindingDefinition) {
        match &def.target {
            BindingTarget::Resolved { address, member } => {
                let entry = DestEntry {
                    dest: def.dest.clone(),
                    dest_kind: def.dest_kind.clone(),
                    two_way: def.two_way,
                };
                self.register(address.clone(), member.clone(), entry);
            }
            BindingTarget::PendingName { .. } => self.unresolved.push(def),
            BindingTarget::DataSource { .. } => {
                unreachable!("datasource bindings bypass the parse-context table")
            }
        }
    }

    fn register(&mut self, address: NodeAddress, member: String, entry: DestEntry) {
        self.bindings
            .entry(address)
            .or_default()
            .entry(member)
            .or_default()
            .push(entry);
    }

    // ─────────────────────────────────────────────────────────────
    // Phase 2
    // ─────────────────────────────────────────────────────────────

    /// Resolve every pending binding against the completed name
    /// registry. Candidates are scanned in document order; the first
    /// whose address lies under the binding's known partial path wins,
    /// which keeps same-named nodes in sibling subtrees apart.
    pub fn resolve_pending(&mut self) -> Result<(), AmlError> {
        let pending = std::mem::take(&mut self.unresolved);
        for def in pending {
            let BindingTarget::PendingName {
                name,
                partial,
                member,
            } = &def.target
            else {
                unreachable!("only pending bindings are queued");
            };

            let found = self
                .names
                .iter()
                .find(|(n, addr)| n == name && addr.starts_with(partial))
                .map(|(_, addr)| addr.clone())
                .ok_or_else(|| AmlError::UnresolvedName { name: name.clone() })?;

            let entry = DestEntry {
                dest: def.dest.clone(),
                dest_kind: def.dest_kind.clone(),
                two_way: def.two_way,
            };
            self.register(found, member.clone(), entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::intern;

    fn node(ty: &str, index: i32) -> Node {
        Node::new(intern(ty), index)
    }

    fn def_pending(
        dest_addr: NodeAddress,
        name: &str,
        partial: NodeAddress,
    ) -> BindingDefinition {
        BindingDefinition {
            dest: MemberAddress::new(dest_addr, "Text"),
            dest_kind: ValueKind::Str,
            target: BindingTarget::PendingName {
                name: name.into(),
                partial,
                member: "Text".into(),
            },
            two_way: false,
        }
    }

    #[test]
    fn stack_tracks_addresses() {
        let mut ctx = ParseContext::new();
        ctx.push(node("Window", 0));
        ctx.push(node("Stack", 0));
        assert_eq!(ctx.depth(), 2);
        let addr = ctx.current_address();
        assert_eq!(addr.depth(), 2);
        ctx.pop();
        assert_eq!(ctx.depth(), 1);
        // snapshots are independent of later stack mutation
        assert_eq!(addr.depth(), 2);
    }

    #[test]
    fn resolved_bindings_register_immediately() {
        let mut ctx = ParseContext::new();
        let watched = NodeAddress::new(vec![node("Window", 0), node("Slider", 0)]);
        let dest = NodeAddress::new(vec![node("Window", 0), node("Label", 1)]);
        ctx.add_definition(BindingDefinition {
            dest: MemberAddress::new(dest, "Text"),
            dest_kind: ValueKind::Str,
            target: BindingTarget::Resolved {
                address: watched.clone(),
                member: "Value".into(),
            },
            two_way: false,
        });

        assert!(ctx.unresolved.is_empty());
        assert_eq!(ctx.bindings[&watched]["Value"].len(), 1);
    }

    #[test]
    fn sibling_subtrees_disambiguate_by_prefix() {
        let mut ctx = ParseContext::new();
        let root = NodeAddress::new(vec![node("Stack", 0)]);
        let subtree_a = root.pushed(node("Stack", 0));
        let subtree_b = root.pushed(node("Stack", 1));
        let caption_a = subtree_a.pushed(node("Label", 0));
        let caption_b = subtree_b.pushed(node("Label", 0));

        // B registers its Caption first: registration order must not
        // leak across subtrees
        ctx.register_name("Caption", caption_b.clone());
        ctx.register_name("Caption", caption_a.clone());

        let dest = subtree_a.pushed(node("Button", 1));
        ctx.add_definition(def_pending(dest, "Caption", subtree_a.clone()));
        ctx.resolve_pending().unwrap();

        assert!(ctx.bindings.contains_key(&caption_a));
        assert!(!ctx.bindings.contains_key(&caption_b));
    }

    #[test]
    fn repeated_resolution_is_deterministic() {
        let make = || {
            let mut ctx = ParseContext::new();
            let root = NodeAddress::new(vec![node("Stack", 0)]);
            let one = root.pushed(node("Label", 0));
            let two = root.pushed(node("Label", 1));
            ctx.register_name("Target", one);
            ctx.register_name("Target", two);
            ctx.add_definition(def_pending(
                root.pushed(node("Button", 2)),
                "Target",
                root.clone(),
            ));
            ctx.resolve_pending().unwrap();
            ctx.bindings.keys().next().unwrap().clone()
        };
        assert_eq!(make(), make());
    }

    #[test]
    fn unresolved_name_is_an_error() {
        let mut ctx = ParseContext::new();
        let root = NodeAddress::new(vec![node("Stack", 0)]);
        ctx.add_definition(def_pending(
            root.pushed(node("Button", 0)),
            "Ghost",
            root.clone(),
        ));
        let err = ctx.resolve_pending().unwrap_err();
        assert_eq!(err.code(), Some("AML-022"));
    }

    #[test]
    fn template_pending_restricted_by_sentinel_prefix() {
        // the sentinel prefix matches everything inside the template
        // unit's own context, and nothing else exists there
        let mut ctx = ParseContext::new();
        let tmpl_root = NodeAddress::new(vec![node("Stack", -1)]);
        let named = tmpl_root.pushed(node("Label", 0));
        ctx.register_name("Heading", named.clone());
        ctx.add_definition(def_pending(
            tmpl_root.pushed(node("Button", 1)),
            "Heading",
            NodeAddress::template_sentinel(),
        ));
        ctx.resolve_pending().unwrap();
        assert!(ctx.bindings.contains_key(&named));
    }
}
