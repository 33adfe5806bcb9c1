//! Runtime binding wiring
//!
//! The compiler synthesizes a `WiringPlan` per unit; applying it to a
//! freshly constructed tree installs the three dataflow shapes:
//!
//! - **tree property bindings** — one value-changed dispatcher per
//!   unique watched address, testing the member name once and fanning
//!   out to every destination
//! - **datasource bindings** — re-armed on every datasource slot
//!   reassignment; two-way mode writes back through a token-keyed
//!   handler
//! - **template bindings** — keyed on the logical parent, re-armed
//!   whenever that relationship changes
//!
//! Wiring runs only after the construction pass is complete; initial
//! destination values are pushed here, not during construction. Shape
//! mismatches against concrete datasources degrade per-binding with a
//! log line, never fail the tree.

use std::sync::{Arc, Mutex, Weak};

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::address::NodeAddress;
use crate::context::ParseContext;
use crate::convert;
use crate::datasource::{DataSourceRef, Model};
use crate::error::AmlError;
use crate::events::Token;
use crate::interface::Interface;
use crate::path;
use crate::registry::{ContainerKind, TypeRegistry, ValueKind};
use crate::widget::{Widget, WidgetRef};

/// One fan-out destination of a dispatcher channel
#[derive(Debug, Clone)]
pub struct Dest {
    pub address: NodeAddress,
    pub member: String,
    pub kind: ValueKind,
    /// Initialize from the current source value at construction.
    /// False for the mirrored half of a two-way pair: the watched
    /// side wins the initial value.
    pub init: bool,
}

/// All destinations fed by one watched member
#[derive(Debug, Clone)]
pub struct Channel {
    pub member: String,
    pub dests: Vec<Dest>,
}

/// All channels of one watched node
#[derive(Debug, Clone)]
pub struct SourceGroup {
    pub source: NodeAddress,
    pub channels: Vec<Channel>,
}

/// A binding with no fixed address: mirrors the owner's datasource
#[derive(Debug, Clone)]
pub struct DataSourceWire {
    pub owner: NodeAddress,
    pub dest_member: String,
    pub dest_kind: ValueKind,
    /// Member chain on the datasource; empty mirrors the whole object
    pub chain: String,
    pub two_way: bool,
}

/// A binding from inside a template unit onto its runtime host
#[derive(Debug, Clone)]
pub struct TemplateWire {
    pub dest: NodeAddress,
    pub dest_member: String,
    pub dest_kind: ValueKind,
    /// Optional named widget looked up under the host
    pub search_name: Option<String>,
    /// Member chain on the host (or the named widget)
    pub chain: String,
    pub two_way: bool,
}

/// Everything the compiler emits besides the construction ops
#[derive(Debug, Default, Clone)]
pub struct WiringPlan {
    pub groups: Vec<SourceGroup>,
    pub datasource: Vec<DataSourceWire>,
    pub template: Vec<TemplateWire>,
}

impl WiringPlan {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.datasource.is_empty() && self.template.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────
// Synthesis (compile time)
// ─────────────────────────────────────────────────────────────────

/// Collapse the parse context's binding table into dispatcher groups.
///
/// Two-way entries expand into a mirrored destination on the opposite
/// group; the widget-level "same value → no event" rule breaks the
/// resulting cycle at runtime.
pub fn synthesize_groups(ctx: &ParseContext, registry: &TypeRegistry) -> Vec<SourceGroup> {
    let mut table: FxHashMap<NodeAddress, FxHashMap<String, Vec<Dest>>> = FxHashMap::default();

    for (watched, members) in &ctx.bindings {
        for (member, entries) in members {
            for entry in entries {
                table
                    .entry(watched.clone())
                    .or_default()
                    .entry(member.clone())
                    .or_default()
                    .push(Dest {
                        address: entry.dest.address.clone(),
                        member: entry.dest.member.clone(),
                        kind: entry.dest_kind.clone(),
                        init: true,
                    });

                if entry.two_way {
                    if member.contains('.') {
                        debug!(
                            member = member.as_str(),
                            "two-way skipped for chained tree member; forward-only"
                        );
                        continue;
                    }
                    let reverse_kind = watched
                        .last()
                        .and_then(|n| registry.resolve_member(&n.type_name, member))
                        .and_then(|m| m.value_kind())
                        .unwrap_or(ValueKind::Any);
                    table
                        .entry(entry.dest.address.clone())
                        .or_default()
                        .entry(entry.dest.member.clone())
                        .or_default()
                        .push(Dest {
                            address: watched.clone(),
                            member: member.clone(),
                            kind: reverse_kind,
                            init: false,
                        });
                }
            }
        }
    }

    let mut groups: Vec<SourceGroup> = table
        .into_iter()
        .map(|(source, channels)| {
            let mut channels: Vec<Channel> = channels
                .into_iter()
                .map(|(member, dests)| Channel { member, dests })
                .collect();
            channels.sort_by(|a, b| a.member.cmp(&b.member));
            SourceGroup { source, channels }
        })
        .collect();
    groups.sort_by_key(|g| g.source.to_string());
    groups
}

// ─────────────────────────────────────────────────────────────────
// Application (instantiation time)
// ─────────────────────────────────────────────────────────────────

/// Install every wire against a freshly constructed tree
pub fn apply(
    plan: &WiringPlan,
    map: &FxHashMap<NodeAddress, WidgetRef>,
    root: &WidgetRef,
    iface: &Arc<Interface>,
) -> Result<(), AmlError> {
    for group in &plan.groups {
        apply_group(group, map, iface)?;
    }
    for wire in &plan.datasource {
        apply_datasource_wire(wire, map, iface)?;
    }
    for wire in &plan.template {
        apply_template_wire(wire, map, root, iface)?;
    }
    install_item_expansion(map, iface);
    Ok(())
}

fn widget_at<'m>(
    map: &'m FxHashMap<NodeAddress, WidgetRef>,
    address: &NodeAddress,
) -> Result<&'m WidgetRef, AmlError> {
    map.get(address).ok_or_else(|| AmlError::RuntimeBinding {
        detail: format!("no widget at address {address}"),
    })
}

fn push_converted(
    dest: &Weak<Widget>,
    member: &str,
    kind: &ValueKind,
    value: &Value,
    registry: &TypeRegistry,
) {
    let Some(dest) = dest.upgrade() else {
        return;
    };
    match convert::convert(value, kind, registry) {
        Ok(converted) => {
            dest.set_value(member, converted);
        }
        Err(err) => warn!(
            code = "AML-030",
            member,
            error = %err,
            "binding push not convertible; skipped"
        ),
    }
}

/// Walk the remainder of a dot-chain against a freshly read head value
fn chained_value(head_value: &Value, member: &str) -> Value {
    match member.split_once('.') {
        None => head_value.clone(),
        Some((_, rest)) => path::resolve(head_value, rest).unwrap_or(Value::Null),
    }
}

/// One dispatcher per watched widget: test the member once, fan out
fn apply_group(
    group: &SourceGroup,
    map: &FxHashMap<NodeAddress, WidgetRef>,
    iface: &Arc<Interface>,
) -> Result<(), AmlError> {
    let source = widget_at(map, &group.source)?;
    let registry = Arc::clone(iface.registry());

    // resolve destinations once; the closure holds them weakly
    type RuntimeChannel = (String, Vec<(Weak<Widget>, String, ValueKind, bool)>);
    let channels: Arc<Vec<RuntimeChannel>> = Arc::new(
        group
            .channels
            .iter()
            .map(|channel| {
                let dests = channel
                    .dests
                    .iter()
                    .filter_map(|d| {
                        map.get(&d.address).map(|w| {
                            (Arc::downgrade(w), d.member.clone(), d.kind.clone(), d.init)
                        })
                    })
                    .collect();
                (channel.member.clone(), dests)
            })
            .collect(),
    );

    // destinations initialize from the current source values; the
    // mirrored half of a two-way pair only subscribes
    for (member, dests) in channels.iter() {
        let current = chained_value(&source.get_value(path::head(member)), member);
        for (dest, dest_member, kind, init) in dests {
            if *init {
                push_converted(dest, dest_member, kind, &current, &registry);
            }
        }
    }

    let dispatch = Arc::clone(&channels);
    source.value_changed().subscribe_fn(move |change| {
        for (member, dests) in dispatch.iter() {
            if path::head(member) != change.member {
                continue;
            }
            let value = chained_value(&change.value, member);
            for (dest, dest_member, kind, _) in dests {
                push_converted(dest, dest_member, kind, &value, &registry);
            }
        }
    });
    Ok(())
}

/// Datasource binding: unsubscribe old, initialize from new,
/// resubscribe; the datasource side wins the initial value
fn apply_datasource_wire(
    wire: &DataSourceWire,
    map: &FxHashMap<NodeAddress, WidgetRef>,
    iface: &Arc<Interface>,
) -> Result<(), AmlError> {
    let owner = widget_at(map, &wire.owner)?;
    let registry = Arc::clone(iface.registry());
    let state: Arc<Mutex<Option<(DataSourceRef, Token)>>> = Arc::new(Mutex::new(None));

    let weak_owner = Arc::downgrade(owner);
    let chain = wire.chain.clone();
    let dest_member = wire.dest_member.clone();
    let dest_kind = wire.dest_kind.clone();
    let arm_state = Arc::clone(&state);
    let arm_registry = Arc::clone(&registry);

    owner.datasource_changed().subscribe_fn(move |change| {
        {
            let mut slot = arm_state.lock().unwrap();
            if let Some((old, token)) = slot.take() {
                old.unsubscribe(token);
            }

            let Some(ds) = change.new.clone() else {
                return;
            };

            let sub_owner = weak_owner.clone();
            let sub_chain = chain.clone();
            let sub_member = dest_member.clone();
            let sub_kind = dest_kind.clone();
            let sub_registry = Arc::clone(&arm_registry);
            // weak: the datasource must not keep itself alive through
            // its own subscriber list
            let sub_ds = Arc::downgrade(&ds);
            let token = ds.subscribe(Arc::new(move |ds_change| {
                if !sub_chain.is_empty() && path::head(&sub_chain) != ds_change.member {
                    return;
                }
                let Some(ds) = sub_ds.upgrade() else {
                    return;
                };
                if let Some(value) = ds.get(&sub_chain) {
                    push_converted(&sub_owner, &sub_member, &sub_kind, &value, &sub_registry);
                }
            }));
            *slot = Some((ds, token));
        }

        // the destination re-initializes from the new object
        // immediately on assignment; the state lock is released first
        // so a two-way write-back cannot re-enter it
        let Some(ds) = change.new.clone() else {
            return;
        };
        match ds.get(&chain) {
            Some(value) => push_converted(
                &weak_owner,
                &dest_member,
                &dest_kind,
                &value,
                &arm_registry,
            ),
            None => debug!(
                code = "AML-040",
                chain = chain.as_str(),
                "datasource lacks bound member; binding idle until reassignment"
            ),
        }
    });

    if wire.two_way {
        let back_state = Arc::clone(&state);
        let member = wire.dest_member.clone();
        let ds_member = wire.chain.clone();
        owner.value_changed().subscribe_fn(move |change| {
            if change.member != member {
                return;
            }
            let ds = back_state
                .lock()
                .unwrap()
                .as_ref()
                .map(|(ds, _)| Arc::clone(ds));
            if let Some(ds) = ds {
                if !ds.set(&ds_member, change.value.clone()) {
                    warn!(
                        code = "AML-040",
                        member = ds_member.as_str(),
                        "two-way write-back target absent on datasource"
                    );
                }
            }
        });
    }
    Ok(())
}

/// Template binding: bound to the nearest templated logical ancestor,
/// re-armed whenever the template root's logical parent changes
fn apply_template_wire(
    wire: &TemplateWire,
    map: &FxHashMap<NodeAddress, WidgetRef>,
    root: &WidgetRef,
    iface: &Arc<Interface>,
) -> Result<(), AmlError> {
    let dest = widget_at(map, &wire.dest)?;
    let registry = Arc::clone(iface.registry());
    // (watched widget, its value-changed token) for precise
    // revocation; weak so the template instance never pins its host
    let state: Arc<Mutex<Option<(Weak<Widget>, Token)>>> = Arc::new(Mutex::new(None));

    let weak_dest = Arc::downgrade(dest);
    let weak_root = Arc::downgrade(root);
    let arm_wire = wire.clone();
    let arm_registry = Arc::clone(&registry);
    let arm_state = Arc::clone(&state);

    let arm = move |_: &()| {
        let watched = {
            let mut slot = arm_state.lock().unwrap();
            if let Some((old, token)) = slot.take() {
                if let Some(old) = old.upgrade() {
                    old.value_changed().unsubscribe(token);
                }
            }

            let Some(root) = weak_root.upgrade() else {
                return;
            };
            let Some(host) = nearest_templated_host(&root, &arm_registry) else {
                return;
            };
            let watched = match &arm_wire.search_name {
                Some(name) => match host.find_by_name(name) {
                    Some(w) => w,
                    None => {
                        warn!(
                            code = "AML-040",
                            name = name.as_str(),
                            "template binding target not found under host"
                        );
                        return;
                    }
                },
                None => host,
            };

            let sub_dest = weak_dest.clone();
            let sub_wire = arm_wire.clone();
            let sub_registry = Arc::clone(&arm_registry);
            let token = watched.value_changed().subscribe_fn(move |change| {
                if change.member != path::head(&sub_wire.chain) {
                    return;
                }
                let value = chained_value(&change.value, &sub_wire.chain);
                push_converted(
                    &sub_dest,
                    &sub_wire.dest_member,
                    &sub_wire.dest_kind,
                    &value,
                    &sub_registry,
                );
            });
            *slot = Some((Arc::downgrade(&watched), token));
            watched
        };

        // initial value flows host → template with the state lock
        // released, so a two-way write-back cannot re-enter it
        let current = chained_value(
            &watched.get_value(path::head(&arm_wire.chain)),
            &arm_wire.chain,
        );
        push_converted(
            &weak_dest,
            &arm_wire.dest_member,
            &arm_wire.dest_kind,
            &current,
            &arm_registry,
        );
    };

    // templates are reused across hosts: re-arm on every change of
    // the logical relationship
    root.logical_parent_changed().subscribe_fn(arm.clone());
    arm(&());

    if wire.two_way {
        let back_state = Arc::clone(&state);
        let member = wire.dest_member.clone();
        let host_member = path::head(&wire.chain).to_string();
        dest.value_changed().subscribe_fn(move |change| {
            if change.member != member {
                return;
            }
            let watched = back_state
                .lock()
                .unwrap()
                .as_ref()
                .and_then(|(w, _)| w.upgrade());
            if let Some(watched) = watched {
                watched.set_value(&host_member, change.value.clone());
            }
        });
    }
    Ok(())
}

fn nearest_templated_host(root: &WidgetRef, registry: &TypeRegistry) -> Option<WidgetRef> {
    let mut current = root.logical_parent();
    while let Some(widget) = current {
        if registry.container_of(widget.type_name()).is_templated() {
            return Some(widget);
        }
        current = widget.logical_parent();
    }
    None
}

/// Templated-group glue: watch `Data`, rebuild item rows per item
/// template; a declared fetch member pulls items off the datasource
fn install_item_expansion(map: &FxHashMap<NodeAddress, WidgetRef>, iface: &Arc<Interface>) {
    for widget in map.values() {
        if iface.registry().container_of(widget.type_name()) != ContainerKind::TemplatedGroup {
            continue;
        }

        let weak = Arc::downgrade(widget);
        let weak_iface = Arc::downgrade(iface);
        widget.value_changed().subscribe_fn(move |change| {
            if change.member != "Data" {
                return;
            }
            let (Some(group), Some(iface)) = (weak.upgrade(), weak_iface.upgrade()) else {
                return;
            };
            rebuild_items(&group, &change.value, &iface);
        });

        if let Some(fetch) = widget.fetch_member() {
            let weak = Arc::downgrade(widget);
            widget.datasource_changed().subscribe_fn(move |change| {
                let (Some(group), Some(ds)) = (weak.upgrade(), change.new.clone()) else {
                    return;
                };
                if let Some(items) = ds.get(&fetch) {
                    group.set_value("Data", items);
                }
            });
        }
    }
}

/// Drop and rebuild a templated group's rows from a data array
pub fn rebuild_items(group: &WidgetRef, data: &Value, iface: &Arc<Interface>) {
    group.clear_children();
    let Value::Array(items) = data else {
        if !data.is_null() {
            warn!(
                code = "AML-040",
                type_name = group.type_name(),
                "Data is not an array; items cleared"
            );
        }
        return;
    };

    for item in items {
        let key = item_key(group, item);
        let template = match group.item_template(&key) {
            Some(t) => t,
            None => {
                debug!(key = key.as_str(), "no item template; item skipped");
                continue;
            }
        };
        match template.instantiator.instantiate(iface) {
            Ok(row) => {
                if group.attach_child(Arc::clone(&row)).is_ok() {
                    row.set_logical_parent(Some(group));
                    row.set_data_source(Some(Model::from_value(
                        template.data_type.clone(),
                        item.clone(),
                    )));
                }
            }
            Err(err) => warn!(
                code = "AML-040",
                error = %err,
                "item template failed to instantiate; item skipped"
            ),
        }
    }
}

/// Template-selection key for one data item: the DataTest member when
/// declared, else the item's value kind
fn item_key(group: &WidgetRef, item: &Value) -> String {
    if let Some(test) = group.data_test_member() {
        if let Some(v) = path::resolve(item, &test) {
            if let Some(s) = v.as_str() {
                return s.to_string();
            }
            return v.to_string();
        }
    }
    convert::value_tag(item).to_string()
}
