//! Reference runtime object model
//!
//! The compiler only needs the interface surface: parent and logical
//! parent with change notification, child attach by container kind,
//! name-based subtree search, a per-instance value-changed channel and
//! a datasource slot. `Widget` is the data-driven implementation used
//! by the CLI and the tests: a property bag typed by its
//! `TypeDescriptor`.

use std::sync::{Arc, RwLock, Weak};

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::datasource::{DataSourceChange, DataSourceRef};
use crate::error::AmlError;
use crate::events::{Subscribers, Token, ValueChange};
use crate::instantiator::ItemTemplate;
use crate::registry::{ContainerKind, ResolvedMember, TypeDescriptor, TypeRegistry};

pub type WidgetRef = Arc<Widget>;

/// One instantiated node
pub struct Widget {
    descriptor: Arc<TypeDescriptor>,
    registry: Arc<TypeRegistry>,
    values: RwLock<FxHashMap<String, Value>>,
    parent: RwLock<Weak<Widget>>,
    logical_parent: RwLock<Weak<Widget>>,
    children: RwLock<Vec<WidgetRef>>,
    template_child: RwLock<Option<WidgetRef>>,
    item_templates: RwLock<FxHashMap<String, Arc<ItemTemplate>>>,
    datasource: RwLock<Option<DataSourceRef>>,
    value_changed: Subscribers<ValueChange>,
    datasource_changed: Subscribers<DataSourceChange>,
    logical_parent_changed: Subscribers<()>,
    events: RwLock<FxHashMap<String, Arc<Subscribers<Value>>>>,
}

impl Widget {
    pub fn new(descriptor: Arc<TypeDescriptor>, registry: Arc<TypeRegistry>) -> WidgetRef {
        Arc::new(Self {
            descriptor,
            registry,
            values: RwLock::new(FxHashMap::default()),
            parent: RwLock::new(Weak::new()),
            logical_parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
            template_child: RwLock::new(None),
            item_templates: RwLock::new(FxHashMap::default()),
            datasource: RwLock::new(None),
            value_changed: Subscribers::new(),
            datasource_changed: Subscribers::new(),
            logical_parent_changed: Subscribers::new(),
            events: RwLock::new(FxHashMap::default()),
        })
    }

    pub fn type_name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The widget's registered name, when it has one
    pub fn name(&self) -> Option<String> {
        match self.values.read().unwrap().get("Name") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Values
    // ─────────────────────────────────────────────────────────────

    /// Read a member. Unset members read as the declared kind's zero
    /// value; string reads never produce null.
    pub fn get_value(&self, member: &str) -> Value {
        if let Some(ResolvedMember::Extension(ext)) =
            self.registry.resolve_member(self.type_name(), member)
        {
            return (ext.get)(self);
        }

        let stored = self.values.read().unwrap().get(member).cloned();
        match stored {
            Some(v) if !v.is_null() => v,
            _ => self
                .registry
                .resolve_member(self.type_name(), member)
                .and_then(|m| m.value_kind())
                .map(|kind| kind.zero())
                .unwrap_or(Value::Null),
        }
    }

    /// Write a member. Writing the current value is a no-op and fires
    /// nothing — the loop-breaker for two-way bindings. Returns
    /// whether the value actually changed.
    pub fn set_value(&self, member: &str, value: Value) -> bool {
        if let Some(ResolvedMember::Extension(ext)) =
            self.registry.resolve_member(self.type_name(), member)
        {
            if let Some(set) = &ext.set {
                set(self, value.clone());
                self.value_changed.emit(&ValueChange {
                    member: member.to_string(),
                    value,
                });
                return true;
            }
        }

        {
            let mut values = self.values.write().unwrap();
            if values.get(member) == Some(&value) {
                return false;
            }
            values.insert(member.to_string(), value.clone());
        }
        self.value_changed.emit(&ValueChange {
            member: member.to_string(),
            value,
        });
        true
    }

    /// Raise a value-changed notification without a backing member
    /// ("propertyless binding")
    pub fn notify(&self, member: &str, value: Value) {
        self.value_changed.emit(&ValueChange {
            member: member.to_string(),
            value,
        });
    }

    pub fn value_changed(&self) -> &Subscribers<ValueChange> {
        &self.value_changed
    }

    // ─────────────────────────────────────────────────────────────
    // Tree structure
    // ─────────────────────────────────────────────────────────────

    pub fn parent(&self) -> Option<WidgetRef> {
        self.parent.read().unwrap().upgrade()
    }

    /// Binding/name-resolution owner; may differ from the rendered
    /// parent for template instances
    pub fn logical_parent(&self) -> Option<WidgetRef> {
        self.logical_parent.read().unwrap().upgrade()
    }

    pub fn set_logical_parent(&self, parent: Option<&WidgetRef>) {
        *self.logical_parent.write().unwrap() = match parent {
            Some(p) => Arc::downgrade(p),
            None => Weak::new(),
        };
        self.logical_parent_changed.emit(&());
    }

    pub fn logical_parent_changed(&self) -> &Subscribers<()> {
        &self.logical_parent_changed
    }

    pub fn children(&self) -> Vec<WidgetRef> {
        self.children.read().unwrap().clone()
    }

    pub fn template_child(&self) -> Option<WidgetRef> {
        self.template_child.read().unwrap().clone()
    }

    /// Install the instantiated template subtree
    pub fn set_template_child(self: &Arc<Self>, child: WidgetRef) {
        *child.parent.write().unwrap() = Arc::downgrade(self);
        *self.template_child.write().unwrap() = Some(Arc::clone(&child));
        child.set_logical_parent(Some(self));
    }

    /// Attach a markup child according to the container kind
    pub fn attach_child(self: &Arc<Self>, child: WidgetRef) -> Result<(), AmlError> {
        match self.registry.container_of(self.type_name()) {
            ContainerKind::None => {
                return Err(AmlError::MarkupShape {
                    detail: format!("'{}' cannot have children", self.type_name()),
                })
            }
            ContainerKind::Single => {
                let mut children = self.children.write().unwrap();
                children.clear();
                children.push(Arc::clone(&child));
            }
            ContainerKind::Group | ContainerKind::TemplatedGroup => {
                self.children.write().unwrap().push(Arc::clone(&child));
            }
            ContainerKind::Templated => {
                // content goes into the template's Content slot when
                // the template is already loaded
                let slot = self
                    .template_child()
                    .and_then(|t| t.find_by_name("Content"));
                match slot {
                    Some(content) => {
                        content.attach_child(Arc::clone(&child))?;
                        // the host stays the binding owner
                        *child.parent.write().unwrap() = Arc::downgrade(&content);
                        child.set_logical_parent(Some(self));
                        return Ok(());
                    }
                    None => self.children.write().unwrap().push(Arc::clone(&child)),
                }
            }
        }
        *child.parent.write().unwrap() = Arc::downgrade(self);
        child.set_logical_parent(Some(self));
        Ok(())
    }

    pub fn clear_children(&self) {
        self.children.write().unwrap().clear();
    }

    /// Depth-first search by registered name, template subtree included
    pub fn find_by_name(self: &Arc<Self>, name: &str) -> Option<WidgetRef> {
        if self.name().as_deref() == Some(name) {
            return Some(Arc::clone(self));
        }
        if let Some(t) = self.template_child() {
            if let Some(found) = t.find_by_name(name) {
                return Some(found);
            }
        }
        for child in self.children() {
            if let Some(found) = child.find_by_name(name) {
                return Some(found);
            }
        }
        None
    }

    // ─────────────────────────────────────────────────────────────
    // Datasource slot
    // ─────────────────────────────────────────────────────────────

    pub fn data_source(&self) -> Option<DataSourceRef> {
        self.datasource.read().unwrap().clone()
    }

    /// Nearest datasource walking the logical-parent chain
    pub fn nearest_data_source(self: &Arc<Self>) -> Option<DataSourceRef> {
        if let Some(ds) = self.data_source() {
            return Some(ds);
        }
        let mut current = self.logical_parent();
        while let Some(widget) = current {
            if let Some(ds) = widget.data_source() {
                return Some(ds);
            }
            current = widget.logical_parent();
        }
        None
    }

    /// Replace the datasource slot. Handlers fire synchronously, in
    /// registration order, before this returns.
    pub fn set_data_source(&self, ds: Option<DataSourceRef>) {
        let old = {
            let mut slot = self.datasource.write().unwrap();
            let old = slot.clone();
            let same = match (&old, &ds) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            };
            if same {
                return;
            }
            *slot = ds.clone();
            old
        };
        self.datasource_changed
            .emit(&DataSourceChange { old, new: ds });
    }

    pub fn datasource_changed(&self) -> &Subscribers<DataSourceChange> {
        &self.datasource_changed
    }

    // ─────────────────────────────────────────────────────────────
    // Events and item templates
    // ─────────────────────────────────────────────────────────────

    fn event_channel(&self, event: &str) -> Arc<Subscribers<Value>> {
        let mut events = self.events.write().unwrap();
        Arc::clone(
            events
                .entry(event.to_string())
                .or_insert_with(|| Arc::new(Subscribers::new())),
        )
    }

    pub fn subscribe_event(
        &self,
        event: &str,
        cb: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Token {
        self.event_channel(event).subscribe_fn(cb)
    }

    pub fn raise_event(&self, event: &str, args: Value) {
        self.event_channel(event).emit(&args);
    }

    pub fn add_item_template(&self, key: String, template: Arc<ItemTemplate>) {
        self.item_templates.write().unwrap().insert(key, template);
    }

    /// Datasource member a declared `Data` fetch pulls items from
    pub fn fetch_member(&self) -> Option<String> {
        self.item_templates
            .read()
            .unwrap()
            .values()
            .find_map(|t| t.fetch.clone())
    }

    /// Member tested on each data item to select its item template
    pub fn data_test_member(&self) -> Option<String> {
        self.item_templates
            .read()
            .unwrap()
            .values()
            .find_map(|t| t.data_test.clone())
    }

    pub fn item_template(&self, key: &str) -> Option<Arc<ItemTemplate>> {
        let templates = self.item_templates.read().unwrap();
        templates
            .get(key)
            .or_else(|| templates.get("default"))
            .cloned()
    }

    /// JSON dump of the instantiated tree (tooling/CLI)
    pub fn dump(&self) -> Value {
        let mut out = serde_json::Map::new();
        out.insert("type".into(), Value::String(self.type_name().to_string()));
        if let Some(name) = self.name() {
            out.insert("name".into(), Value::String(name));
        }
        let values = self.values.read().unwrap();
        if !values.is_empty() {
            let mut sorted: Vec<_> = values.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let map: serde_json::Map<String, Value> = sorted
                .into_iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            out.insert("values".into(), Value::Object(map));
        }
        drop(values);
        if let Some(t) = self.template_child() {
            out.insert("template".into(), t.dump());
        }
        let children = self.children();
        if !children.is_empty() {
            out.insert(
                "children".into(),
                Value::Array(children.iter().map(|c| c.dump()).collect()),
            );
        }
        Value::Object(out)
    }
}
