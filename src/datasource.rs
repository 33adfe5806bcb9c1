//! Duck-typed datasource objects
//!
//! A datasource is whatever object currently occupies a node's
//! datasource slot. Bindings address its members by name at runtime;
//! one compiled unit may legitimately meet differently-shaped
//! datasources, so a missing member degrades that binding instead of
//! failing the tree.
//!
//! `Model` is the JSON-backed reference implementation used by the
//! CLI and the tests: a value tree plus named event handlers.

use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::events::{Subscribers, Token, ValueChange};
use crate::path;
use crate::widget::WidgetRef;

/// Shared handle to a datasource object
pub type DataSourceRef = Arc<dyn DataSource>;

/// Datasource slot reassignment notification
#[derive(Clone)]
pub struct DataSourceChange {
    pub old: Option<DataSourceRef>,
    pub new: Option<DataSourceRef>,
}

/// Named handler invoked by deferred event bindings
pub type NamedHandler = Arc<dyn Fn(&WidgetRef, &Value) + Send + Sync>;

/// The duck-typed surface bindings talk to
pub trait DataSource: Send + Sync {
    /// Declared type name, matched against `DataSourceType` overrides
    fn type_name(&self) -> &str;

    /// Read a member chain (`a.b.c`); empty chain = the whole object
    fn get(&self, chain: &str) -> Option<Value>;

    /// Write a top-level member (two-way bindings). Returns false when
    /// the object has no such member.
    fn set(&self, member: &str, value: Value) -> bool;

    /// Subscribe to member changes
    fn subscribe(&self, cb: Arc<dyn Fn(&ValueChange) + Send + Sync>) -> Token;

    fn unsubscribe(&self, token: Token) -> bool;

    /// Invoke a named handler. Returns false when absent.
    fn invoke(&self, method: &str, sender: &WidgetRef, args: &Value) -> bool;

    /// The whole current value (whole-object bindings, tooling)
    fn snapshot(&self) -> Value;
}

/// JSON-backed datasource with named handlers
pub struct Model {
    type_name: String,
    root: RwLock<Value>,
    handlers: RwLock<FxHashMap<String, NamedHandler>>,
    changed: Subscribers<ValueChange>,
}

impl Model {
    pub fn new(type_name: impl Into<String>) -> Arc<Self> {
        Self::from_value(type_name, Value::Object(Default::default()))
    }

    /// Wrap any JSON value; non-objects still bind via the empty chain
    pub fn from_value(type_name: impl Into<String>, root: Value) -> Arc<Self> {
        Arc::new(Self {
            type_name: type_name.into(),
            root: RwLock::new(root),
            handlers: RwLock::new(FxHashMap::default()),
            changed: Subscribers::new(),
        })
    }

    /// Register a named handler for deferred event bindings
    pub fn on(self: &Arc<Self>, method: &str, handler: NamedHandler) -> Arc<Self> {
        self.handlers
            .write()
            .unwrap()
            .insert(method.to_string(), handler);
        Arc::clone(self)
    }

    /// Write a member and notify subscribers.
    ///
    /// Setting a member to its current value is a no-op and fires
    /// nothing — this is the loop-breaker for two-way bindings.
    pub fn set_member(&self, member: &str, value: Value) -> bool {
        {
            let mut root = self.root.write().unwrap();
            let obj = match root.as_object_mut() {
                Some(obj) => obj,
                None => return false,
            };
            if obj.get(member) == Some(&value) {
                return true;
            }
            obj.insert(member.to_string(), value.clone());
        }
        self.changed.emit(&ValueChange {
            member: member.to_string(),
            value,
        });
        true
    }
}

impl DataSource for Model {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn get(&self, chain: &str) -> Option<Value> {
        let root = self.root.read().unwrap();
        if chain.is_empty() {
            return Some(root.clone());
        }
        path::resolve(&root, chain)
    }

    fn set(&self, member: &str, value: Value) -> bool {
        self.set_member(member, value)
    }

    fn subscribe(&self, cb: Arc<dyn Fn(&ValueChange) + Send + Sync>) -> Token {
        self.changed.subscribe(cb)
    }

    fn unsubscribe(&self, token: Token) -> bool {
        self.changed.unsubscribe(token)
    }

    fn invoke(&self, method: &str, sender: &WidgetRef, args: &Value) -> bool {
        let handler = self.handlers.read().unwrap().get(method).cloned();
        match handler {
            Some(h) => {
                h(sender, args);
                true
            }
            None => false,
        }
    }

    fn snapshot(&self) -> Value {
        self.root.read().unwrap().clone()
    }
}
