//! Type registry: the reflection substrate
//!
//! Widget types are data, not Rust types: a `TypeDescriptor` lists a
//! type's members, base type, container kind and default template.
//! Member lookup walks the base chain, falls back to the extension
//! registry, and memoizes both hits and misses in a concurrent map.
//! Caches are explicitly resettable for hot-reload and tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::AmlError;
use crate::interner::intern;
use crate::widget::Widget;

/// How a type stores markup children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// No children allowed
    None,
    /// Exactly one content child
    Single,
    /// Ordered child list
    Group,
    /// Template-expanded control with a single content slot
    Templated,
    /// Template-expanded control whose children are data items
    TemplatedGroup,
}

impl ContainerKind {
    pub fn is_templated(self) -> bool {
        matches!(self, ContainerKind::Templated | ContainerKind::TemplatedGroup)
    }
}

/// A declared enumeration, possibly combinable as flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDesc {
    pub name: Arc<str>,
    pub variants: Vec<String>,
    pub flags: bool,
}

impl EnumDesc {
    pub fn new(name: &str, variants: &[&str], flags: bool) -> Arc<Self> {
        Arc::new(Self {
            name: intern(name),
            variants: variants.iter().map(|v| v.to_string()).collect(),
            flags,
        })
    }

    /// Case-insensitive variant parse; flags split on ',' or '|' and
    /// re-join canonically with '|'
    pub fn parse(&self, text: &str) -> Result<String, AmlError> {
        let parts: Vec<&str> = if self.flags {
            text.split(|c| c == ',' || c == '|').collect()
        } else {
            vec![text]
        };

        let mut canonical = Vec::with_capacity(parts.len());
        for part in parts {
            let part = part.trim();
            let hit = self
                .variants
                .iter()
                .find(|v| v.eq_ignore_ascii_case(part))
                .ok_or_else(|| AmlError::BadEnumVariant {
                    literal: part.to_string(),
                    enum_name: self.name.to_string(),
                })?;
            canonical.push(hit.clone());
        }
        Ok(canonical.join("|"))
    }

    /// The enum's zero value: its first variant
    pub fn zero(&self) -> String {
        self.variants.first().cloned().unwrap_or_default()
    }
}

/// Declared kind of a property member's value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    /// Anything goes; no conversion applied
    Any,
    Bool,
    Int,
    Float,
    Str,
    Enum(Arc<EnumDesc>),
}

impl ValueKind {
    /// Tag used for conversion-registry keys and diagnostics
    pub fn tag(&self) -> &str {
        match self {
            ValueKind::Any => "any",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::Enum(e) => &e.name,
        }
    }

    /// The kind's zero value. String reads never produce null.
    pub fn zero(&self) -> Value {
        match self {
            ValueKind::Any => Value::Null,
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Int => Value::from(0i64),
            ValueKind::Float => Value::from(0.0f64),
            ValueKind::Str => Value::String(String::new()),
            ValueKind::Enum(e) => Value::String(e.zero()),
        }
    }
}

/// What a member is: a settable property or a subscribable event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberKind {
    Property(ValueKind),
    Event,
}

/// One declared member of a type
#[derive(Debug, Clone)]
pub struct MemberDesc {
    pub name: String,
    pub kind: MemberKind,
    /// Pre-converted default applied before styles
    pub default: Option<Value>,
}

/// One widget type: the unit of element-name resolution
#[derive(Debug)]
pub struct TypeDescriptor {
    pub name: Arc<str>,
    pub base: Option<Arc<str>>,
    /// `None` inherits the base's container kind
    pub container: Option<ContainerKind>,
    pub members: FxHashMap<String, MemberDesc>,
    /// Markup source of the type's default template, when templated
    pub default_template: Option<String>,
}

impl TypeDescriptor {
    pub fn builder(name: &str) -> TypeBuilder {
        TypeBuilder {
            name: intern(name),
            base: None,
            container: None,
            members: FxHashMap::default(),
            default_template: None,
        }
    }
}

/// Fluent construction for type descriptors
pub struct TypeBuilder {
    name: Arc<str>,
    base: Option<Arc<str>>,
    container: Option<ContainerKind>,
    members: FxHashMap<String, MemberDesc>,
    default_template: Option<String>,
}

impl TypeBuilder {
    pub fn base(mut self, base: &str) -> Self {
        self.base = Some(intern(base));
        self
    }

    pub fn container(mut self, kind: ContainerKind) -> Self {
        self.container = Some(kind);
        self
    }

    pub fn property(mut self, name: &str, kind: ValueKind) -> Self {
        self.members.insert(
            name.to_string(),
            MemberDesc {
                name: name.to_string(),
                kind: MemberKind::Property(kind),
                default: None,
            },
        );
        self
    }

    pub fn property_default(mut self, name: &str, kind: ValueKind, default: Value) -> Self {
        self.members.insert(
            name.to_string(),
            MemberDesc {
                name: name.to_string(),
                kind: MemberKind::Property(kind),
                default: Some(default),
            },
        );
        self
    }

    pub fn event(mut self, name: &str) -> Self {
        self.members.insert(
            name.to_string(),
            MemberDesc {
                name: name.to_string(),
                kind: MemberKind::Event,
                default: None,
            },
        );
        self
    }

    pub fn default_template(mut self, markup: &str) -> Self {
        self.default_template = Some(markup.to_string());
        self
    }

    pub fn build(self) -> Arc<TypeDescriptor> {
        Arc::new(TypeDescriptor {
            name: self.name,
            base: self.base,
            container: self.container,
            members: self.members,
            default_template: self.default_template,
        })
    }
}

/// Extension member: a computed property contributed from outside the
/// owning type, keyed `Owner.member` and matched along the base chain
pub struct ExtensionMember {
    pub owner: Arc<str>,
    pub name: String,
    pub kind: ValueKind,
    /// Lower value wins when several registrations share a key
    pub priority: u32,
    pub get: Arc<dyn Fn(&Widget) -> Value + Send + Sync>,
    pub set: Option<Arc<dyn Fn(&Widget, Value) + Send + Sync>>,
}

impl std::fmt::Debug for ExtensionMember {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionMember")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Outcome of a member lookup, memoized on hit and miss
#[derive(Debug, Clone)]
pub enum ResolvedMember {
    Declared {
        owner: Arc<str>,
        desc: MemberDesc,
    },
    Extension(Arc<ExtensionMember>),
}

impl ResolvedMember {
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            ResolvedMember::Declared {
                desc: MemberDesc {
                    kind: MemberKind::Event,
                    ..
                },
                ..
            }
        )
    }

    /// Declared value kind for properties; `None` for events
    pub fn value_kind(&self) -> Option<ValueKind> {
        match self {
            ResolvedMember::Declared { desc, .. } => match &desc.kind {
                MemberKind::Property(kind) => Some(kind.clone()),
                MemberKind::Event => None,
            },
            ResolvedMember::Extension(ext) => Some(ext.kind.clone()),
        }
    }
}

/// User-registered implicit conversion
pub type ConvertFn = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// The global resolution engine: types, extensions, conversions, and
/// the memoized member-lookup table
pub struct TypeRegistry {
    types: DashMap<Arc<str>, Arc<TypeDescriptor>>,
    extensions: DashMap<String, Vec<Arc<ExtensionMember>>>,
    conversions: DashMap<(String, String), ConvertFn>,
    member_memo: DashMap<(Arc<str>, String), Option<ResolvedMember>>,
    scan_count: AtomicUsize,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            types: DashMap::new(),
            extensions: DashMap::new(),
            conversions: DashMap::new(),
            member_memo: DashMap::new(),
            scan_count: AtomicUsize::new(0),
        }
    }

    /// Registry pre-populated with the builtin widget vocabulary
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        builtins::register(&registry);
        registry
    }

    pub fn register(&self, descriptor: Arc<TypeDescriptor>) {
        self.types.insert(Arc::clone(&descriptor.name), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.get(name).map(|t| Arc::clone(&t))
    }

    /// Resolve an element name or fail with the compile-time error
    pub fn require(&self, name: &str) -> Result<Arc<TypeDescriptor>, AmlError> {
        self.get(name).ok_or_else(|| AmlError::UnknownType {
            name: name.to_string(),
        })
    }

    /// Effective container kind, inherited along the base chain
    pub fn container_of(&self, name: &str) -> ContainerKind {
        let mut current = self.get(name);
        while let Some(desc) = current {
            if let Some(kind) = desc.container {
                return kind;
            }
            current = desc.base.as_deref().and_then(|b| self.get(b));
        }
        ContainerKind::None
    }

    /// Whether a type (or one of its bases) owns a template
    pub fn is_templated(&self, name: &str) -> bool {
        self.container_of(name).is_templated()
    }

    /// Default template source, inherited along the base chain
    pub fn default_template_of(&self, name: &str) -> Option<String> {
        let mut current = self.get(name);
        while let Some(desc) = current {
            if let Some(tmpl) = &desc.default_template {
                return Some(tmpl.clone());
            }
            current = desc.base.as_deref().and_then(|b| self.get(b));
        }
        None
    }

    /// True when `candidate` is `ancestor` or derives from it
    pub fn is_assignable(&self, candidate: &str, ancestor: &str) -> bool {
        let mut current = Some(candidate.to_string());
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self
                .get(&name)
                .and_then(|d| d.base.as_deref().map(str::to_string));
        }
        false
    }

    /// Register an extension member under `Owner.member`
    pub fn register_extension(&self, ext: ExtensionMember) {
        let key = format!("{}.{}", ext.owner, ext.name);
        let mut slot = self.extensions.entry(key).or_default();
        slot.push(Arc::new(ext));
        slot.sort_by_key(|e| e.priority);
        // extension sets may change what a pending miss would now find
        self.member_memo.clear();
    }

    /// Register an implicit conversion between two kind tags
    pub fn register_conversion(&self, from: &str, to: &str, f: ConvertFn) {
        self.conversions
            .insert((from.to_string(), to.to_string()), f);
    }

    pub fn find_conversion(&self, from: &str, to: &str) -> Option<ConvertFn> {
        self.conversions
            .get(&(from.to_string(), to.to_string()))
            .map(|f| Arc::clone(&f))
    }

    /// Name-based member lookup with hit/miss memoization.
    ///
    /// Declared instance members first (walking the base chain), then
    /// the extension registry in priority order.
    pub fn resolve_member(&self, type_name: &str, member: &str) -> Option<ResolvedMember> {
        let key = (intern(type_name), member.to_string());
        if let Some(cached) = self.member_memo.get(&key) {
            return cached.clone();
        }

        let resolved = self.scan_member(type_name, member);
        // concurrent miss-fills insert equal values; harmless
        self.member_memo.insert(key, resolved.clone());
        resolved
    }

    fn scan_member(&self, type_name: &str, member: &str) -> Option<ResolvedMember> {
        self.scan_count.fetch_add(1, Ordering::Relaxed);

        let mut chain = Vec::new();
        let mut current = self.get(type_name);
        while let Some(desc) = current {
            chain.push(Arc::clone(&desc));
            current = desc.base.as_deref().and_then(|b| self.get(b));
        }

        for desc in &chain {
            if let Some(found) = desc.members.get(member) {
                return Some(ResolvedMember::Declared {
                    owner: Arc::clone(&desc.name),
                    desc: found.clone(),
                });
            }
        }

        for desc in &chain {
            let key = format!("{}.{}", desc.name, member);
            if let Some(candidates) = self.extensions.get(&key) {
                if let Some(first) = candidates.first() {
                    return Some(ResolvedMember::Extension(Arc::clone(first)));
                }
            }
        }

        None
    }

    /// Number of real (non-memoized) member scans — test observability
    pub fn scan_count(&self) -> usize {
        self.scan_count.load(Ordering::Relaxed)
    }

    /// Drop memoized lookups (hot reload, tests)
    pub fn reset_caches(&self) {
        self.member_memo.clear();
    }
}

mod builtins {
    use super::*;

    const WINDOW_TEMPLATE: &str = r#"
Stack:
  Orientation: Vertical
  children:
    - Label: { Name: TitleBar, Text: "{./Caption}" }
    - Container: { Name: Content }
"#;

    const GROUPBOX_TEMPLATE: &str = r#"
Stack:
  Orientation: Vertical
  children:
    - Label: { Name: Heading, Text: "{./Caption}" }
    - Container: { Name: Content }
"#;

    const LISTBOX_TEMPLATE: &str = r#"
Stack:
  Orientation: Vertical
  children:
    - Stack: { Name: Items, Orientation: Vertical }
"#;

    /// The builtin widget vocabulary shared by the CLI and the tests
    pub fn register(registry: &TypeRegistry) {
        let orientation = EnumDesc::new("Orientation", &["Horizontal", "Vertical"], false);
        let anchor = EnumDesc::new("Anchor", &["None", "Left", "Right", "Top", "Bottom"], true);

        registry.register(
            TypeDescriptor::builder("Widget")
                .container(ContainerKind::None)
                .property("Name", ValueKind::Str)
                .property_default("Width", ValueKind::Int, Value::from(0i64))
                .property_default("Height", ValueKind::Int, Value::from(0i64))
                .property_default("Visible", ValueKind::Bool, Value::Bool(true))
                .property("Background", ValueKind::Str)
                .property("Tooltip", ValueKind::Str)
                .property("Tag", ValueKind::Any)
                .property_default(
                    "Anchors",
                    ValueKind::Enum(Arc::clone(&anchor)),
                    Value::String("None".into()),
                )
                .event("MouseClick")
                .event("MouseEnter")
                .event("MouseLeave")
                .build(),
        );

        registry.register(
            TypeDescriptor::builder("Label")
                .base("Widget")
                .property_default("Text", ValueKind::Str, Value::String(String::new()))
                .property_default("FontSize", ValueKind::Int, Value::from(12i64))
                .build(),
        );

        registry.register(
            TypeDescriptor::builder("TextBox")
                .base("Label")
                .event("TextChanged")
                .build(),
        );

        registry.register(
            TypeDescriptor::builder("Button")
                .base("Widget")
                .property_default("Caption", ValueKind::Str, Value::String(String::new()))
                .property_default("IsPressed", ValueKind::Bool, Value::Bool(false))
                .build(),
        );

        registry.register(
            TypeDescriptor::builder("Checkbox")
                .base("Widget")
                .property_default("IsChecked", ValueKind::Bool, Value::Bool(false))
                .property("Caption", ValueKind::Str)
                .event("Toggled")
                .build(),
        );

        registry.register(
            TypeDescriptor::builder("Slider")
                .base("Widget")
                .property_default("Value", ValueKind::Float, Value::from(0.0f64))
                .property_default("Minimum", ValueKind::Float, Value::from(0.0f64))
                .property_default("Maximum", ValueKind::Float, Value::from(100.0f64))
                .build(),
        );

        registry.register(
            TypeDescriptor::builder("Container")
                .base("Widget")
                .container(ContainerKind::Single)
                .build(),
        );

        registry.register(
            TypeDescriptor::builder("Group")
                .base("Widget")
                .container(ContainerKind::Group)
                .build(),
        );

        registry.register(
            TypeDescriptor::builder("Stack")
                .base("Group")
                .property_default(
                    "Orientation",
                    ValueKind::Enum(Arc::clone(&orientation)),
                    Value::String("Horizontal".into()),
                )
                .property_default("Gap", ValueKind::Int, Value::from(0i64))
                .build(),
        );

        registry.register(
            TypeDescriptor::builder("Window")
                .base("Widget")
                .container(ContainerKind::Templated)
                .property_default("Caption", ValueKind::Str, Value::String(String::new()))
                .property_default("Resizable", ValueKind::Bool, Value::Bool(true))
                .default_template(WINDOW_TEMPLATE)
                .build(),
        );

        registry.register(
            TypeDescriptor::builder("GroupBox")
                .base("Widget")
                .container(ContainerKind::Templated)
                .property_default("Caption", ValueKind::Str, Value::String(String::new()))
                .default_template(GROUPBOX_TEMPLATE)
                .build(),
        );

        registry.register(
            TypeDescriptor::builder("ListBox")
                .base("Widget")
                .container(ContainerKind::TemplatedGroup)
                .property("Data", ValueKind::Any)
                .property("SelectedItem", ValueKind::Any)
                .property_default("SelectedIndex", ValueKind::Int, Value::from(-1i64))
                .event("SelectedItemChanged")
                .default_template(LISTBOX_TEMPLATE)
                .build(),
        );
    }
}
