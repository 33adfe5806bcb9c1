//! Instantiation compiler
//!
//! `Instantiator::compile` walks one markup element tree exactly once
//! and produces a reusable procedure: a small instruction tree for
//! construction plus a `WiringPlan` for the dataflow. `instantiate`
//! replays both against a fresh tree — compile once, instantiate
//! many, no re-parse.
//!
//! Compile stages run strictly in order: root declared, attributes
//! and style applied, children walked, template hooks emitted, named
//! bindings resolved, wiring emitted, sealed. Any compile-time error
//! aborts the whole unit; nothing partial is ever cached.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::warn;

use crate::address::{MemberAddress, Node, NodeAddress, TEMPLATE_ROOT_INDEX};
use crate::binding::{BindingDefinition, BindingTarget};
use crate::context::ParseContext;
use crate::convert;
use crate::error::AmlError;
use crate::expr::{self, BindingExpr};
use crate::handler::CompiledHandler;
use crate::interface::Interface;
use crate::interner::intern;
use crate::markup::{
    Element, ATTR_DATASOURCE_TYPE, ATTR_NAME, ATTR_STYLE, ATTR_TEMPLATE, ITEM_ATTR_DATA,
    ITEM_ATTR_DATA_TEST, ITEM_ATTR_DATA_TYPE, ITEM_ATTR_PATH, TAG_ITEM_TEMPLATE, TAG_TEMPLATE,
};
use crate::registry::{ContainerKind, MemberKind, ResolvedMember, TypeDescriptor, ValueKind};
use crate::style::DefaultsLoader;
use crate::widget::{Widget, WidgetRef};
use crate::wiring::{self, DataSourceWire, TemplateWire, WiringPlan};

/// Compiler progress, strictly ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CompileStage {
    RootDeclared,
    AttrsAndStyleApplied,
    ChildrenWalked,
    TemplateHooksEmitted,
    NamedBindingsResolved,
    WiringEmitted,
    Sealed,
}

/// Event handler attached during construction
#[derive(Debug)]
pub(crate) enum HandlerRef {
    /// Compiled assignment list, shared across units
    Inline(Arc<CompiledHandler>),
    /// Method name resolved on the runtime datasource when the event
    /// fires — duck-typed, non-fatal on miss
    Named(String),
}

/// One construction step
#[derive(Debug)]
pub(crate) enum Op {
    LoadTemplate { template: Arc<Instantiator> },
    AddItemTemplate { key: String, template: Arc<ItemTemplate> },
    ApplyDefaults { loader: Arc<DefaultsLoader> },
    SetLiteral { member: String, value: Value },
    AttachEvent { event: String, handler: HandlerRef },
    Child(ElementPlan),
}

/// Instruction subtree for one element
#[derive(Debug)]
pub(crate) struct ElementPlan {
    pub ty: Arc<TypeDescriptor>,
    pub address: NodeAddress,
    pub ops: Vec<Op>,
}

/// A compiled per-data-type row template for templated groups
#[derive(Debug)]
pub struct ItemTemplate {
    pub instantiator: Arc<Instantiator>,
    /// Key this template serves ("default" when unspecified)
    pub data_type: String,
    /// Datasource member items are fetched from, when declared
    pub fetch: Option<String>,
    /// Member tested on each item to select a template
    pub data_test: Option<String>,
}

/// Counts for tooling and the CLI `check` report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingSummary {
    pub dispatcher_groups: usize,
    pub channels: usize,
    pub datasource: usize,
    pub template: usize,
}

/// One compiled markup unit: the reusable instantiation procedure
#[derive(Debug)]
pub struct Instantiator {
    unit: String,
    plan: ElementPlan,
    wiring: WiringPlan,
    is_template: bool,
    stage: CompileStage,
}

impl Instantiator {
    /// Compile one markup unit. Errors surface wrapped with the unit
    /// name; a failed unit can never be instantiated.
    pub fn compile(
        iface: &Arc<Interface>,
        unit: &str,
        source: &Element,
    ) -> Result<Arc<Instantiator>, AmlError> {
        Compiler::run(iface, unit, source, false).map_err(|e| e.in_unit(unit))
    }

    /// Compile a template sub-unit: the root node gets the template
    /// sentinel index and `./` expressions wire to the runtime host.
    pub fn compile_template(
        iface: &Arc<Interface>,
        unit: &str,
        source: &Element,
    ) -> Result<Arc<Instantiator>, AmlError> {
        Compiler::run(iface, unit, source, true).map_err(|e| e.in_unit(unit))
    }

    /// Build one fresh tree. The construction pass completes before
    /// any binding fires.
    pub fn instantiate(&self, iface: &Arc<Interface>) -> Result<WidgetRef, AmlError> {
        let mut map: FxHashMap<NodeAddress, WidgetRef> = FxHashMap::default();
        let root = instantiate_plan(&self.plan, iface, &mut map)?;
        wiring::apply(&self.wiring, &map, &root, iface)?;
        Ok(root)
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn root_type_name(&self) -> &str {
        &self.plan.ty.name
    }

    pub fn is_template(&self) -> bool {
        self.is_template
    }

    pub fn stage(&self) -> CompileStage {
        self.stage
    }

    /// The synthesized dataflow — tooling-only introspection
    pub fn wiring(&self) -> &WiringPlan {
        &self.wiring
    }

    pub fn binding_summary(&self) -> BindingSummary {
        BindingSummary {
            dispatcher_groups: self.wiring.groups.len(),
            channels: self.wiring.groups.iter().map(|g| g.channels.len()).sum(),
            datasource: self.wiring.datasource.len(),
            template: self.wiring.template.len(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Compile walk
// ─────────────────────────────────────────────────────────────────

struct Compiler<'a> {
    iface: &'a Arc<Interface>,
    unit: &'a str,
    ctx: ParseContext,
    datasource_wires: Vec<DataSourceWire>,
    template_wires: Vec<TemplateWire>,
    is_template: bool,
    stage: CompileStage,
}

impl<'a> Compiler<'a> {
    fn run(
        iface: &'a Arc<Interface>,
        unit: &'a str,
        source: &Element,
        is_template: bool,
    ) -> Result<Arc<Instantiator>, AmlError> {
        let mut compiler = Compiler {
            iface,
            unit,
            ctx: ParseContext::new(),
            datasource_wires: Vec::new(),
            template_wires: Vec::new(),
            is_template,
            stage: CompileStage::RootDeclared,
        };

        let root_index = if is_template { TEMPLATE_ROOT_INDEX } else { 0 };
        let plan = compiler.compile_element(source, root_index, 1)?;
        compiler.stage = CompileStage::TemplateHooksEmitted;

        compiler.ctx.resolve_pending()?;
        compiler.stage = CompileStage::NamedBindingsResolved;

        let groups = wiring::synthesize_groups(&compiler.ctx, iface.registry());
        compiler.stage = CompileStage::WiringEmitted;

        Ok(Arc::new(Instantiator {
            unit: unit.to_string(),
            plan,
            wiring: WiringPlan {
                groups,
                datasource: compiler.datasource_wires,
                template: compiler.template_wires,
            },
            is_template,
            stage: CompileStage::Sealed,
        }))
    }

    fn compile_element(
        &mut self,
        element: &Element,
        index: i32,
        depth: usize,
    ) -> Result<ElementPlan, AmlError> {
        let limits = self.iface.limits().clone();
        if depth > limits.max_depth {
            return Err(AmlError::DepthExceeded {
                limit: limits.max_depth,
            });
        }

        let registry = Arc::clone(self.iface.registry());
        let ty = registry.require(&element.name)?;
        let container = registry.container_of(&ty.name);

        let mut node = Node::new(Arc::clone(&ty.name), index);
        if let Some(ds_ty) = element.get_attr(ATTR_DATASOURCE_TYPE) {
            node.datasource_type = Some(intern(ds_ty));
        }
        let datasource_type = node.datasource_type.clone();

        let mut ops: Vec<Op> = Vec::new();
        self.compile_templates(element, &ty, container, &mut ops)?;

        self.ctx.push(node);
        let address = self.ctx.current_address();

        // defaults and styling resolve to a cached loader at compile
        // time; instantiation replays pre-converted values
        let loader =
            self.iface
                .styles()
                .resolve_loader(&registry, element.get_attr(ATTR_STYLE), &ty)?;
        ops.push(Op::ApplyDefaults { loader });

        for (attr_name, attr_value) in &element.attrs {
            match attr_name.as_str() {
                ATTR_STYLE | ATTR_TEMPLATE | ATTR_DATASOURCE_TYPE => continue,
                ATTR_NAME => {
                    if !crate::markup::is_valid_name(attr_value) {
                        return Err(AmlError::MarkupShape {
                            detail: format!("'{attr_value}' is not a valid Name"),
                        });
                    }
                    self.ctx.register_name(attr_value.clone(), address.clone());
                    ops.push(Op::SetLiteral {
                        member: ATTR_NAME.to_string(),
                        value: Value::String(attr_value.clone()),
                    });
                    continue;
                }
                _ => {}
            }

            if attr_value.len() > limits.max_expression_len {
                return Err(AmlError::ExpressionTooLong {
                    limit: limits.max_expression_len,
                });
            }

            let member = registry
                .resolve_member(&ty.name, attr_name)
                .ok_or_else(|| AmlError::UnknownMember {
                    type_name: ty.name.to_string(),
                    member: attr_name.clone(),
                })?;

            match member_kind(&member) {
                MemberKind::Event => {
                    self.compile_event_attr(attr_name, attr_value, &mut ops)?
                }
                MemberKind::Property(kind) => match expr::strip_binding(attr_value) {
                    Some((inner, two_way)) => self.compile_binding(
                        &address,
                        attr_name,
                        kind,
                        inner,
                        two_way,
                        datasource_type.as_deref(),
                        &mut ops,
                    )?,
                    None => {
                        let value = convert::convert_literal(attr_value, &kind, &registry)?;
                        ops.push(Op::SetLiteral {
                            member: attr_name.clone(),
                            value,
                        });
                    }
                },
            }
        }
        if depth == 1 {
            self.stage = CompileStage::AttrsAndStyleApplied;
        }

        let mut child_index = 0i32;
        for child in &element.children {
            if child.name == TAG_TEMPLATE || child.name == TAG_ITEM_TEMPLATE {
                // reserved tags were consumed by compile_templates
                continue;
            }
            if container == ContainerKind::None {
                return Err(AmlError::MarkupShape {
                    detail: format!("'{}' cannot have children", ty.name),
                });
            }
            let plan = self.compile_element(child, child_index, depth + 1)?;
            ops.push(Op::Child(plan));
            child_index += 1;
        }
        if depth == 1 {
            self.stage = CompileStage::ChildrenWalked;
        }

        self.ctx.pop();
        Ok(ElementPlan { ty, address, ops })
    }

    /// Consume the reserved `Template`/`ItemTemplate` tags and the
    /// `Template` attribute; emit the corresponding load steps
    fn compile_templates(
        &mut self,
        element: &Element,
        ty: &Arc<TypeDescriptor>,
        container: ContainerKind,
        ops: &mut Vec<Op>,
    ) -> Result<(), AmlError> {
        let registry = self.iface.registry();
        let inline = element.children.iter().find(|c| c.name == TAG_TEMPLATE);
        let by_path = element.get_attr(ATTR_TEMPLATE);

        if container.is_templated() {
            let template = if let Some(tag) = inline {
                if tag.children.len() != 1 {
                    return Err(AmlError::ReservedTag {
                        tag: TAG_TEMPLATE.into(),
                        detail: "inline templates hold exactly one root element".into(),
                    });
                }
                Instantiator::compile_template(
                    self.iface,
                    &format!("{}#Template", self.unit),
                    &tag.children[0],
                )?
            } else if let Some(path) = by_path {
                self.iface.load_template(path)?
            } else if let Some(source) = registry.default_template_of(&ty.name) {
                self.iface
                    .compile_template_str(&format!("{}::default-template", ty.name), &source)?
            } else {
                return Err(AmlError::UnknownTemplate {
                    path: format!("<default template for {}>", ty.name),
                });
            };
            ops.push(Op::LoadTemplate { template });
        } else if inline.is_some() || by_path.is_some() {
            return Err(AmlError::ReservedTag {
                tag: TAG_TEMPLATE.into(),
                detail: format!("'{}' is not a templated type", ty.name),
            });
        }

        for tag in element
            .children
            .iter()
            .filter(|c| c.name == TAG_ITEM_TEMPLATE)
        {
            if container != ContainerKind::TemplatedGroup {
                return Err(AmlError::ReservedTag {
                    tag: TAG_ITEM_TEMPLATE.into(),
                    detail: format!("'{}' is not a templated group", ty.name),
                });
            }
            let data_type = tag
                .get_attr(ITEM_ATTR_DATA_TYPE)
                .unwrap_or("default")
                .to_string();
            let fetch = tag.get_attr(ITEM_ATTR_DATA).map(str::to_string);
            let data_test = tag.get_attr(ITEM_ATTR_DATA_TEST).map(str::to_string);

            let instantiator = if let Some(path) = tag.get_attr(ITEM_ATTR_PATH) {
                if !tag.children.is_empty() {
                    return Err(AmlError::ReservedTag {
                        tag: TAG_ITEM_TEMPLATE.into(),
                        detail: "an ItemTemplate with Path may not include sub nodes".into(),
                    });
                }
                self.iface.load_template(path)?
            } else {
                if tag.children.len() != 1 {
                    return Err(AmlError::ReservedTag {
                        tag: TAG_ITEM_TEMPLATE.into(),
                        detail: "item templates hold exactly one root element".into(),
                    });
                }
                Instantiator::compile_template(
                    self.iface,
                    &format!("{}#ItemTemplate[{data_type}]", self.unit),
                    &tag.children[0],
                )?
            };

            ops.push(Op::AddItemTemplate {
                key: data_type.clone(),
                template: Arc::new(ItemTemplate {
                    instantiator,
                    data_type,
                    fetch,
                    data_test,
                }),
            });
        }
        Ok(())
    }

    fn compile_event_attr(
        &mut self,
        event: &str,
        value: &str,
        ops: &mut Vec<Op>,
    ) -> Result<(), AmlError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AmlError::MalformedHandler {
                detail: format!("event '{event}' has an empty handler"),
            });
        }
        if trimmed.starts_with(expr::DELIM_OPEN) {
            if !trimmed.contains('=') {
                return Err(AmlError::MalformedHandler {
                    detail: format!(
                        "event '{event}' body has no assignments; use a named handler instead"
                    ),
                });
            }
            let handler = self.iface.compile_handler(trimmed)?;
            ops.push(Op::AttachEvent {
                event: event.to_string(),
                handler: HandlerRef::Inline(handler),
            });
        } else {
            // deferred: the method is looked up on the concrete
            // datasource met at runtime
            ops.push(Op::AttachEvent {
                event: event.to_string(),
                handler: HandlerRef::Named(trimmed.to_string()),
            });
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn compile_binding(
        &mut self,
        address: &NodeAddress,
        dest_member: &str,
        dest_kind: ValueKind,
        inner: &str,
        two_way: bool,
        datasource_type: Option<&str>,
        ops: &mut Vec<Op>,
    ) -> Result<(), AmlError> {
        let registry = self.iface.registry();
        let parsed = BindingExpr::parse(inner)?;

        // a quoted constant is not a binding at all
        if parsed.is_string_constant {
            let value = convert::convert_literal(&parsed.tokens[0], &dest_kind, registry)?;
            ops.push(Op::SetLiteral {
                member: dest_member.to_string(),
                value,
            });
            return Ok(());
        }

        // inside a template unit, `./` wires to the runtime host
        if parsed.is_template_binding() && self.is_template {
            self.template_wires.push(TemplateWire {
                dest: address.clone(),
                dest_member: dest_member.to_string(),
                dest_kind,
                search_name: parsed.search_name().map(str::to_string),
                chain: parsed.member_chain(),
                two_way,
            });
            return Ok(());
        }

        // `.Member` watches the current node itself
        if parsed.is_current_node_property() {
            self.ctx.add_definition(BindingDefinition {
                dest: MemberAddress::new(address.clone(), dest_member),
                dest_kind,
                target: BindingTarget::Resolved {
                    address: address.clone(),
                    member: parsed.member_chain(),
                },
                two_way,
            });
            return Ok(());
        }

        match address.resolve_expression(inner, registry)? {
            None => {
                // no fixed address: the node's runtime datasource
                let chain = parsed.full_chain();
                if let Some(ds_ty) = datasource_type {
                    if !chain.is_empty()
                        && registry.get(ds_ty).is_some()
                        && registry
                            .resolve_member(ds_ty, crate::path::head(&chain))
                            .is_none()
                    {
                        return Err(AmlError::UnknownMember {
                            type_name: ds_ty.to_string(),
                            member: chain,
                        });
                    }
                }
                self.datasource_wires.push(DataSourceWire {
                    owner: address.clone(),
                    dest_member: dest_member.to_string(),
                    dest_kind,
                    chain,
                    two_way,
                });
            }
            Some((prefix, final_segment)) => {
                let tokens: Vec<&str> = final_segment.split('.').collect();
                let target = if tokens.len() == 1 {
                    BindingTarget::Resolved {
                        address: prefix,
                        member: tokens[0].to_string(),
                    }
                } else if tokens[0].is_empty() {
                    BindingTarget::Resolved {
                        address: prefix,
                        member: tokens[1..].join("."),
                    }
                } else {
                    BindingTarget::PendingName {
                        name: tokens[0].to_string(),
                        partial: prefix,
                        member: tokens[1..].join("."),
                    }
                };
                self.ctx.add_definition(BindingDefinition {
                    dest: MemberAddress::new(address.clone(), dest_member),
                    dest_kind,
                    target,
                    two_way,
                });
            }
        }
        Ok(())
    }
}

fn member_kind(member: &ResolvedMember) -> MemberKind {
    if member.is_event() {
        MemberKind::Event
    } else {
        MemberKind::Property(member.value_kind().unwrap_or(ValueKind::Any))
    }
}

// ─────────────────────────────────────────────────────────────────
// Instantiation interpreter
// ─────────────────────────────────────────────────────────────────

fn instantiate_plan(
    plan: &ElementPlan,
    iface: &Arc<Interface>,
    map: &mut FxHashMap<NodeAddress, WidgetRef>,
) -> Result<WidgetRef, AmlError> {
    let widget = Widget::new(Arc::clone(&plan.ty), Arc::clone(iface.registry()));
    map.insert(plan.address.clone(), Arc::clone(&widget));

    for op in &plan.ops {
        match op {
            Op::LoadTemplate { template } => {
                let instance = template.instantiate(iface)?;
                widget.set_template_child(instance);
            }
            Op::AddItemTemplate { key, template } => {
                widget.add_item_template(key.clone(), Arc::clone(template));
            }
            Op::ApplyDefaults { loader } => {
                for (member, value) in &loader.entries {
                    widget.set_value(member, value.clone());
                }
            }
            Op::SetLiteral { member, value } => {
                widget.set_value(member, value.clone());
            }
            Op::AttachEvent { event, handler } => attach_event(&widget, event, handler),
            Op::Child(child_plan) => {
                let child = instantiate_plan(child_plan, iface, map)?;
                widget.attach_child(child)?;
            }
        }
    }
    Ok(widget)
}

fn attach_event(widget: &WidgetRef, event: &str, handler: &HandlerRef) {
    let weak = Arc::downgrade(widget);
    match handler {
        HandlerRef::Inline(compiled) => {
            let compiled = Arc::clone(compiled);
            widget.subscribe_event(event, move |_args| {
                if let Some(sender) = weak.upgrade() {
                    compiled.run(&sender);
                }
            });
        }
        HandlerRef::Named(method) => {
            let method = method.clone();
            widget.subscribe_event(event, move |args| {
                let Some(sender) = weak.upgrade() else {
                    return;
                };
                match sender.nearest_data_source() {
                    Some(ds) => {
                        if !ds.invoke(&method, &sender, args) {
                            warn!(
                                code = "AML-040",
                                method = method.as_str(),
                                "named handler absent on datasource; event ignored"
                            );
                        }
                    }
                    None => warn!(
                        code = "AML-040",
                        method = method.as_str(),
                        "no datasource for named handler; event ignored"
                    ),
                }
            });
        }
    }
}
