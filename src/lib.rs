//! Amsel - declarative UI binding compiler
//!
//! Compiles a markup unit (elements = widget types, attributes =
//! member values or binding expressions) into a reusable
//! instantiation procedure: invoke it once per desired tree instance
//! and it constructs the tree, applies defaults and styling, and
//! wires all data and event bindings.

pub mod address;
pub mod binding;
pub mod context;
pub mod convert;
pub mod datasource;
pub mod error;
pub mod events;
pub mod expr;
pub mod handler;
pub mod init;
pub mod instantiator;
pub mod interface;
pub mod interner;
pub mod limits;
pub mod markup;
pub mod path;
pub mod registry;
pub mod style;
pub mod widget;
pub mod wiring;

pub use address::{MemberAddress, Node, NodeAddress};
pub use binding::{BindingDefinition, BindingTarget};
pub use context::ParseContext;
pub use datasource::{DataSource, DataSourceRef, Model};
pub use error::AmlError;
pub use expr::BindingExpr;
pub use instantiator::{BindingSummary, CompileStage, Instantiator, ItemTemplate};
pub use interface::Interface;
pub use limits::CompileLimits;
pub use markup::Element;
pub use registry::{ContainerKind, EnumDesc, MemberKind, TypeDescriptor, TypeRegistry, ValueKind};
pub use style::StyleStore;
pub use widget::{Widget, WidgetRef};
