//! Typed, hierarchical parameter model.
//!
//! A [`ParamTree`] owns a root [`Group`] of [`Field`]s and nested groups. Values
//! change only through [`ParamTree::set_value`], which validates the raw input,
//! stores it, and synchronously notifies every [`ChangeBus`] subscriber whose
//! scope contains the changed address.

mod bus;
mod error;
mod node;
mod path;
mod tree;
mod value;

pub use bus::{Change, ChangeBus, Observer, SubscriptionId};
pub use error::{ParamError, SchemaError, ValidationError, ValidationKind};
pub use node::{Choice, Constraint, Field, FieldBuilder, Group, Node, NumericRange};
pub use path::{InvalidPath, ParamPath};
pub use tree::{Nested, NodeRef, ParamTree, PresetReport};
pub use value::{Value, ValueType};

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Flat snapshot of every field, keyed by serialized name in declaration order.
pub type ParamMap = IndexMap<String, Value>;

/// The tree instance shared by the controller and a front-end.
pub type SharedTree = Arc<Mutex<ParamTree>>;

pub fn shared(tree: ParamTree) -> SharedTree {
    Arc::new(Mutex::new(tree))
}
