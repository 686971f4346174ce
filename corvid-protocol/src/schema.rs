/*!
Read-only schema introspection consumed by the [describe](crate::describe)
half of the codec.

The compiler hands the descriptor builder a snapshot of the schema expressed
as a small tree of type nodes, plus the per-query view shapes. Nodes are
reference counted, so cloning a [Type] or a [Schema] is cheap and the builder
can hold its own handle for the duration of a call.
*/

use std::collections::HashMap;
use std::sync::Arc;

use snafu::OptionExt;
use uuid::Uuid;

use crate::errors::{self, DescribeError};

/// Pointers projected on object views (and on link-property carriers),
/// keyed by node id.
pub type ViewShapes = HashMap<Uuid, Vec<Arc<Pointer>>>;

/// Per-view shape metadata, keyed by the view type id.
pub type ViewShapesMetadata = HashMap<Uuid, ViewShapeMetadata>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewShapeMetadata {
    /// Set when the compiler injected an `id` pointer into the view.
    pub has_implicit_id: bool,
}

/// A snapshot of the schema, indexed by type name.
#[derive(Debug, Clone)]
pub struct Schema {
    types: Arc<HashMap<String, Type>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Scalar(Arc<ScalarType>),
    Object(Arc<ObjectType>),
    Tuple(Arc<TupleType>),
    Array(Arc<ArrayType>),
    Range(Arc<RangeType>),
    Pseudo(Arc<PseudoType>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarType {
    pub id: Uuid,
    pub name: String,
    /// Topmost concrete base for derived scalars, `None` when this scalar
    /// is itself a base.
    pub base: Option<Arc<ScalarType>>,
    pub enum_values: Vec<String>,
    /// Material type when this node is a schema view.
    pub material: Option<Arc<ScalarType>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectType {
    pub id: Uuid,
    pub name: String,
    /// Material (non-view) type carrying the stable id, `None` when this
    /// node is not a view.
    pub material: Option<Arc<ObjectType>>,
    /// The pointer this view was reached through when projected as a link
    /// target. Link properties in the view shape attach to it.
    pub rptr: Option<Arc<Pointer>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleType {
    pub id: Uuid,
    pub name: String,
    /// `Some` for named tuples; parallel to `elements`.
    pub element_names: Option<Vec<String>>,
    pub elements: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayType {
    pub id: Uuid,
    pub name: String,
    pub element: Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeType {
    pub id: Uuid,
    pub name: String,
    pub element: Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoType {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Property,
    Link,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    pub id: Uuid,
    /// Short name, without the module prefix.
    pub name: String,
    pub kind: PointerKind,
    pub required: bool,
    pub multi: bool,
    pub target: Type,
}

impl Schema {
    pub fn new(types: impl IntoIterator<Item = Type>) -> Schema {
        let types = types
            .into_iter()
            .map(|t| (t.name().to_string(), t))
            .collect();
        Schema {
            types: Arc::new(types),
        }
    }
    pub fn get(&self, name: &str) -> Result<&Type, DescribeError> {
        self.types.get(name).context(errors::TypeNotFound { name })
    }
}

impl Type {
    pub fn id(&self) -> Uuid {
        use Type::*;
        match self {
            Scalar(t) => t.id,
            Object(t) => t.id,
            Tuple(t) => t.id,
            Array(t) => t.id,
            Range(t) => t.id,
            Pseudo(t) => t.id,
        }
    }
    pub fn name(&self) -> &str {
        use Type::*;
        match self {
            Scalar(t) => &t.name,
            Object(t) => &t.name,
            Tuple(t) => &t.name,
            Array(t) => &t.name,
            Range(t) => &t.name,
            Pseudo(t) => &t.name,
        }
    }
    /// Short kind name; collection content ids are seeded with it.
    pub fn schema_name(&self) -> &'static str {
        use Type::*;
        match self {
            Scalar(_) => "scalar",
            Object(_) => "object",
            Tuple(_) => "tuple",
            Array(_) => "array",
            Range(_) => "range",
            Pseudo(_) => "pseudo",
        }
    }
}

impl ScalarType {
    /// Resolve a view to its underlying material type.
    ///
    /// The returned schema supersedes the one passed in for subsequent
    /// lookups within the same call.
    pub fn material_type(self: &Arc<Self>, schema: &Schema) -> (Schema, Arc<ScalarType>) {
        match &self.material {
            Some(mt) => (schema.clone(), mt.clone()),
            None => (schema.clone(), self.clone()),
        }
    }
}

impl ObjectType {
    /// Resolve a view to its underlying material type.
    ///
    /// The returned schema supersedes the one passed in for subsequent
    /// lookups within the same call.
    pub fn material_type(self: &Arc<Self>, schema: &Schema) -> (Schema, Arc<ObjectType>) {
        match &self.material {
            Some(mt) => (schema.clone(), mt.clone()),
            None => (schema.clone(), self.clone()),
        }
    }
}

impl TupleType {
    pub fn is_named(&self) -> bool {
        self.element_names.is_some()
    }
}

impl Pointer {
    pub fn singular(&self) -> bool {
        !self.multi
    }
    pub fn is_property(&self) -> bool {
        matches!(self.kind, PointerKind::Property)
    }
    pub fn is_link(&self) -> bool {
        matches!(self.kind, PointerKind::Link)
    }
}
