//! Schema graph: an arena of schema nodes plus a name index of definitions
//!
//! Schemas are lowered from OpenAPI / JSON Schema objects into [`SchemaNode`]s.
//! `$ref`s stay symbolic ([`SchemaKind::Reference`]) and are resolved by name
//! through the index, so self- and mutually-referential definitions never
//! form ownership cycles.

mod iterate;
mod parse;

pub use parse::Collection;

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::ErrorKind;
use crate::tag::SchemaTag;

/// Maximum reference chain followed when flattening properties.
pub(crate) const MAX_DEPTH: u32 = 20;

/// Handle to a node inside one [`SchemaGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(usize);

/// Declared scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Boolean,
    Integer,
    Number,
    String,
}

impl PrimitiveType {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "boolean" => Some(Self::Boolean),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "string" => Some(Self::String),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
        }
    }

    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Number)
    }
}

/// Shape of a schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    /// Scalar. `ty` is `None` when the schema declares no usable type.
    Primitive {
        ty: Option<PrimitiveType>,
        format: Option<String>,
    },
    Object {
        properties: BTreeMap<String, SchemaId>,
        required: BTreeSet<String>,
    },
    Array {
        item: SchemaId,
    },
    /// `allOf`: every part applies to the same object.
    Composite {
        parts: Vec<SchemaId>,
    },
    /// Named definition, resolved through the graph index.
    Reference {
        name: String,
    },
}

/// Validation keywords carried by a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: bool,
    pub exclusive_maximum: bool,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub pattern: Option<String>,
    pub enumeration: Vec<Value>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
}

impl Constraints {
    fn from_schema(schema: &Value) -> Self {
        let mut c = Self {
            minimum: schema.get("minimum").and_then(Value::as_f64),
            maximum: schema.get("maximum").and_then(Value::as_f64),
            min_length: schema.get("minLength").and_then(Value::as_u64),
            max_length: schema.get("maxLength").and_then(Value::as_u64),
            pattern: schema
                .get("pattern")
                .and_then(Value::as_str)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            enumeration: schema
                .get("enum")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            min_items: schema.get("minItems").and_then(Value::as_u64),
            max_items: schema.get("maxItems").and_then(Value::as_u64),
            ..Self::default()
        };
        // Swagger 2 / OpenAPI 3.0 use booleans, OpenAPI 3.1 uses the bound itself.
        match schema.get("exclusiveMinimum") {
            Some(Value::Bool(b)) => c.exclusive_minimum = *b,
            Some(Value::Number(n)) => {
                c.minimum = n.as_f64();
                c.exclusive_minimum = true;
            }
            _ => {}
        }
        match schema.get("exclusiveMaximum") {
            Some(Value::Bool(b)) => c.exclusive_maximum = *b,
            Some(Value::Number(n)) => {
                c.maximum = n.as_f64();
                c.exclusive_maximum = true;
            }
            _ => {}
        }
        c
    }
}

/// One node of the graph.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    kind: SchemaKind,
    constraints: Constraints,
    tag: Option<SchemaTag>,
    source: Value,
}

impl SchemaNode {
    #[must_use]
    pub fn kind(&self) -> &SchemaKind {
        &self.kind
    }

    #[must_use]
    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    #[must_use]
    pub fn tag(&self) -> Option<&SchemaTag> {
        self.tag.as_ref()
    }

    /// Whether the edge into this node is weak.
    #[must_use]
    pub fn is_weak(&self) -> bool {
        self.tag.as_ref().is_some_and(SchemaTag::is_weak)
    }

    /// The JSON this node was lowered from.
    #[must_use]
    pub fn source(&self) -> &Value {
        &self.source
    }

    #[must_use]
    pub fn pretty(&self) -> String {
        serde_json::to_string_pretty(&self.source).unwrap_or_default()
    }
}

/// Arena of schema nodes with an index of named definitions.
#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    nodes: Vec<SchemaNode>,
    index: BTreeMap<String, SchemaId>,
    definitions: Vec<(String, SchemaId)>,
}

impl SchemaGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a `name → schema` map of definitions.
    #[must_use]
    pub fn from_definitions(definitions: &serde_json::Map<String, Value>) -> Self {
        let mut graph = Self::new();
        for (name, schema) in definitions {
            graph.define(name, schema);
        }
        graph
    }

    /// Lower `schema` and register it under `name`.
    ///
    /// A second definition with the same name replaces the first in the index.
    pub fn define(&mut self, name: &str, schema: &Value) -> SchemaId {
        let id = self.add(schema);
        if self.index.insert(name.to_string(), id).is_some() {
            log::warn!("schema {name} defined more than once, using the last definition");
        }
        self.definitions.push((name.to_string(), id));
        id
    }

    /// Lower an anonymous schema (parameter or response schema).
    pub fn add(&mut self, schema: &Value) -> SchemaId {
        let kind = self.lower_kind(schema);
        self.nodes.push(SchemaNode {
            kind,
            constraints: Constraints::from_schema(schema),
            tag: SchemaTag::from_schema(schema),
            source: schema.clone(),
        });
        SchemaId(self.nodes.len() - 1)
    }

    fn lower_kind(&mut self, schema: &Value) -> SchemaKind {
        let Value::Object(obj) = schema else {
            return SchemaKind::Primitive {
                ty: None,
                format: None,
            };
        };

        if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
            return SchemaKind::Reference {
                name: reference_name(reference).to_string(),
            };
        }

        if let Some(all_of) = obj.get("allOf").and_then(Value::as_array) {
            if !all_of.is_empty() {
                let mut parts: Vec<SchemaId> = all_of.iter().map(|s| self.add(s)).collect();
                // Inline properties next to allOf behave like one more part.
                if obj.contains_key("properties") {
                    let mut rest = obj.clone();
                    rest.remove("allOf");
                    rest.remove("description");
                    rest.remove(crate::tag::TAG_EXTENSION);
                    parts.push(self.add(&Value::Object(rest)));
                }
                return SchemaKind::Composite { parts };
            }
        }

        let type_name = match obj.get("type") {
            Some(Value::String(t)) => Some(t.as_str()),
            // OpenAPI 3.1 nullable form: ["string", "null"]
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null"),
            _ => None,
        };

        match type_name {
            Some("object") => self.lower_object(obj),
            None if obj.contains_key("properties") => self.lower_object(obj),
            Some("array") => {
                let item = match obj.get("items") {
                    Some(items) => self.add(items),
                    None => self.add(&Value::Null),
                };
                SchemaKind::Array { item }
            }
            None if obj.contains_key("items") => {
                let item = self.add(&obj["items"]);
                SchemaKind::Array { item }
            }
            other => SchemaKind::Primitive {
                ty: other.and_then(PrimitiveType::from_name),
                format: obj
                    .get("format")
                    .and_then(Value::as_str)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string),
            },
        }
    }

    fn lower_object(&mut self, obj: &serde_json::Map<String, Value>) -> SchemaKind {
        let properties = obj
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, schema)| (name.clone(), self.add(schema)))
                    .collect()
            })
            .unwrap_or_default();
        let required = obj
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        SchemaKind::Object {
            properties,
            required,
        }
    }

    /// Node behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was produced by a different graph.
    #[must_use]
    pub fn node(&self, id: SchemaId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    /// Named definition, if registered.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<SchemaId> {
        self.index.get(name).copied()
    }

    /// Named definition or a `NotFound` error.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnresolvedReference`] for unknown names.
    pub fn resolve(&self, name: &str) -> Result<SchemaId, SchemaError> {
        self.lookup(name)
            .ok_or_else(|| SchemaError::UnresolvedReference(name.to_string()))
    }

    /// Every definition in registration order, duplicates included.
    #[must_use]
    pub fn definitions(&self) -> &[(String, SchemaId)] {
        &self.definitions
    }

    /// Definition names in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First-level named properties of a node.
    ///
    /// References are followed and composite parts are unioned; on a name
    /// clash the later part wins.
    #[must_use]
    pub fn properties(&self, id: SchemaId) -> BTreeMap<String, SchemaId> {
        self.properties_inner(id, 0)
    }

    fn properties_inner(&self, id: SchemaId, depth: u32) -> BTreeMap<String, SchemaId> {
        if depth > MAX_DEPTH {
            return BTreeMap::new();
        }
        match self.node(id).kind() {
            SchemaKind::Object { properties, .. } => properties.clone(),
            SchemaKind::Reference { name } => self
                .lookup(name)
                .map(|target| self.properties_inner(target, depth + 1))
                .unwrap_or_default(),
            SchemaKind::Composite { parts } => {
                let mut merged = BTreeMap::new();
                for &part in parts {
                    merged.extend(self.properties_inner(part, depth + 1));
                }
                merged
            }
            SchemaKind::Primitive { .. } | SchemaKind::Array { .. } => BTreeMap::new(),
        }
    }

    /// Follow references until a non-reference node.
    ///
    /// # Errors
    ///
    /// Fails on unknown names and on reference chains longer than the depth limit.
    pub fn dereference(&self, id: SchemaId) -> Result<SchemaId, SchemaError> {
        let mut current = id;
        for _ in 0..=MAX_DEPTH {
            match self.node(current).kind() {
                SchemaKind::Reference { name } => current = self.resolve(name)?,
                _ => return Ok(current),
            }
        }
        Err(SchemaError::ReferenceDepth(MAX_DEPTH))
    }
}

/// Last path segment of a `$ref`, e.g. `#/components/schemas/Pet` → `Pet`.
fn reference_name(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("schema and object don't match - {reason}\nSchema:\n{schema}\nObject:\n{object}")]
    Mismatch {
        reason: String,
        schema: String,
        object: String,
    },
    #[error("schema reference not found: {0}")]
    UnresolvedReference(String),
    #[error("schema reference chain deeper than {0}")]
    ReferenceDepth(u32),
}

impl SchemaError {
    pub(crate) fn mismatch(reason: impl Into<String>, node: &SchemaNode, object: &Value) -> Self {
        Self::Mismatch {
            reason: reason.into(),
            schema: node.pretty(),
            object: serde_json::to_string_pretty(object).unwrap_or_default(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Mismatch { .. } => ErrorKind::SchemaMismatch,
            Self::UnresolvedReference(_) => ErrorKind::NotFound,
            Self::ReferenceDepth(_) => ErrorKind::Invalid,
        }
    }
}
