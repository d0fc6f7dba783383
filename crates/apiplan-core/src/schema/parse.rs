//! Structural matching of JSON objects against schema nodes
//!
//! [`SchemaGraph::parses`] checks an object against a node and, along the way,
//! collects every sub-object that belongs to a named definition (and every
//! tagged scalar) into a [`Collection`].

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::{MAX_DEPTH, PrimitiveType, SchemaError, SchemaGraph, SchemaId, SchemaKind};

/// Objects collected during parsing, keyed by definition name or tag slot.
pub type Collection = BTreeMap<String, Vec<Value>>;

/// Objects and composites must account for at least 3/4 of the object's fields.
fn enough_fields(matched: usize, total: usize) -> bool {
    matched * 4 >= total * 3
}

impl SchemaGraph {
    /// Whether `object` parses against `id`, following references.
    #[must_use]
    pub fn matches(&self, id: SchemaId, object: &Value) -> bool {
        self.parses(id, "", object, &mut Collection::new(), true)
            .is_ok()
    }

    /// Check `object` against `id` and collect named sub-objects.
    ///
    /// `name` is the key the whole object is recorded under on success (empty
    /// for anonymous positions). With `follow_ref` false a reference succeeds
    /// as soon as its target resolves, without descending.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Mismatch`] with the reason and both sides
    /// pretty-printed, or [`SchemaError::UnresolvedReference`] when a `$ref`
    /// names an unknown definition.
    pub fn parses(
        &self,
        id: SchemaId,
        name: &str,
        object: &Value,
        collection: &mut Collection,
        follow_ref: bool,
    ) -> Result<(), SchemaError> {
        self.parses_inner(id, name, object, collection, follow_ref, 0)
    }

    fn parses_inner(
        &self,
        id: SchemaId,
        name: &str,
        object: &Value,
        collection: &mut Collection,
        follow_ref: bool,
        depth: u32,
    ) -> Result<(), SchemaError> {
        if object.is_null() {
            return Ok(());
        }
        if depth > MAX_DEPTH {
            return Err(SchemaError::ReferenceDepth(MAX_DEPTH));
        }
        let node = self.node(id);

        match node.kind() {
            SchemaKind::Reference { name: target } => {
                let referent = self.resolve(target)?;
                if !follow_ref {
                    return Ok(());
                }
                self.parses_inner(referent, target, object, collection, follow_ref, depth + 1)
            }

            SchemaKind::Composite { parts } => {
                let Value::Object(fields) = object else {
                    return Err(SchemaError::mismatch("object is not a map", node, object));
                };
                let mut matched = 0;
                for &part in parts {
                    let known = self.properties(part);
                    if known.is_empty() {
                        continue;
                    }
                    let subset: Map<String, Value> = fields
                        .iter()
                        .filter(|(field, _)| known.contains_key(*field))
                        .map(|(field, value)| (field.clone(), value.clone()))
                        .collect();
                    matched += subset.len();
                    self.parses_inner(
                        part,
                        "",
                        &Value::Object(subset),
                        collection,
                        follow_ref,
                        depth + 1,
                    )?;
                }
                if !enough_fields(matched, fields.len()) {
                    return Err(SchemaError::mismatch(
                        "too many mismatched fields",
                        node,
                        object,
                    ));
                }
                record(collection, name, object);
                Ok(())
            }

            SchemaKind::Object {
                properties,
                required,
            } => {
                let Value::Object(fields) = object else {
                    return Err(SchemaError::mismatch("object is not a map", node, object));
                };
                if let Some(missing) = required.iter().find(|r| !fields.contains_key(*r)) {
                    return Err(SchemaError::mismatch(
                        format!("required field not present: {missing}"),
                        node,
                        object,
                    ));
                }
                let mut matched = 0;
                for (field, value) in fields {
                    if let Some(&property) = properties.get(field) {
                        matched += 1;
                        self.parses_inner(property, "", value, collection, follow_ref, 0)?;
                    }
                }
                if !enough_fields(matched, fields.len()) {
                    return Err(SchemaError::mismatch(
                        "too many mismatched fields",
                        node,
                        object,
                    ));
                }
                record(collection, name, object);
                Ok(())
            }

            SchemaKind::Array { item } => {
                let Value::Array(elements) = object else {
                    return Err(SchemaError::mismatch(
                        "object is not an array",
                        node,
                        object,
                    ));
                };
                for element in elements {
                    self.parses_inner(*item, "", element, collection, follow_ref, 0)?;
                }
                Ok(())
            }

            SchemaKind::Primitive { ty, .. } => {
                let reason = match (object, ty) {
                    (Value::Bool(_), Some(PrimitiveType::Boolean)) => None,
                    (Value::Bool(_), _) => Some("schema is not a boolean"),
                    (Value::Number(_), Some(t)) if t.is_numeric() => {
                        (!self.validate(id, object)).then_some("number validation failed")
                    }
                    (Value::Number(_), _) => Some("schema is not a number"),
                    (Value::String(_), Some(PrimitiveType::String)) => {
                        (!self.validate(id, object)).then_some("string validation failed")
                    }
                    (Value::String(_), _) => Some("schema is not a string"),
                    (Value::Object(_), _) => Some("schema is not an object"),
                    (Value::Array(_), _) => Some("schema is not an array"),
                    (Value::Null, _) => None,
                };
                if let Some(reason) = reason {
                    return Err(SchemaError::mismatch(reason, node, object));
                }
                if let Some(slot) = node.tag().and_then(|t| t.slot()) {
                    record(collection, &slot, object);
                }
                Ok(())
            }
        }
    }

    /// Check a scalar against the node's constraints.
    ///
    /// String length is counted in characters; numeric bounds are inclusive;
    /// a declared pattern must match somewhere in the value's string form.
    /// The checks are independent of each other.
    #[must_use]
    pub fn validate(&self, id: SchemaId, value: &Value) -> bool {
        let c = self.node(id).constraints();

        if let Value::String(s) = value {
            let len = s.chars().count() as u64;
            if c.min_length.is_some_and(|min| len < min) || c.max_length.is_some_and(|max| len > max)
            {
                return false;
            }
        }
        if let Some(n) = value.as_f64() {
            if c.minimum.is_some_and(|min| n < min) || c.maximum.is_some_and(|max| n > max) {
                return false;
            }
        }
        if let Some(pattern) = &c.pattern {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            match regex::Regex::new(pattern) {
                Ok(re) => {
                    if !re.is_match(&text) {
                        return false;
                    }
                }
                Err(e) => {
                    log::debug!("invalid pattern '{pattern}': {e}");
                    return false;
                }
            }
        }
        true
    }
}

fn record(collection: &mut Collection, name: &str, object: &Value) {
    if !name.is_empty() {
        collection
            .entry(name.to_string())
            .or_default()
            .push(object.clone());
    }
}
