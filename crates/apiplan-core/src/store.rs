//! In-memory object store, one collection per schema definition
//!
//! Every top-level operation takes the single store-wide lock for its whole
//! duration. Lookups are linear scans; collections are small and the store
//! is not on a hot path.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::ErrorKind;
use crate::schema::{Collection, SchemaError, SchemaGraph, SchemaId};

pub type JsonObject = Map<String, Value>;

/// Objects associated with an entry, keyed by class name.
pub type Associations = BTreeMap<String, JsonObject>;

static NO_CRITERIA: Value = Value::Null;
static NO_ASSOCIATIONS: Associations = BTreeMap::new();

/// Match function that accepts every entry.
#[must_use]
pub fn match_always(_criteria: &Value, _existing: &JsonObject) -> bool {
    true
}

/// Every field of `criteria` deep-equals the same field of `existing`.
///
/// `null` criteria match everything; non-object criteria match nothing.
#[must_use]
pub fn match_fields(criteria: &Value, existing: &JsonObject) -> bool {
    match criteria {
        Value::Null => true,
        Value::Object(fields) => fields.iter().all(|(k, v)| existing.get(k) == Some(v)),
        _ => false,
    }
}

/// Selection used by find, delete and update.
#[derive(Clone, Copy)]
pub struct Query<'a> {
    criteria: &'a Value,
    associations: &'a Associations,
    matches: &'a (dyn Fn(&Value, &JsonObject) -> bool + 'a),
    limit: Option<usize>,
}

impl<'a> Query<'a> {
    /// Every entry, no limit.
    #[must_use]
    pub fn all() -> Self {
        Self {
            criteria: &NO_CRITERIA,
            associations: &NO_ASSOCIATIONS,
            matches: &match_always,
            limit: None,
        }
    }

    /// Entries whose fields equal those of `criteria`.
    #[must_use]
    pub fn fields(criteria: &'a Value) -> Self {
        Self::all().criteria(criteria).matching(&match_fields)
    }

    #[must_use]
    pub fn criteria(mut self, criteria: &'a Value) -> Self {
        self.criteria = criteria;
        self
    }

    #[must_use]
    pub fn associations(mut self, associations: &'a Associations) -> Self {
        self.associations = associations;
        self
    }

    #[must_use]
    pub fn matching(mut self, matches: &'a (dyn Fn(&Value, &JsonObject) -> bool + 'a)) -> Self {
        self.matches = matches;
        self
    }

    /// Stop after `limit` matching entries.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn reached(&self, count: usize) -> bool {
        self.limit.is_some_and(|limit| count >= limit)
    }
}

impl std::fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("criteria", self.criteria)
            .field("associations", self.associations)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

/// One stored object and its associations.
#[derive(Debug, Clone, PartialEq)]
pub struct DbEntry {
    pub data: JsonObject,
    pub associations: Associations,
}

impl DbEntry {
    fn matches(&self, query: &Query<'_>, associations: &Associations) -> bool {
        associations
            .iter()
            .all(|(class, object)| self.associations.get(class) == Some(object))
            && (query.matches)(query.criteria, &self.data)
    }
}

/// Objects stored under one schema definition.
#[derive(Debug, Clone)]
pub struct SchemaCollection {
    pub name: String,
    pub schema: SchemaId,
    pub retain_history: bool,
    pub entries: Vec<DbEntry>,
}

impl SchemaCollection {
    fn new(name: &str, schema: SchemaId) -> Self {
        Self {
            name: name.to_string(),
            schema,
            retain_history: true,
            entries: Vec::new(),
        }
    }

    fn empty_copy(&self) -> Self {
        Self {
            entries: Vec::new(),
            ..self.clone()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown schema: {0}")]
    UnknownSchema(String),
    #[error("object for {0} is not a JSON object")]
    NotAnObject(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl StoreError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownSchema(_) => ErrorKind::NotFound,
            Self::NotAnObject(_) => ErrorKind::Invalid,
            Self::Schema(e) => e.kind(),
        }
    }
}

/// Schema-typed object store.
#[derive(Debug)]
pub struct ObjectStore {
    graph: Arc<SchemaGraph>,
    collections: Mutex<BTreeMap<String, SchemaCollection>>,
}

impl ObjectStore {
    /// One empty collection per named definition of `graph`.
    #[must_use]
    pub fn new(graph: Arc<SchemaGraph>) -> Self {
        let mut collections = BTreeMap::new();
        for (name, id) in graph.definitions() {
            if collections
                .insert(name.clone(), SchemaCollection::new(name, *id))
                .is_some()
            {
                log::warn!("schema {name} already exists, replacing its collection");
            }
        }
        Self {
            graph,
            collections: Mutex::new(collections),
        }
    }

    #[must_use]
    pub fn graph(&self) -> &Arc<SchemaGraph> {
        &self.graph
    }

    /// Schema of the collection `name`.
    #[must_use]
    pub fn schema(&self, name: &str) -> Option<SchemaId> {
        self.collections.lock().get(name).map(|c| c.schema)
    }

    /// Collection names in lexicographic order.
    #[must_use]
    pub fn class_names(&self) -> Vec<String> {
        self.collections.lock().keys().cloned().collect()
    }

    /// Number of entries stored for `class`.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownSchema`] if `class` has no collection.
    pub fn len(&self, class: &str) -> Result<usize, StoreError> {
        self.with_collection(class, |c| c.entries.len())
    }

    /// Stop (or resume) keeping inserted objects for `class`.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownSchema`] if `class` has no collection.
    pub fn set_retain_history(&self, class: &str, retain: bool) -> Result<(), StoreError> {
        self.with_collection(class, |c| c.retain_history = retain)
    }

    /// Append `object` to the collection of `class`.
    ///
    /// An association keyed by `class` itself is dropped. Nothing is stored
    /// when the collection does not retain history.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownSchema`] for an unknown class,
    /// [`StoreError::NotAnObject`] when `object` is not a JSON object.
    pub fn insert(
        &self,
        class: &str,
        object: Value,
        associations: &Associations,
    ) -> Result<(), StoreError> {
        self.with_collection(class, |c| {
            let Value::Object(data) = object else {
                return Err(StoreError::NotAnObject(class.to_string()));
            };
            if c.retain_history {
                c.entries.push(DbEntry {
                    data,
                    associations: without_class(associations, class),
                });
            }
            Ok(())
        })?
    }

    /// Data of the entries selected by `query`, in insertion order.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownSchema`] if `class` has no collection.
    pub fn find(&self, class: &str, query: &Query<'_>) -> Result<Vec<JsonObject>, StoreError> {
        let associations = without_class(query.associations, class);
        self.with_collection(class, |c| {
            let mut found = Vec::new();
            for entry in &c.entries {
                if query.reached(found.len()) {
                    break;
                }
                if entry.matches(query, &associations) {
                    found.push(entry.data.clone());
                }
            }
            found
        })
    }

    /// Remove the entries selected by `query`, keeping the others in order.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownSchema`] if `class` has no collection.
    pub fn delete(&self, class: &str, query: &Query<'_>) -> Result<usize, StoreError> {
        let associations = without_class(query.associations, class);
        self.with_collection(class, |c| {
            let mut removed = 0;
            c.entries.retain(|entry| {
                if query.reached(removed) || !entry.matches(query, &associations) {
                    return true;
                }
                removed += 1;
                false
            });
            removed
        })
    }

    /// Replace (or, with `patch`, deep-merge into) the entries selected by `query`.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownSchema`] if `class` has no collection.
    pub fn update(
        &self,
        class: &str,
        query: &Query<'_>,
        new_object: &JsonObject,
        patch: bool,
    ) -> Result<usize, StoreError> {
        let associations = without_class(query.associations, class);
        self.with_collection(class, |c| {
            let mut updated = 0;
            for entry in &mut c.entries {
                if query.reached(updated) {
                    break;
                }
                if entry.matches(query, &associations) {
                    if patch {
                        merge(&mut entry.data, new_object);
                    } else {
                        entry.data = new_object.clone();
                    }
                    updated += 1;
                }
            }
            updated
        })
    }

    /// First collection, by name, whose schema matches `object`.
    ///
    /// Structurally compatible schemas are ambiguous; only the lexicographic
    /// order decides between them.
    #[must_use]
    pub fn find_matching_schema(&self, object: &Value) -> Option<(String, SchemaId)> {
        let collections = self.collections.lock();
        collections
            .values()
            .find(|c| self.graph.matches(c.schema, object))
            .map(|c| {
                log::debug!("found matching schema: {}", c.name);
                (c.name.clone(), c.schema)
            })
    }

    /// Same schemas and retain flags, no entries.
    #[must_use]
    pub fn clone_schema(&self) -> Self {
        let collections = self
            .collections
            .lock()
            .iter()
            .map(|(name, c)| (name.clone(), c.empty_copy()))
            .collect();
        Self {
            graph: Arc::clone(&self.graph),
            collections: Mutex::new(collections),
        }
    }

    /// Parse `object` against `schema` and store every collected object whose
    /// key names a collection. Returns the number of objects stored.
    ///
    /// # Errors
    ///
    /// Propagates the parse failure; nothing is stored in that case.
    pub fn ingest(&self, schema: SchemaId, object: &Value) -> Result<usize, StoreError> {
        let mut collected = Collection::new();
        self.graph.parses(schema, "", object, &mut collected, true)?;

        let mut collections = self.collections.lock();
        let mut stored = 0;
        for (key, objects) in collected {
            let Some(collection) = collections.get_mut(&key) else {
                continue;
            };
            for object in objects {
                let Value::Object(data) = object else {
                    continue;
                };
                if collection.retain_history {
                    collection.entries.push(DbEntry {
                        data,
                        associations: Associations::new(),
                    });
                    stored += 1;
                }
            }
        }
        log::debug!("ingested {stored} object(s)");
        Ok(stored)
    }

    fn with_collection<R>(
        &self,
        class: &str,
        f: impl FnOnce(&mut SchemaCollection) -> R,
    ) -> Result<R, StoreError> {
        let mut collections = self.collections.lock();
        let collection = collections
            .get_mut(class)
            .ok_or_else(|| StoreError::UnknownSchema(class.to_string()))?;
        Ok(f(collection))
    }
}

fn without_class(associations: &Associations, class: &str) -> Associations {
    associations
        .iter()
        .filter(|(name, _)| name.as_str() != class)
        .map(|(name, object)| (name.clone(), object.clone()))
        .collect()
}

/// Overwrite existing fields, add new ones, recurse into nested objects.
fn merge(target: &mut JsonObject, patch: &JsonObject) {
    for (key, value) in patch {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => merge(existing, nested),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
