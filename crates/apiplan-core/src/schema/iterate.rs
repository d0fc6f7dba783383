//! Preorder traversal of a schema node and its children

use super::{SchemaError, SchemaGraph, SchemaId, SchemaKind, SchemaNode};

/// Early-exit signal for [`SchemaGraph::contains`].
enum Search {
    Found,
    Failed(SchemaError),
}

impl From<SchemaError> for Search {
    fn from(e: SchemaError) -> Self {
        Self::Failed(e)
    }
}

impl SchemaGraph {
    /// Visit `id` and its children parent-first.
    ///
    /// The visitor receives the definition name (empty except for the target
    /// of a reference), the node id, and the node. Weak nodes are skipped
    /// unless `follow_weak` is set. A reference visits its target once and
    /// does not descend further, so recursive definitions terminate.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first visitor error, or an unresolved reference.
    pub fn iterate<E, F>(&self, id: SchemaId, visitor: &mut F, follow_weak: bool) -> Result<(), E>
    where
        E: From<SchemaError>,
        F: FnMut(&str, SchemaId, &SchemaNode) -> Result<(), E>,
    {
        let node = self.node(id);
        if node.is_weak() && !follow_weak {
            return Ok(());
        }
        visitor("", id, node)?;

        match node.kind() {
            SchemaKind::Composite { parts } => {
                for &part in parts {
                    self.iterate(part, visitor, follow_weak)?;
                }
            }
            SchemaKind::Reference { name } => {
                let target = self.resolve(name)?;
                let referent = self.node(target);
                if referent.is_weak() && !follow_weak {
                    return Ok(());
                }
                visitor(name, target, referent)?;
            }
            SchemaKind::Object { properties, .. } => {
                for &property in properties.values() {
                    self.iterate(property, visitor, follow_weak)?;
                }
            }
            SchemaKind::Array { item } => self.iterate(*item, visitor, follow_weak)?,
            SchemaKind::Primitive { .. } => {}
        }
        Ok(())
    }

    /// Whether the definition `name` is reachable from `id`, weak edges included.
    #[must_use]
    pub fn contains(&self, id: SchemaId, name: &str) -> bool {
        let mut visitor = |schema_name: &str, _: SchemaId, _: &SchemaNode| {
            if schema_name == name {
                Err(Search::Found)
            } else {
                Ok(())
            }
        };
        match self.iterate(id, &mut visitor, true) {
            Err(Search::Found) => true,
            Err(Search::Failed(e)) => {
                log::debug!("schema search for {name} stopped: {e}");
                false
            }
            Ok(()) => false,
        }
    }
}
