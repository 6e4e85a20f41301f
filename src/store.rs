//! Local entity collection.
//!
//! The single-writer, id-keyed collection the rest of the application reads.
//! All mutation flows through [`LocalStore::apply`], one op batch per
//! reconciled notification, so readers never observe a half-applied change.
//! There is no interior locking: the subscription driver is the only writer
//! and processes one message at a time.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::entity::{Entity, EntityId};

/// One mutation produced by the reconciler.
///
/// Serializable so test assertions and debug logs can inspect exactly what
/// a notification did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StoreOp {
    Insert { entity: Entity },
    Replace { entity: Entity },
    Remove { id: EntityId },
    /// Surface a child whose parent is out of scope as a top-level item.
    Promote { id: EntityId },
    /// Parent became visible; the child renders nested again.
    Demote { id: EntityId },
}

/// Id-keyed collection of entities plus the promoted-children root view.
#[derive(Debug, Default)]
pub struct LocalStore {
    entities: HashMap<EntityId, Entity>,
    promoted: HashSet<EntityId>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn is_promoted(&self, id: &EntityId) -> bool {
        self.promoted.contains(id)
    }

    /// All entities, ordered by creation time then id for stable rendering.
    pub fn snapshot(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self.entities.values().cloned().collect();
        entities.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        entities
    }

    /// Ids of entities whose `parent_id` is `parent`.
    pub fn children_of(&self, parent: &EntityId) -> Vec<EntityId> {
        let mut children: Vec<EntityId> = self
            .entities
            .values()
            .filter(|entity| entity.parent_id.as_ref() == Some(parent))
            .map(|entity| entity.id.clone())
            .collect();
        children.sort();
        children
    }

    /// Top-level view: entities without a parent, plus promoted children.
    pub fn roots(&self) -> Vec<&Entity> {
        let mut roots: Vec<&Entity> = self
            .entities
            .values()
            .filter(|entity| entity.parent_id.is_none() || self.promoted.contains(&entity.id))
            .collect();
        roots.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        roots
    }

    /// Apply one notification's ops as a unit.
    pub fn apply(&mut self, ops: Vec<StoreOp>) {
        for op in ops {
            match op {
                StoreOp::Insert { entity } | StoreOp::Replace { entity } => {
                    // Upsert either way: repetition and replays stay safe.
                    self.entities.insert(entity.id.clone(), entity);
                }
                StoreOp::Remove { id } => {
                    self.entities.remove(&id);
                    self.promoted.remove(&id);
                }
                StoreOp::Promote { id } => {
                    self.promoted.insert(id);
                }
                StoreOp::Demote { id } => {
                    self.promoted.remove(&id);
                }
            }
        }
    }

    /// Insert a locally-synthesized optimistic row. Same single-writer path
    /// as notification ops, just issued by the write side.
    pub fn insert(&mut self, entity: Entity) {
        self.entities.insert(entity.id.clone(), entity);
    }

    pub fn remove(&mut self, id: &EntityId) -> Option<Entity> {
        self.promoted.remove(id);
        self.entities.remove(id)
    }
}
