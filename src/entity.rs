//! Wire and in-memory types for board entities.
//!
//! Tasks and templates are two instantiations of the same shape; the engine
//! treats them uniformly and a subscription is opened per backing table, so
//! the kind is fixed for any one stream. Wire payloads use the backend's
//! camelCase field names.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use uuid::Uuid;

use crate::patch::Patch;

/// Prefix that distinguishes locally-minted ids from server UUIDs.
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// Identifier of a task or template.
///
/// Server-assigned ids are UUIDs; optimistic rows carry a `tmp-`-prefixed
/// ULID until the server confirms the write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh server-style id. Only used by tests and fixtures; real
    /// server ids arrive over the wire.
    pub fn random_server() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Mint a fresh local id for an optimistic write.
    pub fn random_temp() -> Self {
        Self(format!("{}{}", TEMP_ID_PREFIX, Ulid::new()))
    }

    pub fn is_temp(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The two entity tables this engine reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    Template,
}

impl EntityKind {
    /// Backing table name, as used in subscription topics.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Task => "tasks",
            EntityKind::Template => "task_templates",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Who an entity is assigned to; drives access scoping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssigneeKind {
    InternalUser,
    Client,
    Company,
}

/// A fully-materialized entity as held in the local collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Self-referential hierarchy: a subtask's or subtemplate's parent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EntityId>,
    /// Tenant scope; never changes after creation.
    pub workspace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_type: Option<AssigneeKind>,
    /// Free-text/HTML; large, and elided from the wire when unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Soft-delete marker; monotonic — this engine never clears it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Entity {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A partial entity as carried by a change notification.
///
/// Every field is three-state: absent from the wire, explicit null, or a
/// value. Absent fields were elided by the backing store because they are
/// large and unchanged, and must not be mistaken for clears.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPatch {
    #[serde(default, skip_serializing_if = "Patch::is_missing")]
    pub id: Patch<EntityId>,
    #[serde(default, skip_serializing_if = "Patch::is_missing")]
    pub kind: Patch<EntityKind>,
    #[serde(default, skip_serializing_if = "Patch::is_missing")]
    pub parent_id: Patch<EntityId>,
    #[serde(default, skip_serializing_if = "Patch::is_missing")]
    pub workspace_id: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_missing")]
    pub assignee_id: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_missing")]
    pub assignee_type: Patch<AssigneeKind>,
    #[serde(default, skip_serializing_if = "Patch::is_missing")]
    pub body: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_missing")]
    pub deleted_at: Patch<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Patch::is_missing")]
    pub created_at: Patch<DateTime<Utc>>,
}

impl EntityPatch {
    /// Full projection of an entity, as a patch with every field present.
    pub fn from_entity(entity: &Entity) -> Self {
        Self {
            id: Patch::Value(entity.id.clone()),
            kind: Patch::Value(entity.kind),
            parent_id: entity.parent_id.clone().into(),
            workspace_id: Patch::Value(entity.workspace_id.clone()),
            assignee_id: entity.assignee_id.clone().into(),
            assignee_type: entity.assignee_type.into(),
            body: entity.body.clone().into(),
            deleted_at: entity.deleted_at.into(),
            created_at: Patch::Value(entity.created_at),
        }
    }
}

/// One row-level change pushed by the backing store.
///
/// Delivery is at-least-once and ordered per entity id only; `next` is
/// partial as described on [`EntityPatch`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    pub event_type: ChangeEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<EntityPatch>,
    pub next: EntityPatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeEventType {
    Insert,
    Update,
    Delete,
}
