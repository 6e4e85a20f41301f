//! Partial-payload merging.
//!
//! Change notifications elide large unchanged fields, so a payload must be
//! merged over the locally-held row (or, for a cold insert, materialized
//! from scratch) before it can be reconciled. Merging fails closed: a
//! payload that cannot produce a well-formed entity is rejected here and
//! dropped by the caller, never patched up with fabricated values.

use crate::attachment::stabilize_body;
use crate::entity::{Entity, EntityKind, EntityPatch};
use crate::error::{Error, Result};
use crate::patch::Patch;

/// Merges wire payloads into full entities for one subscription's table.
#[derive(Debug, Clone)]
pub struct PayloadMerger {
    kind: EntityKind,
    signature_marker: String,
}

impl PayloadMerger {
    pub fn new(kind: EntityKind, signature_marker: impl Into<String>) -> Self {
        Self {
            kind,
            signature_marker: signature_marker.into(),
        }
    }

    /// Produce a complete entity from a partial payload.
    ///
    /// Fields absent from the payload keep their local value; explicit
    /// nulls clear. With no local row, the payload must carry the required
    /// fields itself or the merge is rejected.
    pub fn merge(&self, old: Option<&Entity>, incoming: &EntityPatch) -> Result<Entity> {
        match old {
            Some(existing) => self.merge_existing(existing, incoming),
            None => self.materialize(incoming),
        }
    }

    fn merge_existing(&self, old: &Entity, incoming: &EntityPatch) -> Result<Entity> {
        let mut merged = old.clone();

        match &incoming.id {
            Patch::Missing => {}
            Patch::Null => return Err(malformed("id sent as null")),
            Patch::Value(id) => {
                if *id != old.id {
                    // A temp-keyed base is our own optimistic row being
                    // confirmed; the authoritative id supersedes it.
                    if old.id.is_temp() {
                        merged.id = id.clone();
                    } else {
                        return Err(malformed(format!(
                            "payload id {} does not match local row {}",
                            id, old.id
                        )));
                    }
                }
            }
        }

        match &incoming.workspace_id {
            Patch::Missing => {}
            Patch::Null => return Err(malformed("workspaceId sent as null")),
            Patch::Value(workspace) => {
                // Tenant scope is immutable after creation.
                if *workspace != old.workspace_id {
                    return Err(malformed(format!(
                        "workspaceId changed from {} to {} for {}",
                        old.workspace_id, workspace, old.id
                    )));
                }
            }
        }

        if let Some(kind) = incoming.kind.value() {
            merged.kind = *kind;
        }
        if let Some(created_at) = incoming.created_at.value() {
            merged.created_at = *created_at;
        }

        incoming.parent_id.apply_to(&mut merged.parent_id);
        incoming.assignee_id.apply_to(&mut merged.assignee_id);
        incoming.assignee_type.apply_to(&mut merged.assignee_type);

        // Soft-delete is monotonic: a null cannot un-delete a row here.
        match &incoming.deleted_at {
            Patch::Missing | Patch::Null => {}
            Patch::Value(at) => merged.deleted_at = Some(*at),
        }

        match &incoming.body {
            Patch::Missing => {}
            Patch::Null => merged.body = None,
            Patch::Value(new_body) => {
                merged.body = Some(match &old.body {
                    Some(old_body) if !old_body.is_empty() && !new_body.is_empty() => {
                        stabilize_body(old_body, new_body, &self.signature_marker)
                    }
                    _ => new_body.clone(),
                });
            }
        }

        Ok(merged)
    }

    /// Build an entity with no local base. Required fields must be on the
    /// wire; there is no sane default to fabricate for them.
    fn materialize(&self, incoming: &EntityPatch) -> Result<Entity> {
        let id = incoming
            .id
            .value()
            .cloned()
            .ok_or_else(|| malformed("cold payload without id"))?;
        let workspace_id = incoming
            .workspace_id
            .value()
            .cloned()
            .ok_or_else(|| malformed(format!("cold payload for {} without workspaceId", id)))?;
        let created_at = incoming
            .created_at
            .value()
            .copied()
            .ok_or_else(|| malformed(format!("cold payload for {} without createdAt", id)))?;

        if workspace_id.is_empty() {
            return Err(malformed(format!("empty workspaceId for {}", id)));
        }

        Ok(Entity {
            id,
            kind: incoming.kind.value().copied().unwrap_or(self.kind),
            parent_id: incoming.parent_id.value().cloned(),
            workspace_id,
            assignee_id: incoming.assignee_id.value().cloned(),
            assignee_type: incoming.assignee_type.value().copied(),
            body: incoming.body.value().cloned(),
            deleted_at: incoming.deleted_at.value().copied(),
            created_at,
        })
    }
}

fn malformed(reason: impl Into<String>) -> Error {
    Error::MalformedNotification {
        reason: reason.into(),
    }
}
