//! Optimistic write ledger.
//!
//! A local create is shown in the UI immediately under a minted temp id;
//! the server later assigns the authoritative id, and the matching insert
//! notification arrives on the change stream. The ledger maps each pending
//! write to a single stable identity across that whole lifecycle so the
//! rendering layer never sees an item change identity (and flicker) when
//! it flips from optimistic to confirmed.
//!
//! Entries are retained after confirmation until the matching notification
//! has been reconciled, then pruned by the engine. The ledger never evicts
//! on its own: a write that never confirms is rolled back by whoever issued
//! it, not by a timeout here.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::entity::EntityId;
use crate::error::{Error, Result};

/// One pending (or recently confirmed) local write.
#[derive(Debug, Clone, Serialize)]
pub struct OptimisticEntry {
    pub temp_id: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<EntityId>,
    pub created_at_local: DateTime<Utc>,
}

/// Tracks locally-created entities before and across server confirmation.
#[derive(Debug, Default)]
pub struct OptimisticLedger {
    entries: HashMap<EntityId, OptimisticEntry>,
    by_server: HashMap<EntityId, EntityId>,
}

impl OptimisticLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending local write under `temp_id`.
    ///
    /// The caller inserts the locally-synthesized row into the store in the
    /// same mutation step.
    pub fn begin(&mut self, temp_id: EntityId) {
        if !temp_id.is_temp() {
            tracing::warn!(%temp_id, "optimistic entry registered with a non-temp id");
        }
        self.entries.entry(temp_id.clone()).or_insert(OptimisticEntry {
            temp_id,
            server_id: None,
            created_at_local: Utc::now(),
        });
    }

    /// Mint a temp id and register it in one step.
    pub fn begin_new(&mut self) -> EntityId {
        let temp_id = EntityId::random_temp();
        self.begin(temp_id.clone());
        temp_id
    }

    /// Record the server id returned by the write's direct response.
    ///
    /// Does not touch the store; the authoritative row arrives via the
    /// matching insert notification. Rejects a server id that is already
    /// confirmed for a different pending write — two distinct logical
    /// entities must never be merged on a guess.
    pub fn confirm(&mut self, temp_id: &EntityId, server_id: EntityId) -> Result<()> {
        if let Some(claimed_by) = self.by_server.get(&server_id) {
            if claimed_by != temp_id {
                return Err(Error::IdentityConflict {
                    id: server_id,
                    temp_id: claimed_by.to_string(),
                });
            }
            return Ok(());
        }

        let Some(entry) = self.entries.get_mut(temp_id) else {
            tracing::warn!(%temp_id, %server_id, "confirm for unknown optimistic entry");
            return Ok(());
        };
        entry.server_id = Some(server_id.clone());
        self.by_server.insert(server_id, temp_id.clone());
        Ok(())
    }

    /// The identity the rendering layer should key this id by.
    ///
    /// Returns the temp id while a ledger entry covers the id (directly or
    /// via its confirmed server id), else the id itself.
    pub fn stable_key_for(&self, id: &EntityId) -> EntityId {
        if self.entries.contains_key(id) {
            return id.clone();
        }
        match self.by_server.get(id) {
            Some(temp_id) => temp_id.clone(),
            None => id.clone(),
        }
    }

    pub fn entry(&self, temp_id: &EntityId) -> Option<&OptimisticEntry> {
        self.entries.get(temp_id)
    }

    /// The temp id whose write was confirmed as `server_id`, if any.
    pub fn temp_id_for(&self, server_id: &EntityId) -> Option<&EntityId> {
        self.by_server.get(server_id)
    }

    /// Drop an entry once its insert notification has been reconciled.
    /// No-op if absent.
    pub fn prune(&mut self, temp_id: &EntityId) {
        if let Some(entry) = self.entries.remove(temp_id) {
            if let Some(server_id) = entry.server_id {
                self.by_server.remove(&server_id);
            }
        }
    }

    /// Abandon a write that failed. Returns the entry so the caller can
    /// remove the optimistic row it inserted alongside `begin`.
    pub fn rollback(&mut self, temp_id: &EntityId) -> Option<OptimisticEntry> {
        let entry = self.entries.remove(temp_id)?;
        if let Some(server_id) = &entry.server_id {
            self.by_server.remove(server_id);
        }
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
