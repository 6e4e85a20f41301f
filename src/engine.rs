//! Reconciliation of change notifications against the local collection.
//!
//! One notification at a time, run-to-completion: the planner is a pure
//! function from `(collection, ledger, notification, resolved companies)`
//! to a batch of store ops, and [`Reconciler::apply`] is the thin adapter
//! that runs the planner and writes the batch into the store. Replays are
//! harmless — the stream is at-least-once and nothing here assumes
//! deduplicated delivery. Ordering is only assumed per entity id, which is
//! what the transport provides.

use serde::Serialize;

use crate::access::{is_visible, AccessContext, AccessView};
use crate::config::EngineConfig;
use crate::entity::{
    AssigneeKind, ChangeEventType, ChangeNotification, Entity, EntityId, EntityKind,
};
use crate::error::{Error, Result};
use crate::ledger::OptimisticLedger;
use crate::merge::PayloadMerger;
use crate::resolver::CompanyDirectory;
use crate::store::{LocalStore, StoreOp};

/// What a notification did to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Inserted,
    Replaced,
    Removed,
    /// Legal notification with nothing to do here (not visible, not present).
    Ignored,
    /// Rejected notification; collection unchanged.
    Dropped,
}

/// Planned mutation for one notification.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcilePlan {
    pub outcome: ReconcileOutcome,
    pub ops: Vec<StoreOp>,
    /// Optimistic row superseded by this notification. The ledger entry is
    /// kept for identity stability; the caller prunes it when the UI no
    /// longer needs the old key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_temp: Option<EntityId>,
}

impl ReconcilePlan {
    fn ignored() -> Self {
        Self {
            outcome: ReconcileOutcome::Ignored,
            ops: Vec::new(),
            confirmed_temp: None,
        }
    }
}

/// Running counters for one subscription's stream.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ReconcileStats {
    pub inserted: u64,
    pub replaced: u64,
    pub removed: u64,
    pub ignored: u64,
    pub dropped: u64,
}

/// Per-table reconciliation engine.
pub struct Reconciler {
    ctx: AccessContext,
    merger: PayloadMerger,
    promote_orphans: bool,
    stats: ReconcileStats,
}

impl Reconciler {
    pub fn new(kind: EntityKind, ctx: AccessContext, config: &EngineConfig) -> Self {
        Self {
            ctx,
            merger: PayloadMerger::new(kind, config.attachments.signature_marker.clone()),
            promote_orphans: config.reconcile.promote_orphans,
            stats: ReconcileStats::default(),
        }
    }

    pub fn context(&self) -> &AccessContext {
        &self.ctx
    }

    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    /// Client ids whose company must be resolved before this notification
    /// can be reconciled. Empty for unrestricted sessions.
    pub fn company_lookups_needed(
        &self,
        store: &LocalStore,
        ledger: &OptimisticLedger,
        notification: &ChangeNotification,
    ) -> Vec<String> {
        if !self.ctx.needs_company_resolution() {
            return Vec::new();
        }
        let next = &notification.next;
        let Some(id) = next.id.value() else {
            return Vec::new();
        };

        let local = store
            .get(id)
            .or_else(|| ledger.temp_id_for(id).and_then(|temp| store.get(temp)));

        // Effective post-merge assignee without running the full merge.
        let assignee_type = match next.assignee_type.value() {
            Some(kind) => Some(*kind),
            None if next.assignee_type.is_present() => None,
            None => local.and_then(|row| row.assignee_type),
        };
        let assignee_id = match next.assignee_id.value() {
            Some(assignee) => Some(assignee.clone()),
            None if next.assignee_id.is_present() => None,
            None => local.and_then(|row| row.assignee_id.clone()),
        };

        match (assignee_type, assignee_id) {
            (Some(AssigneeKind::Client), Some(client_id)) => vec![client_id],
            _ => Vec::new(),
        }
    }

    /// Pure planning step: no mutation, no I/O.
    pub fn plan(
        &self,
        store: &LocalStore,
        ledger: &OptimisticLedger,
        notification: &ChangeNotification,
        companies: &CompanyDirectory,
    ) -> Result<ReconcilePlan> {
        let next = &notification.next;
        let id = next.id.value().ok_or_else(|| Error::MalformedNotification {
            reason: "notification without id".to_string(),
        })?;
        if id.is_temp() {
            return Err(Error::MalformedNotification {
                reason: format!("change stream delivered local id {}", id),
            });
        }

        // The optimistic row this notification confirms, if our own write.
        let temp_id = ledger.temp_id_for(id).cloned();
        let optimistic_row = temp_id.as_ref().and_then(|temp| store.get(temp));
        let local = store.get(id);

        if notification.event_type == ChangeEventType::Delete {
            return Ok(self.removal_plan(store, id, temp_id, optimistic_row.is_some(), local.is_some()));
        }

        // Soft delete is the primary removal signal and wins unconditionally;
        // no merge needed, so a partial payload is enough to process it.
        if next.deleted_at.value().is_some() {
            return Ok(self.removal_plan(store, id, temp_id, optimistic_row.is_some(), local.is_some()));
        }

        let merged = self.merger.merge(local.or(optimistic_row), next)?;

        let company = merged
            .assignee_id
            .as_deref()
            .and_then(|assignee| companies.get(assignee));
        let visible = is_visible(&AccessView::of(&merged, company), &self.ctx);
        let present = local.is_some() || optimistic_row.is_some();

        if !visible {
            if !present {
                return Ok(ReconcilePlan::ignored());
            }
            // Reassigned or rescoped out of this principal's view.
            return Ok(self.removal_plan(store, id, temp_id, optimistic_row.is_some(), local.is_some()));
        }

        let mut ops = Vec::new();
        let confirmed_temp = match (&temp_id, optimistic_row) {
            (Some(temp), Some(_)) => {
                // Swap the optimistic identity for the authoritative row in
                // the same atomic batch.
                ops.push(StoreOp::Remove { id: temp.clone() });
                Some(temp.clone())
            }
            _ => None,
        };

        let outcome = if local.is_some() {
            ops.push(StoreOp::Replace {
                entity: merged.clone(),
            });
            ReconcileOutcome::Replaced
        } else {
            ops.push(StoreOp::Insert {
                entity: merged.clone(),
            });
            ReconcileOutcome::Inserted
        };
        ops.extend(self.placement_ops(store, &merged));

        Ok(ReconcilePlan {
            outcome,
            ops,
            confirmed_temp,
        })
    }

    /// Run the planner and apply its ops; absorbs reconcile-path errors.
    pub fn apply(
        &mut self,
        store: &mut LocalStore,
        ledger: &OptimisticLedger,
        notification: &ChangeNotification,
        companies: &CompanyDirectory,
    ) -> ReconcilePlan {
        let plan = match self.plan(store, ledger, notification, companies) {
            Ok(plan) => plan,
            Err(err) if err.is_recoverable() => {
                tracing::warn!(error = %err, "dropping notification");
                self.stats.dropped += 1;
                return ReconcilePlan {
                    outcome: ReconcileOutcome::Dropped,
                    ops: Vec::new(),
                    confirmed_temp: None,
                };
            }
            Err(err) => {
                tracing::error!(error = %err, "dropping notification");
                self.stats.dropped += 1;
                return ReconcilePlan {
                    outcome: ReconcileOutcome::Dropped,
                    ops: Vec::new(),
                    confirmed_temp: None,
                };
            }
        };

        match plan.outcome {
            ReconcileOutcome::Inserted => self.stats.inserted += 1,
            ReconcileOutcome::Replaced => self.stats.replaced += 1,
            ReconcileOutcome::Removed => self.stats.removed += 1,
            ReconcileOutcome::Ignored => self.stats.ignored += 1,
            ReconcileOutcome::Dropped => {}
        }
        tracing::debug!(outcome = ?plan.outcome, ops = plan.ops.len(), "reconciled notification");

        store.apply(plan.ops.clone());
        plan
    }

    fn removal_plan(
        &self,
        store: &LocalStore,
        id: &EntityId,
        temp_id: Option<EntityId>,
        temp_row_present: bool,
        row_present: bool,
    ) -> ReconcilePlan {
        let mut ops = Vec::new();
        if row_present {
            ops.push(StoreOp::Remove { id: id.clone() });
            if self.promote_orphans {
                // Children stay reachable when their parent leaves scope.
                for child in store.children_of(id) {
                    ops.push(StoreOp::Promote { id: child });
                }
            }
        }
        if temp_row_present {
            if let Some(temp) = &temp_id {
                ops.push(StoreOp::Remove { id: temp.clone() });
            }
        }

        if ops.is_empty() {
            return ReconcilePlan::ignored();
        }
        ReconcilePlan {
            outcome: ReconcileOutcome::Removed,
            ops,
            confirmed_temp: temp_id.filter(|_| temp_row_present),
        }
    }

    /// Promotion bookkeeping for an entity entering or staying in view.
    fn placement_ops(&self, store: &LocalStore, merged: &Entity) -> Vec<StoreOp> {
        let mut ops = Vec::new();
        match &merged.parent_id {
            Some(parent) if !store.contains(parent) => {
                if self.promote_orphans {
                    ops.push(StoreOp::Promote {
                        id: merged.id.clone(),
                    });
                }
            }
            _ => {
                if store.is_promoted(&merged.id) {
                    ops.push(StoreOp::Demote {
                        id: merged.id.clone(),
                    });
                }
            }
        }

        // This entity becoming present re-nests any of its promoted children.
        for child in store.children_of(&merged.id) {
            if store.is_promoted(&child) {
                ops.push(StoreOp::Demote { id: child });
            }
        }
        ops
    }
}
