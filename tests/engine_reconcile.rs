mod support;

use boardsync::access::AccessContext;
use boardsync::config::EngineConfig;
use boardsync::engine::{ReconcileOutcome, Reconciler};
use boardsync::entity::{AssigneeKind, ChangeNotification, EntityId, EntityKind};
use boardsync::ledger::OptimisticLedger;
use boardsync::patch::Patch;
use boardsync::resolver::CompanyDirectory;
use boardsync::store::LocalStore;

use support::{
    assigned, child, client_ctx, entity, full_update, hard_delete, insert_of, internal_ctx,
    patch_for, restricted_ctx, soft_delete, ts, update,
};

struct Rig {
    reconciler: Reconciler,
    store: LocalStore,
    ledger: OptimisticLedger,
}

impl Rig {
    fn new(ctx: AccessContext) -> Self {
        support::init_tracing();
        Self {
            reconciler: Reconciler::new(EntityKind::Task, ctx, &EngineConfig::default()),
            store: LocalStore::new(),
            ledger: OptimisticLedger::new(),
        }
    }

    fn apply(&mut self, notification: &ChangeNotification) -> ReconcileOutcome {
        self.reconciler
            .apply(
                &mut self.store,
                &self.ledger,
                notification,
                &CompanyDirectory::new(),
            )
            .outcome
    }

    fn apply_with(
        &mut self,
        notification: &ChangeNotification,
        companies: &CompanyDirectory,
    ) -> ReconcileOutcome {
        self.reconciler
            .apply(&mut self.store, &self.ledger, notification, companies)
            .outcome
    }

    fn ids(&self) -> Vec<String> {
        self.store
            .snapshot()
            .iter()
            .map(|entity| entity.id.to_string())
            .collect()
    }
}

#[test]
fn insert_then_update_then_soft_delete() {
    let mut rig = Rig::new(internal_ctx());
    let mut task = entity("T1");
    task.body = Some("hello".to_string());

    assert_eq!(rig.apply(&insert_of(&task)), ReconcileOutcome::Inserted);
    assert_eq!(rig.ids(), vec!["T1"]);

    let mut patch = patch_for("T1");
    patch.body = Patch::Value("edited".to_string());
    assert_eq!(rig.apply(&update(patch)), ReconcileOutcome::Replaced);
    assert_eq!(
        rig.store.get(&EntityId::from("T1")).and_then(|e| e.body.clone()),
        Some("edited".to_string())
    );

    assert_eq!(
        rig.apply(&soft_delete("T1", ts(100))),
        ReconcileOutcome::Removed
    );
    assert!(rig.store.is_empty());
}

#[test]
fn update_without_body_key_keeps_local_body() {
    let mut rig = Rig::new(internal_ctx());
    let mut task = entity("T1");
    task.body = Some("hello".to_string());
    rig.apply(&insert_of(&task));

    // {eventType: UPDATE, next: {id: "T1", workspaceId: "W"}}
    rig.apply(&update(patch_for("T1")));

    let held = rig.store.get(&EntityId::from("T1")).expect("present");
    assert_eq!(held.body.as_deref(), Some("hello"));
    assert_eq!(held.workspace_id, "W");
}

#[test]
fn replaying_a_notification_is_a_no_op() {
    let mut rig = Rig::new(internal_ctx());
    let mut task = entity("T1");
    task.body = Some("hello".to_string());
    let insert = insert_of(&task);

    rig.apply(&insert);
    let once = rig.store.snapshot();

    for _ in 0..3 {
        rig.apply(&insert);
    }
    assert_eq!(rig.store.snapshot(), once);

    // Replayed soft delete is equally harmless.
    let delete = soft_delete("T1", ts(100));
    assert_eq!(rig.apply(&delete), ReconcileOutcome::Removed);
    assert_eq!(rig.apply(&delete), ReconcileOutcome::Ignored);
    assert!(rig.store.is_empty());
}

#[test]
fn interleaving_across_entities_does_not_change_the_result() {
    let task_a = {
        let mut t = entity("A");
        t.body = Some("first".to_string());
        t
    };
    let mut edit_a = patch_for("A");
    edit_a.body = Patch::Value("second".to_string());

    let insert_a = insert_of(&task_a);
    let update_a = update(edit_a);
    let insert_b = insert_of(&entity("B"));

    // A's notifications keep their relative order; B floats freely.
    let orderings: [[&ChangeNotification; 3]; 3] = [
        [&insert_a, &update_a, &insert_b],
        [&insert_a, &insert_b, &update_a],
        [&insert_b, &insert_a, &update_a],
    ];

    let mut snapshots = Vec::new();
    for ordering in orderings {
        let mut rig = Rig::new(internal_ctx());
        for notification in ordering {
            rig.apply(notification);
        }
        snapshots.push(rig.store.snapshot());
    }

    assert_eq!(snapshots[0], snapshots[1]);
    assert_eq!(snapshots[1], snapshots[2]);
    assert_eq!(
        snapshots[0]
            .iter()
            .find(|e| e.id.as_str() == "A")
            .and_then(|e| e.body.as_deref()),
        Some("second")
    );
}

#[test]
fn hard_delete_removes_the_row() {
    let mut rig = Rig::new(internal_ctx());
    rig.apply(&insert_of(&entity("T1")));
    assert_eq!(rig.apply(&hard_delete("T1")), ReconcileOutcome::Removed);
    assert!(rig.store.is_empty());

    // Unknown id deletes are ignored, not errors.
    assert_eq!(rig.apply(&hard_delete("T9")), ReconcileOutcome::Ignored);
}

#[test]
fn reassignment_round_trip_restores_identical_content() {
    let mut rig = Rig::new(client_ctx("c-1", "co-1"));
    let mut task = assigned("T1", "c-1", AssigneeKind::Client);
    task.body = Some("mine".to_string());

    assert_eq!(rig.apply(&insert_of(&task)), ReconcileOutcome::Inserted);

    // Reassigned away: leaves this principal's view.
    let mut elsewhere = task.clone();
    elsewhere.assignee_id = Some("c-2".to_string());
    assert_eq!(rig.apply(&full_update(&elsewhere)), ReconcileOutcome::Removed);
    assert!(rig.store.is_empty());

    // Reassigned back with identical content: reappears, fields intact.
    assert_eq!(rig.apply(&full_update(&task)), ReconcileOutcome::Inserted);
    assert_eq!(rig.store.get(&task.id), Some(&task));
}

#[test]
fn updates_for_entities_outside_the_view_are_ignored() {
    let mut rig = Rig::new(client_ctx("c-1", "co-1"));
    let foreign = assigned("T1", "c-2", AssigneeKind::Client);
    assert_eq!(rig.apply(&full_update(&foreign)), ReconcileOutcome::Ignored);
    assert!(rig.store.is_empty());
}

#[test]
fn restricted_session_fails_closed_without_resolution() {
    let mut rig = Rig::new(restricted_ctx(&["co-1"]));
    let task = assigned("T1", "c-1", AssigneeKind::Client);

    // No directory entry: the client's company is unknown.
    assert_eq!(rig.apply(&insert_of(&task)), ReconcileOutcome::Ignored);

    let mut companies = CompanyDirectory::new();
    companies.insert("c-1", "co-1");
    assert_eq!(
        rig.apply_with(&insert_of(&task), &companies),
        ReconcileOutcome::Inserted
    );
}

#[test]
fn orphaned_child_is_promoted_to_root() {
    let mut rig = Rig::new(internal_ctx());
    let sub = child("C1", "P1");

    rig.apply(&insert_of(&sub));
    assert!(rig.store.is_promoted(&EntityId::from("C1")));
    let roots: Vec<&str> = rig.store.roots().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(roots, vec!["C1"]);
}

#[test]
fn child_is_demoted_when_parent_arrives() {
    let mut rig = Rig::new(internal_ctx());
    rig.apply(&insert_of(&child("C1", "P1")));

    let mut parent = entity("P1");
    parent.created_at = ts(1);
    rig.apply(&insert_of(&parent));

    assert!(!rig.store.is_promoted(&EntityId::from("C1")));
    let roots: Vec<&str> = rig.store.roots().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(roots, vec!["P1"]);
    // One row per id, no duplicate from the promotion path.
    assert_eq!(rig.store.len(), 2);
}

#[test]
fn removing_a_parent_promotes_its_children() {
    let mut rig = Rig::new(internal_ctx());
    rig.apply(&insert_of(&entity("P1")));
    let sub = {
        let mut c = child("C1", "P1");
        c.created_at = ts(1);
        c
    };
    rig.apply(&insert_of(&sub));
    assert!(!rig.store.is_promoted(&EntityId::from("C1")));

    rig.apply(&soft_delete("P1", ts(100)));
    assert!(rig.store.is_promoted(&EntityId::from("C1")));
    let roots: Vec<&str> = rig.store.roots().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(roots, vec!["C1"]);
}

#[test]
fn malformed_notifications_are_dropped_and_counted() {
    let mut rig = Rig::new(internal_ctx());

    // No id at all.
    let no_id = update(boardsync::entity::EntityPatch::default());
    assert_eq!(rig.apply(&no_id), ReconcileOutcome::Dropped);

    // Cold update missing createdAt cannot be materialized.
    let cold = update(patch_for("T1"));
    assert_eq!(rig.apply(&cold), ReconcileOutcome::Dropped);

    // A local id must never come back down the change stream.
    let mut echoed = patch_for("tmp-01ARZ3NDEKTSV4RRFFQ69G5FAV");
    echoed.created_at = Patch::Value(ts(0));
    assert_eq!(rig.apply(&update(echoed)), ReconcileOutcome::Dropped);

    let stats = rig.reconciler.stats();
    assert_eq!(stats.dropped, 3);
    assert!(rig.store.is_empty());
}

#[test]
fn stats_track_outcomes() {
    let mut rig = Rig::new(internal_ctx());
    rig.apply(&insert_of(&entity("T1")));
    rig.apply(&insert_of(&entity("T1")));
    rig.apply(&soft_delete("T1", ts(10)));
    rig.apply(&soft_delete("T1", ts(10)));

    let stats = rig.reconciler.stats();
    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.replaced, 1);
    assert_eq!(stats.removed, 1);
    assert_eq!(stats.ignored, 1);
    assert_eq!(stats.dropped, 0);
}
