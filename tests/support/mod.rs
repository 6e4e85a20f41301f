#![allow(dead_code)]

use std::sync::Once;

use boardsync::access::AccessContext;
use boardsync::entity::{
    AssigneeKind, ChangeEventType, ChangeNotification, Entity, EntityId, EntityKind, EntityPatch,
};
use boardsync::patch::Patch;
use chrono::{DateTime, TimeZone, Utc};

pub const WORKSPACE: &str = "W";

static TRACE_INIT: Once = Once::new();

/// Tracing is opt-in via RUST_LOG, as in production wiring.
pub fn init_tracing() {
    TRACE_INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

pub fn ts(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().expect("timestamp")
}

pub fn entity(id: &str) -> Entity {
    Entity {
        id: EntityId::from(id),
        kind: EntityKind::Task,
        parent_id: None,
        workspace_id: WORKSPACE.to_string(),
        assignee_id: None,
        assignee_type: None,
        body: None,
        deleted_at: None,
        created_at: ts(0),
    }
}

pub fn child(id: &str, parent: &str) -> Entity {
    let mut entity = entity(id);
    entity.parent_id = Some(EntityId::from(parent));
    entity
}

pub fn assigned(id: &str, assignee: &str, kind: AssigneeKind) -> Entity {
    let mut entity = entity(id);
    entity.assignee_id = Some(assignee.to_string());
    entity.assignee_type = Some(kind);
    entity
}

/// Patch carrying only id and workspace, the minimal update envelope.
pub fn patch_for(id: &str) -> EntityPatch {
    EntityPatch {
        id: Patch::Value(EntityId::from(id)),
        workspace_id: Patch::Value(WORKSPACE.to_string()),
        ..EntityPatch::default()
    }
}

pub fn insert_of(entity: &Entity) -> ChangeNotification {
    ChangeNotification {
        event_type: ChangeEventType::Insert,
        previous: None,
        next: EntityPatch::from_entity(entity),
    }
}

pub fn update(next: EntityPatch) -> ChangeNotification {
    ChangeNotification {
        event_type: ChangeEventType::Update,
        previous: None,
        next,
    }
}

pub fn full_update(entity: &Entity) -> ChangeNotification {
    update(EntityPatch::from_entity(entity))
}

pub fn soft_delete(id: &str, at: DateTime<Utc>) -> ChangeNotification {
    let mut next = patch_for(id);
    next.deleted_at = Patch::Value(at);
    update(next)
}

pub fn hard_delete(id: &str) -> ChangeNotification {
    ChangeNotification {
        event_type: ChangeEventType::Delete,
        previous: None,
        next: patch_for(id),
    }
}

pub fn internal_ctx() -> AccessContext {
    AccessContext::internal("emp-1", WORKSPACE)
}

pub fn client_ctx(principal: &str, company: &str) -> AccessContext {
    AccessContext::client(principal, WORKSPACE, company)
}

pub fn restricted_ctx(companies: &[&str]) -> AccessContext {
    AccessContext::internal("emp-1", WORKSPACE)
        .with_company_access(companies.iter().map(|c| c.to_string()).collect())
}
