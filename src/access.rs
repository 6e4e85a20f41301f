//! Visibility rules for board entities.
//!
//! A pure predicate over an entity projection and the session's access
//! context. The engine evaluates it twice per update — against the row it
//! currently holds and against the merged result — to detect visibility
//! transitions, so the function must stay side-effect free.
//!
//! Company resolution for client-assigned entities is I/O (the client's
//! company lives in another table) and is performed by the caller; this
//! module only consumes the pre-resolved id. An unresolved company fails
//! closed: when in doubt, not visible.

use serde::{Deserialize, Serialize};

use crate::entity::{AssigneeKind, Entity};

/// Principal role for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    InternalUser,
    Client,
}

/// Session-scoped access context, supplied once per subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessContext {
    pub principal_id: String,
    pub role: Role,
    pub workspace_id: String,
    /// The client principal's own company, when role is `Client`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    /// When set, restricts an internal user to entities scoped to these
    /// companies. `None` means unrestricted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_access_list: Option<Vec<String>>,
}

impl AccessContext {
    pub fn internal(principal_id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            role: Role::InternalUser,
            workspace_id: workspace_id.into(),
            company_id: None,
            company_access_list: None,
        }
    }

    pub fn client(
        principal_id: impl Into<String>,
        workspace_id: impl Into<String>,
        company_id: impl Into<String>,
    ) -> Self {
        Self {
            principal_id: principal_id.into(),
            role: Role::Client,
            workspace_id: workspace_id.into(),
            company_id: Some(company_id.into()),
            company_access_list: None,
        }
    }

    pub fn with_company_access(mut self, companies: Vec<String>) -> Self {
        self.company_access_list = Some(companies);
        self
    }

    /// Whether visibility decisions for client-assigned entities need the
    /// client's company resolved first.
    pub fn needs_company_resolution(&self) -> bool {
        self.company_access_list.is_some()
    }
}

/// The fields of an entity that visibility depends on.
///
/// `company_id` is the pre-resolved effective company of a client assignee,
/// or `None` when unknown (unresolved lookups stay `None` and fail closed).
#[derive(Debug, Clone, Copy)]
pub struct AccessView<'a> {
    pub workspace_id: Option<&'a str>,
    pub assignee_id: Option<&'a str>,
    pub assignee_type: Option<AssigneeKind>,
    pub company_id: Option<&'a str>,
}

impl<'a> AccessView<'a> {
    pub fn of(entity: &'a Entity, company_id: Option<&'a str>) -> Self {
        Self {
            workspace_id: Some(entity.workspace_id.as_str()),
            assignee_id: entity.assignee_id.as_deref(),
            assignee_type: entity.assignee_type,
            company_id,
        }
    }

    /// The company this entity is effectively scoped to, if any.
    ///
    /// Directly company-assigned entities carry it as the assignee; entities
    /// assigned to a client inherit the client's company via a side lookup.
    fn effective_company(&self) -> EffectiveCompany<'a> {
        match self.assignee_type {
            Some(AssigneeKind::Company) => match self.assignee_id {
                Some(id) => EffectiveCompany::Known(id),
                None => EffectiveCompany::Unknown,
            },
            Some(AssigneeKind::Client) => match self.company_id {
                Some(id) => EffectiveCompany::Known(id),
                None => EffectiveCompany::Unknown,
            },
            // Internal or unassigned entities have no company dimension.
            Some(AssigneeKind::InternalUser) | None => EffectiveCompany::None,
        }
    }
}

enum EffectiveCompany<'a> {
    Known(&'a str),
    /// Company-scoped but the company could not be determined.
    Unknown,
    /// Not company-scoped at all.
    None,
}

/// Is this entity visible to the session's principal?
pub fn is_visible(view: &AccessView<'_>, ctx: &AccessContext) -> bool {
    // Tenant scope is a hard filter; a missing workspace is never visible.
    match view.workspace_id {
        Some(workspace) if workspace == ctx.workspace_id => {}
        _ => return false,
    }

    match ctx.role {
        Role::Client => {
            let Some(assignee) = view.assignee_id else {
                return false;
            };
            assignee == ctx.principal_id || Some(assignee) == ctx.company_id.as_deref()
        }
        Role::InternalUser => match &ctx.company_access_list {
            None => true,
            Some(allowed) => match view.effective_company() {
                EffectiveCompany::Known(company) => {
                    allowed.iter().any(|entry| entry.as_str() == company)
                }
                EffectiveCompany::Unknown => false,
                EffectiveCompany::None => true,
            },
        },
    }
}
