//! Error types for boardsync
//!
//! Reconcile-path errors are handled locally: the offending notification is
//! dropped and logged, and the collection keeps its previous state. Nothing
//! in this taxonomy is surfaced to the UI — the worst observable symptom of
//! a drop is a stale list entry until the next notification or a refresh.

use thiserror::Error;

use crate::entity::EntityId;

/// Main error type for boardsync operations
#[derive(Error, Debug)]
pub enum Error {
    // Reconcile-path errors (dropped and logged, non-fatal)
    #[error("Malformed notification: {reason}")]
    MalformedNotification { reason: String },

    #[error("Cannot resolve company for client {client_id}")]
    UnresolvableCompany { client_id: String },

    #[error("Identity conflict: {id} already confirmed for optimistic entry {temp_id}")]
    IdentityConflict { id: EntityId, temp_id: String },

    // Subscription lifecycle
    #[error("Notification channel closed")]
    ChannelClosed,

    #[error("Subscription already closed")]
    SubscriptionClosed,

    // Configuration and serialization
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error is absorbed by the reconcile loop (drop + log)
    /// rather than propagated to the subscription owner.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::MalformedNotification { .. }
                | Error::UnresolvableCompany { .. }
                | Error::IdentityConflict { .. }
        )
    }
}

/// Result type alias for boardsync operations
pub type Result<T> = std::result::Result<T, Error>;
