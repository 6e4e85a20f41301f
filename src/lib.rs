//! boardsync - Client-Side Reconciliation Engine
//!
//! This library keeps an in-memory collection of task-board entities
//! synchronized with a server that pushes an unordered, partial,
//! at-least-once stream of change notifications, while absorbing the
//! client's own not-yet-confirmed writes without duplicate or flickering
//! UI identities.
//!
//! # Core Concepts
//!
//! - **Change notifications**: row-level insert/update/delete messages with
//!   partial payloads (large unchanged fields are elided, not nulled)
//! - **Visibility**: pure role/scope rules evaluated before and after each
//!   update to catch entities moving into or out of a principal's view
//! - **Optimistic writes**: locally-created rows shown immediately under a
//!   temp id and swapped for the authoritative row on confirmation, with a
//!   stable rendering identity across the transition
//! - **Promotion**: children of out-of-scope parents surface as top-level
//!   items instead of silently disappearing
//!
//! # Module Organization
//!
//! - `access`: visibility rules and the session access context
//! - `attachment`: signed attachment references and body stabilization
//! - `config`: engine configuration from the host app's TOML
//! - `engine`: the per-notification reconciliation state machine
//! - `entity`: wire and in-memory entity types
//! - `error`: error types and result alias
//! - `ledger`: optimistic write ledger and stable keys
//! - `merge`: partial-payload merging
//! - `patch`: three-state wire fields (absent / null / value)
//! - `resolver`: async client-to-company resolution seam
//! - `store`: the single-writer local collection
//! - `subscription`: open/close lifecycle and the driver loop

pub mod access;
pub mod attachment;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod ledger;
pub mod merge;
pub mod patch;
pub mod resolver;
pub mod store;
pub mod subscription;

pub use error::{Error, Result};
