//! Entity contract shared by the façade, the session and the stores.
//!
//! # Invariants
//! - Every persisted entity is identified by an `EntityId` assigned by the store.
//! - The serialized property map is the single source of truth for change
//!   tracking and storage.

pub mod entity;
