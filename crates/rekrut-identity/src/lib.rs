//! Local identity store and reconciliation
//!
//! SQLite-backed account table keyed by email, plus the engine that syncs
//! directory profiles into it.

pub mod reconcile;
pub mod store;

pub use reconcile::Reconciler;
pub use store::IdentityStore;
