//! abcp-sync-core - Core library for abcp-sync
//!
//! Replicates ABCP users into Bitrix24: a local libSQL store of source users,
//! import sweeps from the ABCP listing, a Bitrix24 gateway and the
//! reconciliation engine that turns each stored user into a contact and a deal.

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod reconcile;
pub mod retry;
pub mod source;
pub mod util;

pub use error::{Error, Result};
pub use models::{SourceUser, SyncState, UserRecord};
