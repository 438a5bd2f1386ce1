//! Data models for abcp-sync

mod source_user;
mod user;

pub use source_user::SourceUser;
pub use user::{SyncState, UserRecord};

#[cfg(test)]
pub(crate) use user::sample_record;
