//! Local record store for abcp-sync

mod connection;
mod meta_repository;
mod migrations;
mod user_repository;

pub use connection::Database;
pub use meta_repository::{
    LibSqlMetaRepository, MetaRepository, LAST_FULL_IMPORT_AT, LAST_INCREMENTAL_IMPORT_AT,
};
pub use user_repository::{LibSqlUserRepository, UserCounts, UserRepository};
