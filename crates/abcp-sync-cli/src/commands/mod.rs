pub mod common;
pub mod daemon;
pub mod import;
pub mod init_db;
pub mod run;
pub mod status;
pub mod sync;
