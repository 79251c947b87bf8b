pub mod config;
pub mod query;
pub mod shell;
pub mod update;
