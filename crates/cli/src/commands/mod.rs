//! CLI subcommand implementations.

pub mod agents;
pub mod init;
pub mod run;
