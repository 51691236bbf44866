//! CLI command implementations

pub mod check;
pub mod config;
pub mod init;
pub mod read;
pub mod stats;
pub mod tree;
pub mod write;
