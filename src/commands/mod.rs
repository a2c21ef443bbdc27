//! CLI commands

pub mod plan;
pub mod workable;
