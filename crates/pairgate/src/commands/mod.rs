//! Subcommand handlers.

pub mod clear;
pub mod pair;
pub mod serve;
pub mod status;
pub mod util;
