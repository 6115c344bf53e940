//! CLI command implementations for hopgate.

pub mod check;
pub mod query;
pub mod serve;
