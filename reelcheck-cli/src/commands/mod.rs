//! Subcommand implementations.

pub mod check;
pub mod fingerprint;
pub mod incident;
