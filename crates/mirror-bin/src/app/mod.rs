//! Subcommand implementations.

mod flush;
mod lifecycle;

pub use flush::run_flush;
pub use lifecycle::{check_status, run_migrate};
