//! Configuration, paths, and logging setup for chain-mirror.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{CatalogPolicy, Config, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
