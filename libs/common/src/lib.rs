//! Shared basics for the KPI engine crates
//!
//! Provides the functions every crate in the workspace leans on:
//! - logging setup (`tracing-subscriber` console/file layers)
//! - configuration loading (`figment` file + environment merge)
//! - the common error type

pub mod config_loader;
pub mod error;
pub mod logging;

pub use config_loader::load_config_with_env;
pub use error::{Error, Result};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use tracing_appender::non_blocking::WorkerGuard;
