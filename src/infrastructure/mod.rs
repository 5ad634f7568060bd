//! Infrastructure layer: everything that touches the outside world.
//!
//! - Configuration loading (figment: defaults, YAML, environment)
//! - Structured logging setup
//! - TCP client for the remote optimization service

pub mod config;
pub mod logging;
pub mod remote;

pub use config::{ConfigLoader, OptimizerConfig};
pub use remote::{RemoteAlgorithmClient, RemoteSettings};
