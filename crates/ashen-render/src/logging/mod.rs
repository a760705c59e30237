//! Logging utilities.
//!
//! This module centralizes logger initialization. The crate itself only
//! emits through the `log` facade; `env_logger` is installed here for hosts
//! and tests that do not bring their own backend.

mod init;

pub use init::{init_logging, init_test_logging, LoggingConfig};
