//! # Folio Common
//!
//! Logging setup shared by the worker, the page controller and the smoke harness.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};
