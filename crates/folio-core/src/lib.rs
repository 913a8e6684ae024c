//! Folio Core Library
//!
//! This crate provides the site configuration, shared types and errors for folio.

pub mod config;
pub mod error;
pub mod types;

pub use config::{PageConfig, SiteConfig, WorkerConfig};
pub use error::{SiteError, SiteResult};
pub use types::Quote;
