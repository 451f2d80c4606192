//! Breachwatch Core - Foundation crate for the breachwatch checker.
//!
//! This crate provides shared types, error handling and configuration
//! management that the checking pipeline and the command-line shell depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Shared newtypes and enums (`EntryId`, `BreachSource`)
//!
//! # Example
//!
//! ```rust
//! use breachwatch_core::{AppConfig, BreachSource};
//!
//! let config = AppConfig::default();
//! assert_eq!(config.http.timeout_secs, 1800);
//!
//! // Backends always run in declaration order
//! assert_eq!(BreachSource::ALL[0], BreachSource::HaveIBeenPwned);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{AppConfig, CheckingConfig, HttpConfig, SessionConfig, SourcesConfig};
pub use error::{BreachwatchError, ConfigError, ConfigResult, Result};
pub use types::{BreachSource, EntryId};
