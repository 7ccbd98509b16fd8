//! UA Switch Core Library
//!
//! This crate provides shared types, errors, presets and configuration for UA Switch.

pub mod config;
pub mod error;
pub mod presets;
pub mod settings;

pub use config::{AppConfig, BackendKind};
pub use error::{UaError, UaResult};
pub use settings::{DomainRules, SettingKey, Snapshot, Update, UserAgentEntries, UserAgentEntry};
