//! Shared types, error model, and configuration for coenroll.
//!
//! This crate is the foundation depended on by all other coenroll crates.
//! It provides:
//! - [`CoenrollError`], the unified error type
//! - Domain types ([`UserRecord`], [`OrganizationSet`], [`EnrollmentResult`])
//! - Configuration ([`AppConfig`], [`RegistrySettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, EnrollConfig, FailurePolicy, OrganizationsConfig, RegistryConfig,
    RegistryOverrides, RegistrySettings, base_url, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{CoenrollError, Result};
pub use types::{
    EnrollmentResult, FIELD_COUNT, OrganizationSet, RequiredField, UserRecord, numbered_lines,
    split_fields,
};
