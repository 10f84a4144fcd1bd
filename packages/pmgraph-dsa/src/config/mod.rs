//! Configuration System
//!
//! Two-tier configuration:
//! - Level 1: Preset (fast, balanced, thorough)
//! - Level 2: YAML/patch overrides of individual fields
//!
//! # Examples
//!
//! ```rust,ignore
//! use pmgraph_dsa::config::{DsaConfig, Preset};
//!
//! let config = DsaConfig::from_preset(Preset::Fast).entry_function("start");
//! config.validate()?;
//!
//! let config = DsaConfig::from_yaml_file("dsa.yaml")?;
//! ```

pub mod dsa_config;
pub mod error;
pub mod preset;

pub use dsa_config::{ConfigFileV1, DsaConfig, DsaConfigPatch};
pub use error::{ConfigError, ConfigResult};
pub use preset::Preset;
