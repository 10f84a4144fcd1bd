//! Data-structure analysis configuration
//!
//! One flat config shared by all five stages. Loaded from a preset, adjusted
//! with builder setters or a YAML patch, and validated before use.

use super::error::{ConfigError, ConfigResult};
use super::preset::Preset;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported YAML schema versions
const SUPPORTED_VERSIONS: &[u32] = &[1];

/// Analysis configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DsaConfig {
    /// Name of the program entry function (graph roots start here)
    pub entry_function: String,

    /// External functions whose result is a fresh heap object
    pub allocator_functions: Vec<String>,

    /// External functions that release memory (no call site is recorded)
    pub deallocator_functions: Vec<String>,

    /// Distinguish fields of a node; when off every GEP folds its node
    pub field_sensitive: bool,

    /// Keep unreachable global nodes that can still reach live nodes
    pub keep_unreachable_globals: bool,

    /// Upper bound on bottom-up rounds for a single graph
    pub max_bottom_up_revisits: usize,

    /// Share merge work between indirect calls with the same target set
    pub memoize_indirect_calls: bool,

    /// Build Stage 1 graphs on the rayon pool (needs the `parallel` feature)
    pub parallel_local: bool,
}

impl DsaConfig {
    /// Build the configuration for a preset
    pub fn from_preset(preset: Preset) -> Self {
        let base = Self {
            entry_function: "main".to_string(),
            allocator_functions: ["malloc", "calloc", "realloc", "pmem_map_file", "pmemobj_direct"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            deallocator_functions: ["free", "pmem_unmap"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            field_sensitive: true,
            keep_unreachable_globals: true,
            max_bottom_up_revisits: 8,
            memoize_indirect_calls: true,
            parallel_local: true,
        };

        match preset {
            Preset::Fast => Self {
                field_sensitive: false,
                max_bottom_up_revisits: 1,
                memoize_indirect_calls: false,
                parallel_local: false,
                ..base
            },
            Preset::Balanced => base,
            Preset::Thorough => Self {
                max_bottom_up_revisits: 32,
                ..base
            },
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.entry_function.trim().is_empty() {
            return Err(ConfigError::Validation(
                "entry_function must name a function".to_string(),
            ));
        }

        if self.max_bottom_up_revisits == 0 || self.max_bottom_up_revisits > 1000 {
            return Err(ConfigError::range_with_hint(
                "max_bottom_up_revisits",
                self.max_bottom_up_revisits,
                1,
                1000,
                "A graph must be processed at least once",
            ));
        }

        if let Some(name) = self
            .allocator_functions
            .iter()
            .find(|name| self.deallocator_functions.contains(name))
        {
            return Err(ConfigError::Validation(format!(
                "'{}' is listed as both allocator and deallocator",
                name
            )));
        }

        Ok(())
    }

    /// Builder: Set entry_function
    pub fn entry_function(mut self, v: impl Into<String>) -> Self {
        self.entry_function = v.into();
        self
    }

    /// Builder: Set field_sensitive
    pub fn field_sensitive(mut self, v: bool) -> Self {
        self.field_sensitive = v;
        self
    }

    /// Builder: Set keep_unreachable_globals
    pub fn keep_unreachable_globals(mut self, v: bool) -> Self {
        self.keep_unreachable_globals = v;
        self
    }

    /// Builder: Set max_bottom_up_revisits
    pub fn max_bottom_up_revisits(mut self, v: usize) -> Self {
        self.max_bottom_up_revisits = v;
        self
    }

    /// Builder: Set memoize_indirect_calls
    pub fn memoize_indirect_calls(mut self, v: bool) -> Self {
        self.memoize_indirect_calls = v;
        self
    }

    /// Builder: Set parallel_local
    pub fn parallel_local(mut self, v: bool) -> Self {
        self.parallel_local = v;
        self
    }

    /// Builder: Add an allocator function name
    pub fn allocator(mut self, name: impl Into<String>) -> Self {
        self.allocator_functions.push(name.into());
        self
    }

    pub fn is_allocator(&self, name: &str) -> bool {
        self.allocator_functions.iter().any(|f| f == name)
    }

    pub fn is_deallocator(&self, name: &str) -> bool {
        self.deallocator_functions.iter().any(|f| f == name)
    }

    /// Apply a patch on top of this configuration
    pub fn apply_patch(mut self, patch: DsaConfigPatch) -> Self {
        if let Some(v) = patch.entry_function {
            self.entry_function = v;
        }
        if let Some(v) = patch.allocator_functions {
            self.allocator_functions = v;
        }
        if let Some(v) = patch.deallocator_functions {
            self.deallocator_functions = v;
        }
        if let Some(v) = patch.field_sensitive {
            self.field_sensitive = v;
        }
        if let Some(v) = patch.keep_unreachable_globals {
            self.keep_unreachable_globals = v;
        }
        if let Some(v) = patch.max_bottom_up_revisits {
            self.max_bottom_up_revisits = v;
        }
        if let Some(v) = patch.memoize_indirect_calls {
            self.memoize_indirect_calls = v;
        }
        if let Some(v) = patch.parallel_local {
            self.parallel_local = v;
        }
        self
    }

    /// Parse a v1 YAML document (preset + overrides) and validate it
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(content)?;

        if !SUPPORTED_VERSIONS.contains(&file.version) {
            return Err(ConfigError::UnsupportedVersion {
                found: file.version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }

        let preset = Preset::from_str(&file.preset)
            .map_err(|_| ConfigError::UnknownPreset(file.preset.clone()))?;

        let mut config = Self::from_preset(preset);
        if let Some(overrides) = file.overrides {
            config = config.apply_patch(overrides);
        }
        config.validate()?;
        Ok(config)
    }

    /// Load from YAML file (v1 schema)
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Export to YAML; every field is written as an override of `balanced`
    pub fn to_yaml(&self) -> ConfigResult<String> {
        let file = ConfigFileV1 {
            version: 1,
            preset: Preset::Balanced.to_string(),
            overrides: Some(DsaConfigPatch::from(self.clone())),
        };
        Ok(serde_yaml::to_string(&file)?)
    }
}

impl Default for DsaConfig {
    fn default() -> Self {
        Self::from_preset(Preset::Balanced)
    }
}

/// Patch type for DsaConfig (all fields optional)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DsaConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocator_functions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deallocator_functions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_sensitive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_unreachable_globals: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bottom_up_revisits: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memoize_indirect_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_local: Option<bool>,
}

impl From<DsaConfig> for DsaConfigPatch {
    fn from(config: DsaConfig) -> Self {
        Self {
            entry_function: Some(config.entry_function),
            allocator_functions: Some(config.allocator_functions),
            deallocator_functions: Some(config.deallocator_functions),
            field_sensitive: Some(config.field_sensitive),
            keep_unreachable_globals: Some(config.keep_unreachable_globals),
            max_bottom_up_revisits: Some(config.max_bottom_up_revisits),
            memoize_indirect_calls: Some(config.memoize_indirect_calls),
            parallel_local: Some(config.parallel_local),
        }
    }
}

/// YAML Schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileV1 {
    /// Schema version (always 1 for v1)
    pub version: u32,

    /// Base preset
    pub preset: String,

    /// Fine-grained overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<DsaConfigPatch>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_balanced_and_valid() {
        let config = DsaConfig::default();
        assert_eq!(config, DsaConfig::from_preset(Preset::Balanced));
        assert!(config.validate().is_ok());
        assert!(config.is_allocator("malloc"));
        assert!(config.is_deallocator("free"));
    }

    #[test]
    fn test_fast_preset_is_field_insensitive() {
        let config = DsaConfig::from_preset(Preset::Fast);
        assert!(!config.field_sensitive);
        assert!(!config.memoize_indirect_calls);
        assert_eq!(config.max_bottom_up_revisits, 1);
    }

    #[test]
    fn test_validate_rejects_zero_revisits() {
        let config = DsaConfig::default().max_bottom_up_revisits(0);
        assert!(matches!(config.validate(), Err(ConfigError::Range { .. })));
    }

    #[test]
    fn test_validate_rejects_empty_entry() {
        let config = DsaConfig::default().entry_function("  ");
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_allocator_deallocator_overlap() {
        let config = DsaConfig::default().allocator("free");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_overrides_apply_on_preset() {
        let yaml = r#"
version: 1
preset: fast
overrides:
  entry_function: start
  max_bottom_up_revisits: 4
"#;
        let config = DsaConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.entry_function, "start");
        assert_eq!(config.max_bottom_up_revisits, 4);
        assert!(!config.field_sensitive);
    }

    #[test]
    fn test_yaml_rejects_unknown_version_and_preset() {
        let bad_version = "version: 2\npreset: fast\n";
        assert!(matches!(
            DsaConfig::from_yaml_str(bad_version),
            Err(ConfigError::UnsupportedVersion { found: 2, .. })
        ));

        let bad_preset = "version: 1\npreset: exhaustive\n";
        assert!(matches!(
            DsaConfig::from_yaml_str(bad_preset),
            Err(ConfigError::UnknownPreset(_))
        ));
    }

    #[test]
    fn test_yaml_export_reloads_identically() {
        let config = DsaConfig::from_preset(Preset::Thorough).entry_function("entry");
        let yaml = config.to_yaml().unwrap();
        let reloaded = DsaConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(config, reloaded);
    }
}
