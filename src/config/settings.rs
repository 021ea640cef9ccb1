//! TOML-based planner configuration.
//!
//! Example configuration:
//! ```toml
//! accept_partial = false
//! accept_partial_optional = true
//!
//! [naming]
//! max_cte_name_length = 63
//!
//! [environment]
//! auto_derive_date_parts = true
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Shortest CTE name limit that still fits a prefix and a hash suffix.
const MIN_CTE_NAME_LENGTH: usize = 16;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// Tolerate datasources whose columns only partially cover their grain.
    pub accept_partial: bool,

    /// Return a plan that is missing some optional enrichment concepts
    /// rather than failing.
    pub accept_partial_optional: bool,

    /// CTE naming.
    pub naming: NamingSettings,

    /// Catalog construction.
    pub environment: EnvironmentSettings,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            accept_partial: false,
            accept_partial_optional: true,
            naming: NamingSettings::default(),
            environment: EnvironmentSettings::default(),
        }
    }
}

/// CTE naming settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NamingSettings {
    /// Longer names are truncated before the hash suffix is appended.
    pub max_cte_name_length: usize,
}

impl Default for NamingSettings {
    fn default() -> Self {
        Self {
            max_cte_name_length: 63,
        }
    }
}

/// Catalog construction settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    /// Add month/year/... properties for every temporal concept.
    pub auto_derive_date_parts: bool,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            auto_derive_date_parts: true,
        }
    }
}

impl PlannerSettings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: PlannerSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `GRAINLINE_CONFIG`
    /// 2. `./grainline.toml`
    /// 3. `~/.config/grainline/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("GRAINLINE_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("grainline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("grainline").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(PlannerSettings::default())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.naming.max_cte_name_length < MIN_CTE_NAME_LENGTH {
            return Err(SettingsError::InvalidConfig(format!(
                "naming.max_cte_name_length must be at least {}, got {}",
                MIN_CTE_NAME_LENGTH, self.naming.max_cte_name_length
            )));
        }
        Ok(())
    }

    pub fn with_accept_partial(mut self, accept_partial: bool) -> Self {
        self.accept_partial = accept_partial;
        self
    }

    pub fn with_accept_partial_optional(mut self, accept_partial_optional: bool) -> Self {
        self.accept_partial_optional = accept_partial_optional;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let toml = r#"
accept_partial = true

[naming]
max_cte_name_length = 30

[environment]
auto_derive_date_parts = false
"#;

        let settings = PlannerSettings::from_toml(toml).unwrap();

        assert!(settings.accept_partial);
        assert!(settings.accept_partial_optional);
        assert_eq!(settings.naming.max_cte_name_length, 30);
        assert!(!settings.environment.auto_derive_date_parts);
    }

    #[test]
    fn test_default_settings() {
        let settings = PlannerSettings::default();

        assert!(!settings.accept_partial);
        assert!(settings.accept_partial_optional);
        assert_eq!(settings.naming.max_cte_name_length, 63);
        assert!(settings.environment.auto_derive_date_parts);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let settings = PlannerSettings::from_toml("").unwrap();
        assert_eq!(settings.naming.max_cte_name_length, 63);
    }

    #[test]
    fn test_rejects_short_names() {
        let result = PlannerSettings::from_toml("[naming]\nmax_cte_name_length = 4\n");
        assert!(matches!(result, Err(SettingsError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = PlannerSettings::from_file("/nonexistent/grainline.toml");
        assert!(matches!(result, Err(SettingsError::FileNotFound(_))));
    }
}
