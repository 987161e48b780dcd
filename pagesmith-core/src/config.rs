//! Configuration management for the Pagesmith system

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{PagesmithError, Result};

/// Prefix shared by every environment variable Pagesmith reads
pub const ENV_PREFIX: &str = "PAGESMITH_";

/// Main system configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub global_settings: HashMap<String, serde_json::Value>,
}

impl Config {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with the process environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new();
        config.apply_environment_overrides(&Self::environment())?;
        Ok(config)
    }

    /// The `PAGESMITH_*` variables of the process environment
    pub fn environment() -> HashMap<String, String> {
        std::env::vars()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect()
    }

    /// Load configuration from a file
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PagesmithError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| PagesmithError::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file. The API credential is never written.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PagesmithError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| PagesmithError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(PagesmithError::Config("Invalid port number".to_string()));
        }

        if self.generation.timeout_secs == 0 {
            return Err(PagesmithError::Config(
                "Generation timeout must be at least one second".to_string(),
            ));
        }

        if self.generation.model.trim().is_empty() {
            return Err(PagesmithError::Config("Model name cannot be empty".to_string()));
        }

        self.preview.validate()?;

        Ok(())
    }

    /// Comprehensive configuration validation with detailed results
    pub fn validate_comprehensive(&self) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        if self.server.port == 0 {
            result.errors.push(ValidationError {
                field_path: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
                suggested_fix: Some("Use a port between 1 and 65535".to_string()),
            });
        }

        if self.server.hostname.trim().is_empty() {
            result.errors.push(ValidationError {
                field_path: "server.hostname".to_string(),
                message: "Hostname cannot be empty".to_string(),
                suggested_fix: Some("Use 127.0.0.1 for localhost only".to_string()),
            });
        }

        if self.generation.timeout_secs == 0 {
            result.errors.push(ValidationError {
                field_path: "generation.timeout_secs".to_string(),
                message: "Timeout must be at least one second".to_string(),
                suggested_fix: Some("The reference ceiling is 30 seconds".to_string()),
            });
        } else if self.generation.timeout_secs > 300 {
            result.warnings.push(ValidationWarning {
                field_path: "generation.timeout_secs".to_string(),
                message: format!(
                    "Timeout of {}s keeps the conversation pending for a long time",
                    self.generation.timeout_secs
                ),
                suggestion: Some("Consider a value close to 30 seconds".to_string()),
            });
        }

        if self.generation.model.trim().is_empty() {
            result.errors.push(ValidationError {
                field_path: "generation.model".to_string(),
                message: "Model name cannot be empty".to_string(),
                suggested_fix: None,
            });
        }

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            result.errors.push(ValidationError {
                field_path: "generation.temperature".to_string(),
                message: format!(
                    "Temperature {} is outside 0.0..=2.0",
                    self.generation.temperature
                ),
                suggested_fix: None,
            });
        }

        if let Err(e) = self.preview.validate() {
            result.errors.push(ValidationError {
                field_path: "preview".to_string(),
                message: e.to_string(),
                suggested_fix: None,
            });
        }

        if self.credential_status() == CredentialStatus::Missing {
            result.warnings.push(ValidationWarning {
                field_path: "generation.api_key".to_string(),
                message: "No API credential configured; generation is disabled".to_string(),
                suggestion: Some(format!("Set {}API_KEY", ENV_PREFIX)),
            });
        }

        result.is_valid = result.errors.is_empty();

        if !result.is_valid {
            return Err(PagesmithError::Config(format!(
                "Configuration validation failed with {} errors",
                result.errors.len()
            )));
        }

        Ok(result)
    }

    /// Apply environment variable overrides
    pub fn apply_environment_overrides(
        &mut self,
        env_overrides: &HashMap<String, String>,
    ) -> Result<()> {
        for (key, value) in env_overrides {
            match key.as_str() {
                "PAGESMITH_API_KEY" => {
                    let trimmed = value.trim();
                    self.generation.api_key = if trimmed.is_empty() {
                        None
                    } else {
                        Some(trimmed.to_string())
                    };
                }
                "PAGESMITH_MODEL" => self.generation.model = value.clone(),
                "PAGESMITH_ENDPOINT" => self.generation.endpoint = value.clone(),
                "PAGESMITH_TIMEOUT_SECS" => {
                    self.generation.timeout_secs = value.parse().map_err(|_| {
                        PagesmithError::Config(format!(
                            "Invalid timeout in environment variable: {}",
                            value
                        ))
                    })?;
                }
                "PAGESMITH_SERVER_HOSTNAME" => self.server.hostname = value.clone(),
                "PAGESMITH_SERVER_PORT" => {
                    self.server.port = value.parse().map_err(|_| {
                        PagesmithError::Config(format!(
                            "Invalid port in environment variable: {}",
                            value
                        ))
                    })?;
                }
                key if key.starts_with("PAGESMITH_GLOBAL_") => {
                    let setting_key = key["PAGESMITH_GLOBAL_".len()..].to_lowercase();
                    let json_value = if let Ok(flag) = value.parse::<bool>() {
                        serde_json::Value::Bool(flag)
                    } else if let Some(num) = value
                        .parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                    {
                        serde_json::Value::Number(num)
                    } else {
                        serde_json::Value::String(value.clone())
                    };
                    self.global_settings.insert(setting_key, json_value);
                }
                _ => {
                    // Ignore unknown environment variables
                }
            }
        }
        Ok(())
    }

    /// Whether a generation credential is available
    pub fn credential_status(&self) -> CredentialStatus {
        match self.generation.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => CredentialStatus::Configured,
            _ => CredentialStatus::Missing,
        }
    }

    /// Get a global setting
    pub fn get_global_setting<T>(&self, key: &str) -> Option<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        self.global_settings
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Set a global setting
    pub fn set_global_setting<T>(&mut self, key: String, value: T) -> Result<()>
    where
        T: Serialize,
    {
        let json_value = serde_json::to_value(value)
            .map_err(|e| PagesmithError::Config(format!("Failed to serialize setting: {}", e)))?;
        self.global_settings.insert(key, json_value);
        Ok(())
    }
}

/// Outcome of the startup credential check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialStatus {
    Configured,
    Missing,
}

/// Remote generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Read from the environment only
    #[serde(skip)]
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 30,
            temperature: 0.7,
            max_output_tokens: 8192,
        }
    }
}

/// Rendering surface and editing panel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub tablet_width: u32,
    pub tablet_height: u32,
    pub mobile_width: u32,
    pub mobile_height: u32,
    pub side_panel_width: u32,
    pub text_preview_chars: usize,
    pub html_preview_chars: usize,
    pub typewriter_chunk_chars: usize,
}

impl PreviewConfig {
    fn validate(&self) -> Result<()> {
        if self.tablet_width == 0 || self.tablet_height == 0 {
            return Err(PagesmithError::Config("Tablet viewport cannot be empty".to_string()));
        }
        if self.mobile_width == 0 || self.mobile_height == 0 {
            return Err(PagesmithError::Config("Mobile viewport cannot be empty".to_string()));
        }
        if self.mobile_width >= self.tablet_width {
            return Err(PagesmithError::Config(
                "Mobile viewport must be narrower than tablet viewport".to_string(),
            ));
        }
        if self.typewriter_chunk_chars == 0 {
            return Err(PagesmithError::Config(
                "Typewriter chunk size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            tablet_width: 768,
            tablet_height: 1024,
            mobile_width: 375,
            mobile_height: 667,
            side_panel_width: 320,
            text_preview_chars: 100,
            html_preview_chars: 200,
            typewriter_chunk_chars: 24,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub hostname: String,
    pub port: u16,
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port: 3000,
            cors_enabled: true,
        }
    }
}

/// Configuration validation result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub field_path: String,
    pub message: String,
    pub suggested_fix: Option<String>,
}

/// Configuration validation warning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub field_path: String,
    pub message: String,
    pub suggestion: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_creation_and_validation() {
        let config = Config::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.hostname, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.generation.timeout_secs, 30);
        assert_eq!(config.preview.tablet_width, 768);
        assert_eq!(config.preview.mobile_width, 375);
    }

    #[test]
    fn test_missing_credential_is_a_warning_not_an_error() {
        let config = Config::new();
        assert_eq!(config.credential_status(), CredentialStatus::Missing);

        let result = config.validate_comprehensive().unwrap();
        assert!(result.is_valid);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.field_path == "generation.api_key"));
    }

    #[test]
    fn test_environment_overrides() {
        let mut config = Config::new();
        let mut env = HashMap::new();
        env.insert("PAGESMITH_API_KEY".to_string(), "secret".to_string());
        env.insert("PAGESMITH_SERVER_PORT".to_string(), "8080".to_string());
        env.insert("PAGESMITH_TIMEOUT_SECS".to_string(), "12".to_string());
        env.insert("PAGESMITH_GLOBAL_DEV_MODE".to_string(), "true".to_string());
        env.insert("UNRELATED".to_string(), "ignored".to_string());

        config.apply_environment_overrides(&env).unwrap();

        assert_eq!(config.credential_status(), CredentialStatus::Configured);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.generation.timeout(), Duration::from_secs(12));
        assert_eq!(config.get_global_setting::<bool>("dev_mode"), Some(true));
    }

    #[test]
    fn test_blank_credential_counts_as_missing() {
        let mut config = Config::new();
        let mut env = HashMap::new();
        env.insert("PAGESMITH_API_KEY".to_string(), "   ".to_string());
        config.apply_environment_overrides(&env).unwrap();
        assert_eq!(config.credential_status(), CredentialStatus::Missing);
    }

    #[test]
    fn test_invalid_port_override_is_rejected() {
        let mut config = Config::new();
        let mut env = HashMap::new();
        env.insert("PAGESMITH_SERVER_PORT".to_string(), "not-a-port".to_string());
        assert!(config.apply_environment_overrides(&env).is_err());
    }

    #[test]
    fn test_config_file_operations_never_persist_credential() {
        let mut config = Config::new();
        config.generation.api_key = Some("secret".to_string());
        config.server.port = 4100;

        let temp_file = NamedTempFile::new().unwrap();
        config.save_to_file(temp_file.path()).unwrap();

        let raw = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(!raw.contains("secret"));

        let loaded = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(loaded.server.port, 4100);
        assert_eq!(loaded.generation.api_key, None);
    }

    #[test]
    fn test_comprehensive_validation_reports_errors() {
        let mut config = Config::new();
        config.generation.timeout_secs = 0;
        config.server.hostname = String::new();
        assert!(config.validate_comprehensive().is_err());
    }
}
