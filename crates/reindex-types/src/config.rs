//! Configuration loading for the reindexer.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives in the platform config directory,
//! e.g. `~/.config/reindexer/config.toml`.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::TypesError;
use crate::job::DEFAULT_SCROLL_SIZE;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the search engine
    #[serde(default = "default_engine_url")]
    pub engine_url: String,

    /// Basic-auth user
    #[serde(default)]
    pub username: Option<String>,

    /// Basic-auth password (never written back out)
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// API key, takes precedence over basic auth
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Per-request transport timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long the engine keeps a scroll context alive between pages
    #[serde(default = "default_scroll_keep_alive")]
    pub scroll_keep_alive: String,

    /// Batch size for jobs that don't set one
    #[serde(default = "default_scroll_size")]
    pub default_scroll_size: usize,

    /// Name of the nested annotation field added by `add_facts_mapping`
    #[serde(default = "default_annotation_field")]
    pub annotation_field: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_engine_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_scroll_keep_alive() -> String {
    "10m".to_string()
}

fn default_scroll_size() -> usize {
    DEFAULT_SCROLL_SIZE
}

fn default_annotation_field() -> String {
    "texta_facts".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine_url: default_engine_url(),
            username: None,
            password: None,
            api_key: None,
            request_timeout_secs: default_request_timeout(),
            scroll_keep_alive: default_scroll_keep_alive(),
            default_scroll_size: default_scroll_size(),
            annotation_field: default_annotation_field(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/reindexer/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (REINDEX_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, TypesError> {
        let config_dir = ProjectDirs::from("", "", "reindexer")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("engine_url", default_engine_url())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("request_timeout_secs", default_request_timeout() as i64)
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("scroll_keep_alive", default_scroll_keep_alive())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("default_scroll_size", default_scroll_size() as i64)
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("annotation_field", default_annotation_field())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // REINDEX_ENGINE_URL, REINDEX_DEFAULT_SCROLL_SIZE, ...
        // Keys contain underscores, so no nesting separator is configured.
        builder = builder.add_source(Environment::with_prefix("REINDEX").try_parsing(true));

        let config = builder
            .build()
            .map_err(|e| TypesError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| TypesError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), TypesError> {
        if self.engine_url.trim().is_empty() {
            return Err(TypesError::Config("engine_url must not be empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(TypesError::Config(
                "request_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.default_scroll_size == 0 {
            return Err(TypesError::Config(
                "default_scroll_size must be > 0".to_string(),
            ));
        }
        if self.annotation_field.trim().is_empty() {
            return Err(TypesError::Config(
                "annotation_field must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Override the engine URL (CLI flag).
    pub fn with_engine_url(mut self, url: impl Into<String>) -> Self {
        self.engine_url = url.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.engine_url, "http://localhost:9200");
        assert_eq!(settings.request_timeout_secs, 30);
        assert_eq!(settings.scroll_keep_alive, "10m");
        assert_eq!(settings.default_scroll_size, 500);
        assert_eq!(settings.annotation_field, "texta_facts");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("reindexer.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "engine_url = \"http://search.internal:9200\"\ndefault_scroll_size = 250\nusername = \"elastic\""
        )
        .unwrap();

        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.engine_url, "http://search.internal:9200");
        assert_eq!(settings.default_scroll_size, 250);
        assert_eq!(settings.username.as_deref(), Some("elastic"));
        assert_eq!(settings.request_timeout_secs, 30);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = Settings::load(Some("/definitely/not/here/reindexer.toml"));
        assert!(matches!(result, Err(TypesError::Config(_))));
    }

    #[test]
    fn test_validation() {
        let mut settings = Settings::default();
        settings.default_scroll_size = 0;
        assert!(settings.validate().is_err());

        let settings = Settings::default().with_engine_url("");
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let settings = Settings {
            password: Some("hunter2".to_string()),
            api_key: Some("abc".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("abc"));
    }
}
