use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use dbdeploy_core::SchemaDefinition;
use dbdeploy_engine::{DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF, DeployOptions, FailurePolicy, RetryPolicy};

pub const DEFAULT_SETTINGS_FILE: &str = "dbdeploy.toml";
pub const DEFAULT_ADMIN_SCHEMA: &str = "DBDEPLOY_ADMIN";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Contents of `dbdeploy.toml`. Every key is optional; command-line flags
/// win over file values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub connection: Option<String>,
    pub admin_schema: Option<String>,
    pub data_schema: Option<String>,
    pub pool_size: Option<usize>,
    pub failure_policy: Option<FailurePolicy>,
    pub max_attempts: Option<u32>,
    pub max_backoff_ms: Option<u64>,
    pub log_file: Option<PathBuf>,
}

/// Command-line values that override [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub connection: Option<String>,
    pub admin_schema: Option<String>,
    pub data_schema: Option<String>,
    pub pool_size: Option<usize>,
    pub failure_policy: Option<FailurePolicy>,
}

impl Settings {
    /// Read `path`; a missing file is only an error when it was asked for
    /// explicitly.
    pub fn load(path: &Path, explicit: bool) -> Result<Self, SettingsError> {
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| SettingsError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn connection(&self, overrides: &Overrides) -> Option<String> {
        overrides.connection.clone().or_else(|| self.connection.clone())
    }

    /// Data schema falls back to the schema named by the definition.
    pub fn deploy_options(&self, overrides: &Overrides, definition_schema: &str) -> DeployOptions {
        let admin_schema = overrides
            .admin_schema
            .clone()
            .or_else(|| self.admin_schema.clone())
            .unwrap_or_else(|| DEFAULT_ADMIN_SCHEMA.to_string());
        let data_schema = overrides
            .data_schema
            .clone()
            .or_else(|| self.data_schema.clone())
            .unwrap_or_else(|| definition_schema.to_string());

        let mut options = DeployOptions::new(admin_schema, data_schema);
        if let Some(pool_size) = overrides.pool_size.or(self.pool_size) {
            options.pool_size = pool_size;
        }
        if let Some(policy) = overrides.failure_policy.or(self.failure_policy) {
            options.failure_policy = policy;
        }
        options.retry = RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            max_backoff: self
                .max_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_MAX_BACKOFF),
        };
        options
    }
}

/// Load a schema definition; `.toml` files are TOML, anything else JSON.
pub fn load_definition(path: &Path) -> Result<SchemaDefinition, SettingsError> {
    let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_toml = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&content).map_err(|source| SettingsError::Toml {
            path: path.to_path_buf(),
            source,
        })
    } else {
        serde_json::from_str(&content).map_err(|source| SettingsError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let settings: Settings = toml::from_str(
            r#"
            connection = "postgres://fhir@localhost/fhirdb"
            admin_schema = "FHIR_ADMIN"
            pool_size = 8
            failure_policy = "continue_independent"
            max_attempts = 3
            max_backoff_ms = 250
            "#,
        )
        .unwrap();

        let overrides = Overrides {
            pool_size: Some(2),
            data_schema: Some("FHIRDATA2".to_string()),
            ..Overrides::default()
        };
        let options = settings.deploy_options(&overrides, "FHIRDATA");

        assert_eq!(options.admin_schema, "FHIR_ADMIN");
        assert_eq!(options.data_schema, "FHIRDATA2");
        assert_eq!(options.pool_size, 2);
        assert_eq!(options.failure_policy, FailurePolicy::ContinueIndependent);
        assert_eq!(options.retry.max_attempts, 3);
        assert_eq!(options.retry.max_backoff, Duration::from_millis(250));
        assert_eq!(
            settings.connection(&overrides).as_deref(),
            Some("postgres://fhir@localhost/fhirdb")
        );
    }

    #[test]
    fn defaults_without_a_settings_file() {
        let settings = Settings::load(Path::new("does-not-exist.toml"), false).unwrap();
        let options = settings.deploy_options(&Overrides::default(), "FHIRDATA");
        assert_eq!(options.admin_schema, DEFAULT_ADMIN_SCHEMA);
        assert_eq!(options.data_schema, "FHIRDATA");
        assert_eq!(options.retry, RetryPolicy::default());
        assert!(Settings::load(Path::new("does-not-exist.toml"), true).is_err());
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(toml::from_str::<Settings>("pool = 3").is_err());
    }
}
