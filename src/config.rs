// src/config.rs
//! Process configuration, constructed once at startup and shared by reference.
//!
//! Non-secret settings come from `config.yaml` (one section per environment);
//! secrets come only from the process environment.

use crate::automation::WorkflowDefinition;
use crate::error::ConfigError;
use crate::secret::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const AUTH_SECRET_VAR: &str = "APPLYRIGHT_SHARED_AUTH_SECRET";
pub const CALLBACK_SECRET_VAR: &str = "AUTOMATION_CALLBACK_SECRET";
pub const BACKEND_TOKEN_VAR: &str = "AUTOMATION_BACKEND_TOKEN";
pub const CALLBACK_URL_VAR: &str = "AUTOMATION_CALLBACK_URL";

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database_path: PathBuf,
    pub resume_storage_path: PathBuf,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Status callback URL; `{appId}` is replaced by the application id.
    pub callback_url: String,
    /// Base URL of the résumé download endpoint, without trailing slash.
    pub document_base_url: String,
    pub automation: AutomationSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Runs are spawned inside this process against `webdriver_url`.
    Local,
    /// Runs are posted to another instance's worker endpoint.
    Remote,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutomationSettings {
    pub mode: DispatchMode,
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default)]
    pub backend_url: Option<String>,
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Optional YAML workflow definition replacing the built-in one.
    #[serde(default)]
    pub workflow_path: Option<PathBuf>,
    /// Expose `POST /api/v1/automation/runs` so remote orchestrators can dispatch here.
    #[serde(default)]
    pub worker_endpoint: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl AutomationSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    local: EnvironmentConfig,
    production: EnvironmentConfig,
}

#[derive(Debug, Clone)]
pub struct Secrets {
    pub auth_secret: Secret,
    pub callback_secret: Secret,
    pub backend_token: Option<Secret>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: EnvironmentConfig,
    pub secrets: Secrets,
    pub workflow: WorkflowDefinition,
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_webdriver_url() -> String {
    "http://127.0.0.1:4444".to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

impl AppConfig {
    /// Load configuration for the current environment from the process.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("AUTOAPPLY_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
        let environment = Self::get_environment();
        info!("Loading configuration for environment: {}", environment);

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        let mut config = Self::from_yaml(&content, &environment, |name| std::env::var(name).ok())?;
        config.resolve_paths()?;
        if let Some(workflow_path) = config.environment.automation.workflow_path.clone() {
            config.workflow = Self::load_workflow(&workflow_path)?;
        }
        Ok(config)
    }

    fn get_environment() -> String {
        std::env::var("AUTOAPPLY_ENV")
            .or_else(|_| std::env::var("ENVIRONMENT"))
            .unwrap_or_else(|_| "local".to_string())
    }

    /// Build a configuration from YAML text and an environment lookup.
    pub fn from_yaml(
        content: &str,
        environment: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_yaml::from_str(content)?;
        let mut env_config = match environment {
            "production" => file.production,
            _ => file.local,
        };

        if let Some(url) = lookup(CALLBACK_URL_VAR).filter(|v| !v.is_empty()) {
            env_config.callback_url = url;
        }

        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .map(Secret::new)
                .ok_or(ConfigError::MissingSecret(name))
        };

        let secrets = Secrets {
            auth_secret: required(AUTH_SECRET_VAR)?,
            callback_secret: required(CALLBACK_SECRET_VAR)?,
            backend_token: lookup(BACKEND_TOKEN_VAR)
                .filter(|v| !v.trim().is_empty())
                .map(Secret::new),
        };

        let automation = &env_config.automation;
        let needs_backend_token =
            automation.mode == DispatchMode::Remote || automation.worker_endpoint;
        if needs_backend_token && secrets.backend_token.is_none() {
            return Err(ConfigError::MissingSecret(BACKEND_TOKEN_VAR));
        }
        if automation.mode == DispatchMode::Remote && automation.backend_url.is_none() {
            return Err(ConfigError::Invalid(
                "automation.backend_url is required when automation.mode is remote".to_string(),
            ));
        }
        if !env_config.callback_url.contains("{appId}") {
            return Err(ConfigError::Invalid(
                "callback_url must contain the {appId} placeholder".to_string(),
            ));
        }

        Ok(Self {
            environment: env_config,
            secrets,
            workflow: WorkflowDefinition::linkedin(),
        })
    }

    fn load_workflow(path: &Path) -> Result<WorkflowDefinition, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let workflow: WorkflowDefinition = serde_yaml::from_str(&content)?;
        info!("Loaded workflow '{}' from {}", workflow.name, path.display());
        Ok(workflow)
    }

    fn resolve_paths(&mut self) -> Result<(), ConfigError> {
        let env = &mut self.environment;
        env.database_path = Self::resolve_path(&env.database_path)?;
        env.resume_storage_path = Self::resolve_path(&env.resume_storage_path)?;
        if let Some(log_file) = env.log_file.take() {
            env.log_file = Some(Self::resolve_path(&log_file)?);
        }
        Ok(())
    }

    fn resolve_path(path: &Path) -> Result<PathBuf, ConfigError> {
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        let current_dir = std::env::current_dir().map_err(|source| ConfigError::Read {
            path: ".".to_string(),
            source,
        })?;
        Ok(current_dir.join(path))
    }

    /// Ensure directories the server writes to exist.
    pub async fn ensure_directories(&self) -> anyhow::Result<()> {
        use anyhow::Context;

        tokio::fs::create_dir_all(&self.environment.resume_storage_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create directory: {}",
                    self.environment.resume_storage_path.display()
                )
            })?;

        if let Some(db_parent) = self.environment.database_path.parent() {
            tokio::fs::create_dir_all(db_parent).await.with_context(|| {
                format!("Failed to create database directory: {}", db_parent.display())
            })?;
        }

        info!("All configured directories ensured to exist");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const YAML: &str = r#"
local:
  port: 9000
  database_path: data/autoapply.db
  resume_storage_path: storage/resumes
  callback_url: http://127.0.0.1:9000/api/v1/applications/{appId}/status
  document_base_url: http://127.0.0.1:9000/api/apply-right/download
  automation:
    mode: local
production:
  database_path: /app/data/autoapply.db
  resume_storage_path: /app/storage/resumes
  callback_url: https://apply.example.com/api/v1/applications/{appId}/status
  document_base_url: https://apply.example.com/api/apply-right/download
  automation:
    mode: remote
    backend_url: https://worker.example.com
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn loads_local_section_with_defaults() {
        let config = AppConfig::from_yaml(
            YAML,
            "local",
            env(&[(AUTH_SECRET_VAR, "jwt"), (CALLBACK_SECRET_VAR, "cb")]),
        )
        .unwrap();

        assert_eq!(config.environment.port, 9000);
        assert_eq!(config.environment.address, "0.0.0.0");
        assert_eq!(config.environment.automation.mode, DispatchMode::Local);
        assert_eq!(config.environment.automation.webdriver_url, "http://127.0.0.1:4444");
        assert!(config.environment.automation.headless);
        assert_eq!(config.secrets.callback_secret.expose(), "cb");
        assert_eq!(config.workflow.name, "linkedin-easy-apply");
    }

    #[test]
    fn missing_callback_secret_is_a_startup_error() {
        let err = AppConfig::from_yaml(YAML, "local", env(&[(AUTH_SECRET_VAR, "jwt")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret(CALLBACK_SECRET_VAR)));
    }

    #[test]
    fn blank_secret_counts_as_missing() {
        let err = AppConfig::from_yaml(
            YAML,
            "local",
            env(&[(AUTH_SECRET_VAR, "  "), (CALLBACK_SECRET_VAR, "cb")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret(AUTH_SECRET_VAR)));
    }

    #[test]
    fn remote_dispatch_requires_backend_token() {
        let err = AppConfig::from_yaml(
            YAML,
            "production",
            env(&[(AUTH_SECRET_VAR, "jwt"), (CALLBACK_SECRET_VAR, "cb")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret(BACKEND_TOKEN_VAR)));

        let config = AppConfig::from_yaml(
            YAML,
            "production",
            env(&[
                (AUTH_SECRET_VAR, "jwt"),
                (CALLBACK_SECRET_VAR, "cb"),
                (BACKEND_TOKEN_VAR, "worker-token"),
            ]),
        )
        .unwrap();
        assert_eq!(config.environment.automation.mode, DispatchMode::Remote);
    }

    #[test]
    fn callback_url_can_be_overridden_from_environment() {
        let config = AppConfig::from_yaml(
            YAML,
            "local",
            env(&[
                (AUTH_SECRET_VAR, "jwt"),
                (CALLBACK_SECRET_VAR, "cb"),
                (CALLBACK_URL_VAR, "https://hooks.example.com/{appId}/status"),
            ]),
        )
        .unwrap();
        assert_eq!(
            config.environment.callback_url,
            "https://hooks.example.com/{appId}/status"
        );
    }
}
