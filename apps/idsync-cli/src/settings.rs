//! Settings file and command-line overrides.

use std::path::Path;
use std::time::Duration;

use idsync_directory::{DirectoryConfig, DEFAULT_BASE_URL, MY_CUSTOMER};
use idsync_scim_client::{BearerToken, RetryPolicy};
use idsync_sync::{FailurePolicy, SyncConfig};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::{CliError, CliResult};
use crate::logging::LogFormat;

/// Source directory connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySettings {
    pub base_url: String,
    pub customer_id: String,
    pub access_token: BearerToken,
    pub page_size: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            customer_id: MY_CUSTOMER.to_string(),
            access_token: BearerToken::default(),
            page_size: 200,
            timeout_secs: 30,
            max_retries: 5,
            retry_delay_ms: 1_000,
        }
    }
}

/// SCIM target connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScimSettings {
    pub endpoint: String,
    pub access_token: BearerToken,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for ScimSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            access_token: BearerToken::default(),
            timeout_secs: 30,
            retry: RetryPolicy::default(),
        }
    }
}

/// Identity-store connection. The token falls back to the SCIM token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityStoreSettings {
    pub endpoint: String,
    pub identity_store_id: String,
    pub access_token: Option<BearerToken>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Everything one invocation needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub directory: DirectorySettings,
    pub scim: ScimSettings,
    pub identity_store: IdentityStoreSettings,
    pub sync: SyncConfig,
    pub log: LogSettings,
}

fn override_string(slot: &mut String, value: Option<&String>) {
    if let Some(value) = value {
        slot.clone_from(value);
    }
}

fn override_list(slot: &mut Vec<String>, values: &[String]) {
    let values: Vec<String> = values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if !values.is_empty() {
        *slot = values;
    }
}

fn require_url(name: &str, value: &str) -> CliResult<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CliError::Config(format!("{name} is required")));
    }
    if !(value.starts_with("https://") || value.starts_with("http://")) {
        return Err(CliError::Config(format!(
            "{name} must be an http(s) URL, got '{value}'"
        )));
    }
    Ok(())
}

impl Settings {
    /// Load settings from a YAML file.
    pub fn from_file(path: &Path) -> CliResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse settings from YAML. An empty document yields the defaults.
    pub fn from_yaml(raw: &str) -> CliResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Settings file (when given) with command-line overrides applied.
    pub fn load(cli: &Cli) -> CliResult<Self> {
        let mut settings = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_overrides(cli);
        Ok(settings)
    }

    /// Overlay explicitly set flags onto the file settings.
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(method) = cli.sync_method {
            self.sync.method = method;
        }
        if cli.dry_run {
            self.sync.dry_run = true;
        }
        if cli.continue_on_error {
            self.sync.failure_policy = FailurePolicy::Continue;
        }
        override_list(&mut self.sync.ignore_users, &cli.ignore_users);
        override_list(&mut self.sync.ignore_groups, &cli.ignore_groups);
        override_list(&mut self.sync.include_groups, &cli.include_groups);
        if cli.user_match.is_some() {
            self.sync.user_match.clone_from(&cli.user_match);
        }
        if cli.group_match.is_some() {
            self.sync.group_match.clone_from(&cli.group_match);
        }

        override_string(&mut self.log.level, cli.log_level.as_ref());
        if let Some(format) = cli.log_format {
            self.log.format = format;
        }

        override_string(&mut self.scim.endpoint, cli.scim_endpoint.as_ref());
        if let Some(token) = &cli.scim_access_token {
            self.scim.access_token = BearerToken::new(token.clone());
        }
        override_string(
            &mut self.identity_store.endpoint,
            cli.identity_store_endpoint.as_ref(),
        );
        override_string(
            &mut self.identity_store.identity_store_id,
            cli.identity_store_id.as_ref(),
        );
        if let Some(token) = &cli.identity_store_token {
            self.identity_store.access_token = Some(BearerToken::new(token.clone()));
        }
        override_string(&mut self.directory.base_url, cli.directory_base_url.as_ref());
        override_string(
            &mut self.directory.customer_id,
            cli.directory_customer_id.as_ref(),
        );
        if let Some(token) = &cli.directory_access_token {
            self.directory.access_token = BearerToken::new(token.clone());
        }
    }

    /// Reject incomplete or contradictory settings before any request.
    pub fn validate(&self) -> CliResult<()> {
        require_url("scim.endpoint", &self.scim.endpoint)?;
        if self.scim.access_token.is_empty() {
            return Err(CliError::Config("scim.access_token is required".into()));
        }
        require_url("identity_store.endpoint", &self.identity_store.endpoint)?;
        if self.identity_store.identity_store_id.trim().is_empty() {
            return Err(CliError::Config(
                "identity_store.identity_store_id is required".into(),
            ));
        }
        require_url("directory.base_url", &self.directory.base_url)?;
        if self.directory.access_token.is_empty() {
            return Err(CliError::Config(
                "directory.access_token is required".into(),
            ));
        }
        if self.directory.page_size == 0 {
            return Err(CliError::Config(
                "directory.page_size must be positive".into(),
            ));
        }
        self.sync
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))
    }

    /// Token for the identity store.
    #[must_use]
    pub fn identity_store_token(&self) -> BearerToken {
        self.identity_store
            .access_token
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.scim.access_token.clone())
    }

    #[must_use]
    pub fn scim_timeout(&self) -> Duration {
        Duration::from_secs(self.scim.timeout_secs)
    }

    /// Connection settings for the directory client.
    #[must_use]
    pub fn directory_config(&self) -> DirectoryConfig {
        let mut config = DirectoryConfig::new(self.directory.access_token.expose());
        config.base_url.clone_from(&self.directory.base_url);
        config.customer_id.clone_from(&self.directory.customer_id);
        config.page_size = self.directory.page_size;
        config.timeout = Duration::from_secs(self.directory.timeout_secs);
        config.max_retries = self.directory.max_retries;
        config.retry_delay = Duration::from_millis(self.directory.retry_delay_ms);
        config
    }
}
