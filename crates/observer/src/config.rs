//! Observer, RPC and project configuration.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Fallback minimal block delay when neither the caller nor the chain provides one.
pub const DEFAULT_MIN_BLOCK_INTERVAL: Duration = Duration::from_secs(15);

/// Observer configuration.
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// Lower bound on block cadence. `None` defers to the chain client, then
    /// [DEFAULT_MIN_BLOCK_INTERVAL].
    pub min_block_interval: Option<Duration>,
    /// Wait after a transport failure before retrying.
    pub retry_backoff: Duration,
    /// Try the node's header stream before falling back to polling.
    pub streaming: bool,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            min_block_interval: None,
            retry_backoff: Duration::from_secs(5),
            streaming: true,
        }
    }
}

/// Node RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Base URL of the node RPC, e.g. `http://127.0.0.1:8732`.
    pub url: String,
    /// Chain alias used in RPC paths.
    pub chain: String,
    /// Timeout for unary requests (the header stream has none).
    pub request_timeout_secs: u64,
}

impl RpcConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            chain: "main".into(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing project configuration")]
    MissingProject,
    #[error("missing local environment configuration")]
    MissingEnvironment,
    #[error("invalid project configuration: {0}")]
    InvalidProject(#[source] serde_json::Error),
    #[error("invalid local environment configuration: {0}")]
    InvalidEnvironment(#[source] serde_json::Error),
    #[error("no accounts configured")]
    NoAccounts,
    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),
    #[error("unknown default account: {0}")]
    UnknownAccount(String),
    #[error("no RPC URL configured")]
    MissingRpcUrl,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub rpc_url: Option<String>,
}

/// Project-level configuration (shared, checked in).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub accounts: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub environment_default: String,
    #[serde(default)]
    pub environments: BTreeMap<String, Environment>,
}

/// Account entry of the local environment file. Key material is not read.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvAccount {
    pub public_key_hash: String,
}

/// Local environment configuration (per machine, not checked in).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvFile {
    #[serde(default)]
    pub accounts: BTreeMap<String, EnvAccount>,
    #[serde(default)]
    pub account_default: Option<String>,
    #[serde(default)]
    pub rpc_url: Option<String>,
}

/// Parsed project + local environment configuration.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub project: ProjectFile,
    pub env: EnvFile,
}

impl ProjectConfig {
    /// Parse both documents. Both are required and both must declare at least one account.
    pub fn parse(project_json: &str, env_json: &str) -> Result<Self, ConfigError> {
        if project_json.trim().is_empty() {
            return Err(ConfigError::MissingProject);
        }
        if env_json.trim().is_empty() {
            return Err(ConfigError::MissingEnvironment);
        }
        let project: ProjectFile =
            serde_json::from_str(project_json).map_err(ConfigError::InvalidProject)?;
        let env: EnvFile =
            serde_json::from_str(env_json).map_err(ConfigError::InvalidEnvironment)?;
        if project.accounts.is_empty() || env.accounts.is_empty() {
            return Err(ConfigError::NoAccounts);
        }
        Ok(Self { project, env })
    }

    /// Default account as `(name, public key hash)`: the configured default, else the first
    /// account by name.
    pub fn default_account(&self) -> Result<(&str, &str), ConfigError> {
        match self.env.account_default.as_deref().filter(|s| !s.is_empty()) {
            Some(name) => self
                .env
                .accounts
                .get_key_value(name)
                .map(|(k, v)| (k.as_str(), v.public_key_hash.as_str()))
                .ok_or_else(|| ConfigError::UnknownAccount(name.to_string())),
            None => self
                .env
                .accounts
                .iter()
                .next()
                .map(|(k, v)| (k.as_str(), v.public_key_hash.as_str()))
                .ok_or(ConfigError::NoAccounts),
        }
    }

    /// Node endpoint: the local file's URL, else the named (or default) environment's URL.
    pub fn rpc_config(&self, environment: Option<&str>) -> Result<RpcConfig, ConfigError> {
        if let Some(url) = self.env.rpc_url.as_deref().filter(|s| !s.is_empty()) {
            return Ok(RpcConfig::new(url));
        }
        let name = environment.unwrap_or(&self.project.environment_default);
        let env = self
            .project
            .environments
            .get(name)
            .ok_or_else(|| ConfigError::UnknownEnvironment(name.to_string()))?;
        env.rpc_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(RpcConfig::new)
            .ok_or(ConfigError::MissingRpcUrl)
    }
}
