//! Service configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::Deserialize;

use crate::client::ProviderKind;

/// Longest history a cycle may look back over.
pub const MAX_DAYS_BACK: u32 = 3650;

/// Configuration loaded from environment variables.
///
/// Environment variables are prefixed with `CONTEST_`:
/// - `CONTEST_BASE_API_URL`: case-management API base URL (required)
/// - `CONTEST_API_TOKEN`: bearer token for the case-management API
/// - `CONTEST_LLM_PROVIDER`: `openai` or `deepseek` (required)
/// - `CONTEST_LLM_MODEL`: model name (default depends on the provider)
/// - `CONTEST_LLM_API_KEY`: provider API key (required)
/// - `CONTEST_LLM_BASE_URL`: override the provider endpoint
/// - `CONTEST_PAGE_SIZE`: orders per page when listing (default: 50)
/// - `CONTEST_DAYS_BACK`: days of history per cycle (default: 1)
/// - `CONTEST_CYCLE_INTERVAL_SECS`: pause between cycles (default: 900)
/// - `CONTEST_HTTP_TIMEOUT_SECS`: case API timeout (default: 30)
/// - `CONTEST_LLM_TIMEOUT_SECS`: provider timeout (default: 60)
/// - `CONTEST_LEDGER_PATH`: processed-orders file (default: data/processed_orders.json)
/// - `CONTEST_LOG_DIR`: contestation and cycle journal directory (default: logs)
#[derive(Debug, Clone, Deserialize)]
pub struct ContestConfig {
    /// Case-management API base URL
    pub base_api_url: String,

    /// Bearer token for the case-management API
    #[serde(default)]
    pub api_token: Option<String>,

    /// Generative-text provider name
    pub llm_provider: String,

    /// Model name; the provider default applies when unset
    #[serde(default)]
    pub llm_model: Option<String>,

    /// Provider API key
    pub llm_api_key: String,

    /// Provider endpoint override
    #[serde(default)]
    pub llm_base_url: Option<String>,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_days_back")]
    pub days_back: u32,

    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_secs: u64,

    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_page_size() -> u32 {
    50
}

fn default_days_back() -> u32 {
    1
}

fn default_cycle_interval() -> u64 {
    900
}

fn default_http_timeout() -> u64 {
    30
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/processed_orders.json")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl ContestConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("CONTEST_").from_env::<ContestConfig>()
    }

    /// Load configuration from explicit key/value pairs (prefixed names).
    pub fn from_vars<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed("CONTEST_").from_iter(vars)
    }

    /// Reject configurations that cannot start a run.
    ///
    /// The provider is resolved here so an unknown name fails at startup
    /// rather than at the first generation.
    pub fn validate(&self) -> Result<ProviderKind> {
        let provider: ProviderKind = self.llm_provider.parse()?;

        if self.base_api_url.trim().is_empty() {
            bail!("CONTEST_BASE_API_URL must not be empty");
        }
        if self.llm_api_key.trim().is_empty() {
            bail!("CONTEST_LLM_API_KEY must not be empty");
        }
        if self.page_size == 0 {
            bail!("CONTEST_PAGE_SIZE must be greater than zero");
        }
        if self.days_back > MAX_DAYS_BACK {
            bail!("CONTEST_DAYS_BACK must be at most {}", MAX_DAYS_BACK);
        }
        if self.cycle_interval_secs == 0 {
            bail!("CONTEST_CYCLE_INTERVAL_SECS must be greater than zero");
        }
        if self.http_timeout_secs == 0 || self.llm_timeout_secs == 0 {
            bail!("timeouts must be greater than zero");
        }

        Ok(provider)
    }

    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref().filter(|t| !t.trim().is_empty())
    }

    pub fn llm_model(&self, provider: ProviderKind) -> String {
        self.llm_model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| provider.default_model().to_string())
    }

    pub fn llm_base_url(&self, provider: ProviderKind) -> String {
        self.llm_base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| provider.default_base_url().to_string())
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}
