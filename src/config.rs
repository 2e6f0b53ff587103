use std::time::Duration;

use crate::{
    config_db::ConfigDb,
    error::{Error, Result},
};

pub const DEFAULT_EMBEDDING_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_TIMEOUT: Duration = Duration::from_secs(30);

pub const EMBEDDING_URL_ENV_VAR: &str = "DONGYO_EMBEDDING_URL";
pub const EMBEDDING_MODEL_ENV_VAR: &str = "DONGYO_EMBEDDING_MODEL";
pub const EMBEDDING_TIMEOUT_ENV_VAR: &str = "DONGYO_EMBEDDING_TIMEOUT_SECS";
pub const API_KEY_ENV_VARS: &[&str] = &["DONGYO_API_KEY", "OPENAI_API_KEY"];

/// Keys in the `settings` table of `config.redb`.
pub mod settings {
    pub const EMBEDDING_URL: &str = "embedding_url";
    pub const EMBEDDING_MODEL: &str = "embedding_model";
}

/// Where and how query embeddings are obtained.
#[derive(Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EMBEDDING_URL.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            api_key: None,
            timeout: DEFAULT_EMBEDDING_TIMEOUT,
        }
    }
}

/// Values given on the command line, which win over everything else.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingOverrides {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout: Option<Duration>,
}

impl EmbeddingConfig {
    /// Resolve each setting from, in order of priority:
    /// 1. An explicit override (from the command line)
    /// 2. The environment
    /// 3. The persisted setting in config.redb
    /// 4. The built-in default
    pub fn resolve(
        overrides: &EmbeddingOverrides,
        config_db: Option<&ConfigDb>,
    ) -> Result<Self> {
        let stored = |key: &str| -> Result<Option<String>> {
            match config_db {
                Some(db) => db.get_setting(key),
                None => Ok(None),
            }
        };

        let base_url = match overrides
            .base_url
            .clone()
            .or_else(|| env(EMBEDDING_URL_ENV_VAR))
        {
            Some(url) => url,
            None => stored(settings::EMBEDDING_URL)?
                .unwrap_or_else(|| DEFAULT_EMBEDDING_URL.to_string()),
        };

        let model = match overrides
            .model
            .clone()
            .or_else(|| env(EMBEDDING_MODEL_ENV_VAR))
        {
            Some(model) => model,
            None => stored(settings::EMBEDDING_MODEL)?
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
        };

        let timeout = match overrides.timeout {
            Some(timeout) => timeout,
            None => match env(EMBEDDING_TIMEOUT_ENV_VAR) {
                Some(secs) => parse_timeout(&secs)?,
                None => DEFAULT_EMBEDDING_TIMEOUT,
            },
        };

        let api_key = API_KEY_ENV_VARS.iter().find_map(|var| env(var));

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            timeout,
        })
    }
}

fn env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a timeout given in (possibly fractional) seconds.
pub fn parse_timeout(secs: &str) -> Result<Duration> {
    secs.trim()
        .parse::<f64>()
        .ok()
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .filter(|d| !d.is_zero())
        .ok_or_else(|| {
            Error::Config(format!("invalid embedding timeout: {secs:?}"))
        })
}
