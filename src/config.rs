//! Configuration types.
//!
//! Precedence, highest first: command-line flags, environment variables,
//! the TOML config file, built-in defaults.

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::ConfigError;

pub const ENV_API_KEY: &str = "STORY_EXTRACTOR_LLM_API_KEY";
pub const ENV_MODEL: &str = "STORY_EXTRACTOR_LLM_MODEL";
pub const ENV_BASE_URL: &str = "STORY_EXTRACTOR_LLM_BASE_URL";
pub const ENV_MAX_TOKENS: &str = "STORY_EXTRACTOR_LLM_MAX_TOKENS";

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Config file stem searched for by `extract`.
pub const EXTRACTOR_CONFIG_NAME: &str = "story-extractor";
/// Config file stem searched for by `serve`.
pub const SERVER_CONFIG_NAME: &str = "ui-server";

/// `story-extractor.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExtractorFileConfig {
    pub llm: LlmFileConfig,
    pub maildir: Option<PathBuf>,
    pub storydir: Option<PathBuf>,
    pub limit: Option<usize>,
    pub verbose: bool,
    pub log_headers: bool,
    pub log_bodies: bool,
    pub log_stories: bool,
    pub call_timeout_secs: Option<u64>,
    pub run_timeout_secs: Option<u64>,
}

/// The `[llm]` table of `story-extractor.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LlmFileConfig {
    pub api_key: Option<SecretString>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
}

/// `ui-server.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerFileConfig {
    pub storydir: Option<PathBuf>,
    pub savedir: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub verbose: bool,
}

/// Load a config file.
///
/// An explicit path must exist. Otherwise `{name}.toml` is looked up in the
/// working directory and then in `$HOME`; finding neither yields defaults.
pub fn load_file<T: DeserializeOwned + Default>(
    explicit: Option<&Path>,
    name: &str,
) -> Result<T, ConfigError> {
    match explicit {
        Some(path) => read_file(path),
        None => {
            let home = std::env::var_os("HOME").map(PathBuf::from);
            load_first(&search_paths(name, home.as_deref()))
        }
    }
}

/// Candidate locations for `{name}.toml`, in lookup order.
pub fn search_paths(name: &str, home: Option<&Path>) -> Vec<PathBuf> {
    let file = format!("{name}.toml");
    let mut paths = vec![PathBuf::from(&file)];
    if let Some(home) = home {
        paths.push(home.join(&file));
    }
    paths
}

fn load_first<T: DeserializeOwned + Default>(candidates: &[PathBuf]) -> Result<T, ConfigError> {
    match candidates.iter().find(|path| path.is_file()) {
        Some(path) => read_file(path),
        None => Ok(T::default()),
    }
}

fn read_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::ParseFile {
        path: path.to_path_buf(),
        source,
    })
}

/// First value set, from flag/env then file; an error naming `key` if neither.
pub fn required_path(
    cli: Option<PathBuf>,
    file: Option<PathBuf>,
    key: &str,
) -> Result<PathBuf, ConfigError> {
    cli.or(file)
        .filter(|path| !path.as_os_str().is_empty())
        .ok_or_else(|| ConfigError::MissingValue(key.to_string()))
}

/// Settings for the OpenAI-compatible extraction backend.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
    /// API root, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Upper bound on completion tokens per call. Newsletters with many
    /// stories need a generous budget.
    pub max_tokens: u32,
}

impl LlmConfig {
    /// Build config from `STORY_EXTRACTOR_LLM_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_and_file(&LlmFileConfig::default())
    }

    /// Environment variables over the `[llm]` table of the config file.
    pub fn from_env_and_file(file: &LlmFileConfig) -> Result<Self, ConfigError> {
        Self::resolve(|key| std::env::var(key).ok(), file)
    }

    /// Build config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Self::resolve(lookup, &LlmFileConfig::default())
    }

    /// Lookup values win over file values; defaults fill the rest.
    pub fn resolve(
        lookup: impl Fn(&str) -> Option<String>,
        file: &LlmFileConfig,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let api_key = match get(ENV_API_KEY) {
            Some(key) => SecretString::from(key),
            None => file
                .api_key
                .clone()
                .filter(|key| !key.expose_secret().trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(ENV_API_KEY.to_string()))?,
        };

        let model = get(ENV_MODEL)
            .or_else(|| non_empty(&file.model))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = get(ENV_BASE_URL)
            .or_else(|| non_empty(&file.base_url))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let max_tokens = match get(ENV_MAX_TOKENS) {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: ENV_MAX_TOKENS.to_string(),
                    message: format!("expected a positive integer, got {raw:?}"),
                })?,
            None => match file.max_tokens {
                Some(0) => {
                    return Err(ConfigError::InvalidValue {
                        key: "llm.max_tokens".to_string(),
                        message: "expected a positive integer, got 0".to_string(),
                    });
                }
                Some(n) => n,
                None => DEFAULT_MAX_TOKENS,
            },
        };

        Ok(Self {
            api_key,
            model,
            base_url,
            max_tokens,
        })
    }
}
