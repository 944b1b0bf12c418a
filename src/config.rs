use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::gateway::anthropic::AnthropicBackend;
use crate::gateway::openai::{OpenAiBackend, DEFAULT_BASE_URL};
use crate::gateway::{HttpBackend, RetryPolicy};

pub const RUBRIC_FILE_NAME: &str = "rubrics.json";

const DEFAULT_OPENAI_MODEL: &str = "deepseek-chat";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Environment variables checked for an API key, in order.
const API_KEY_VARS: &[&str] = &[
    "GRADER_API_KEY",
    "DEEPSEEK_API_KEY",
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
];

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Any OpenAI-compatible chat completions endpoint.
    OpenAi,
    Anthropic,
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "deepseek" => Ok(Provider::OpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// Runtime settings for the grading pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct GraderConfig {
    pub provider: Provider,
    pub api_key: Option<String>,
    /// For [`Provider::OpenAi`] the API base; for [`Provider::Anthropic`]
    /// an optional override of the messages endpoint.
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub retry: RetryPolicy,
    pub rubric_path: Option<PathBuf>,
}

impl GraderConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider = match get("GRADER_PROVIDER") {
            Some(value) => value.parse::<Provider>().map_err(|reason| ConfigError::InvalidValue {
                key: "GRADER_PROVIDER",
                value,
                reason,
            })?,
            None => Provider::OpenAi,
        };

        let api_key = API_KEY_VARS.iter().find_map(|key| get(*key));

        let model = get("GRADER_MODEL").unwrap_or_else(|| {
            match provider {
                Provider::OpenAi => DEFAULT_OPENAI_MODEL,
                Provider::Anthropic => DEFAULT_ANTHROPIC_MODEL,
            }
            .to_string()
        });

        let temperature: f32 = parse_or("GRADER_TEMPERATURE", get("GRADER_TEMPERATURE"), DEFAULT_TEMPERATURE)?;
        if !temperature.is_finite() {
            return Err(ConfigError::InvalidValue {
                key: "GRADER_TEMPERATURE",
                value: temperature.to_string(),
                reason: "must be a finite number".to_string(),
            });
        }
        let temperature = temperature.clamp(0.0, 1.0);

        let defaults = RetryPolicy::default();
        let max_attempts = parse_or("GRADER_MAX_ATTEMPTS", get("GRADER_MAX_ATTEMPTS"), defaults.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "GRADER_MAX_ATTEMPTS",
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }
        let backoff_secs = parse_or(
            "GRADER_RETRY_DELAY_SECS",
            get("GRADER_RETRY_DELAY_SECS"),
            defaults.backoff.as_secs_f64(),
        )?;
        let backoff = Duration::try_from_secs_f64(backoff_secs).map_err(|e| ConfigError::InvalidValue {
            key: "GRADER_RETRY_DELAY_SECS",
            value: backoff_secs.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            provider,
            api_key,
            base_url: get("GRADER_BASE_URL"),
            model,
            temperature,
            retry: RetryPolicy { max_attempts, backoff },
            rubric_path: get("GRADER_RUBRIC_PATH").map(PathBuf::from),
        })
    }

    /// Build the HTTP backend for the configured provider.
    pub fn backend(&self) -> HttpBackend {
        match self.provider {
            Provider::OpenAi => HttpBackend::OpenAi(OpenAiBackend::new(
                self.api_key.clone(),
                self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
                self.model.clone(),
            )),
            Provider::Anthropic => {
                let backend = AnthropicBackend::new(self.api_key.clone(), self.model.clone());
                HttpBackend::Anthropic(match &self.base_url {
                    Some(url) => backend.with_url(url.clone()),
                    None => backend,
                })
            }
        }
    }

    /// Where to load the rubric library from: `explicit`, then the
    /// configured path, then `./rubrics.json` if present, then the user
    /// config directory.
    pub fn resolve_rubric_path(&self, explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit.or(self.rubric_path.as_deref()) {
            return path.to_path_buf();
        }
        let local = PathBuf::from(RUBRIC_FILE_NAME);
        if local.exists() {
            return local;
        }
        dirs::config_dir()
            .map(|dir| dir.join("essay-grader").join(RUBRIC_FILE_NAME))
            .unwrap_or(local)
    }
}

fn parse_or<T>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(value) => value.parse::<T>().map_err(|e| ConfigError::InvalidValue {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}
