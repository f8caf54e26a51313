#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use anyhow::{Context, Result};
use postgrest::Postgrest;
use state::InitCell;

use crate::{
    exam::{DEFAULT_SET, QuestionSet},
    grade::{GradingOptions, GradingStrategy},
};

/// Table that stores one row per graded submission.
pub const SUBMISSIONS_TABLE: &str = "student_submissions";

/// Default OpenAI-compatible endpoint.
const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";

/// Default address the HTTP controller listens on.
const DEFAULT_BIND: &str = "127.0.0.1:8501";

/// A required secret is absent. Fatal for whatever needed it.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The named environment variables must be set.
    #[error("{names} must be set to {purpose}.")]
    MissingSecret {
        /// Environment variable names, human readable.
        names:   &'static str,
        /// What the secret is needed for.
        purpose: &'static str,
    },
}

/// Supabase credentials loaded from the environment, if available.
#[derive(Clone)]
struct SupabaseEnv {
    /// Fully qualified PostgREST endpoint.
    rest_endpoint: String,
    /// Service role key used for PostgREST requests.
    api_key:       String,
}

impl SupabaseEnv {
    /// Builds a Supabase credential bundle from environment-provided values.
    fn new(url: String, key: String) -> Self {
        let rest_endpoint = format!("{}/rest/v1", url.trim().trim_end_matches('/'));
        Self {
            rest_endpoint,
            api_key: key.trim().to_owned(),
        }
    }

    /// Reads `SUPABASE_URL` and `SUPABASE_SERVICE_ROLE_KEY`.
    fn from_env() -> Option<Self> {
        match (std::env::var("SUPABASE_URL").ok(), std::env::var("SUPABASE_SERVICE_ROLE_KEY").ok())
        {
            (Some(url), Some(key)) if !url.trim().is_empty() && !key.trim().is_empty() => {
                Some(Self::new(url, key))
            }
            _ => None,
        }
    }
}

/// OpenAI credentials and optional tuning parameters sourced from the
/// environment.
#[derive(Clone)]
pub struct OpenAiEnv {
    /// Base URL for the OpenAI-compatible API endpoint.
    api_base:    String,
    /// API key used to authenticate OpenAI requests.
    api_key:     String,
    /// Optional temperature override, if provided.
    temperature: Option<f32>,
    /// Optional top-p override, if provided.
    top_p:       Option<f32>,
}

impl OpenAiEnv {
    /// Construct an `OpenAiEnv` from environment variables; returns `None` if
    /// the API key is missing.
    fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok()?.trim().to_owned();
        if api_key.is_empty() {
            return None;
        }

        let api_base = std::env::var("OPENAI_ENDPOINT")
            .ok()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_OPENAI_ENDPOINT.to_string());

        let temperature = std::env::var("OPENAI_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse::<f32>().ok());
        let top_p = std::env::var("OPENAI_TOP_P")
            .ok()
            .and_then(|s| s.parse::<f32>().ok());

        Some(Self {
            api_base,
            api_key,
            temperature,
            top_p,
        })
    }

    /// Returns the API base URL used for OpenAI requests.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Returns the API key used for OpenAI requests.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Returns the configured temperature, if any.
    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// Returns the configured top_p, if any.
    pub fn top_p(&self) -> Option<f32> {
        self.top_p
    }
}

/// Runtime configuration shared across the crate.
pub struct ConfigState {
    /// Supabase credentials, if configured.
    supabase:              Option<SupabaseEnv>,
    /// Lazily constructed Supabase PostgREST client.
    postgrest:             InitCell<Postgrest>,
    /// Cached OpenAI configuration, if available.
    openai:                Option<OpenAiEnv>,
    /// Active question set.
    questions:             QuestionSet,
    /// Model identifier override from `OPENAI_MODEL`.
    model_override:        Option<String>,
    /// Whether a graded session may be graded again.
    allow_regrade:         bool,
    /// How the three completion calls are scheduled.
    strategy:              GradingStrategy,
    /// Per-call completion timeout.
    completion_timeout:    Duration,
    /// Override for the question set's completion bound.
    max_completion_tokens: Option<u32>,
    /// Address for the HTTP controller.
    bind:                  String,
}

impl ConfigState {
    /// Construct a new configuration instance from the environment.
    /// `questions` overrides `OXGRADE_QUESTION_SET` when given.
    fn new(questions: Option<&str>) -> Result<Self> {
        let set_name = questions
            .map(str::to_owned)
            .or_else(|| std::env::var("OXGRADE_QUESTION_SET").ok())
            .unwrap_or_else(|| DEFAULT_SET.to_string());
        let questions = QuestionSet::load(set_name.trim())?;

        let model_override = std::env::var("OPENAI_MODEL")
            .ok()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty());

        let strategy = match std::env::var("OXGRADE_GRADING") {
            Ok(value) => value.parse::<GradingStrategy>()?,
            Err(_) => GradingStrategy::Sequential,
        };

        let max_completion_tokens = std::env::var("OXGRADE_MAX_COMPLETION_TOKENS")
            .ok()
            .map(|value| {
                value
                    .trim()
                    .parse::<u32>()
                    .with_context(|| format!("Invalid OXGRADE_MAX_COMPLETION_TOKENS: {value}"))
            })
            .transpose()?;

        Ok(Self {
            supabase: SupabaseEnv::from_env(),
            postgrest: InitCell::new(),
            openai: OpenAiEnv::from_env(),
            questions,
            model_override,
            allow_regrade: read_flag("OXGRADE_ALLOW_REGRADE"),
            strategy,
            completion_timeout: read_timeout_secs("OXGRADE_COMPLETION_TIMEOUT_SECS", 60)?,
            max_completion_tokens,
            bind: std::env::var("OXGRADE_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string()),
        })
    }

    /// Returns the configured PostgREST client if credentials are available.
    pub fn postgrest(&self) -> Option<Postgrest> {
        if let Some(client) = self.postgrest.try_get() {
            return Some(client.clone());
        }

        let creds = self.supabase.as_ref()?;
        self.postgrest.set(supabase_client(&creds.rest_endpoint, &creds.api_key));
        Some(self.postgrest.get().clone())
    }

    /// Returns the PostgREST client or the fatal configuration error.
    pub fn require_postgrest(&self) -> Result<Postgrest, ConfigError> {
        self.postgrest().ok_or(ConfigError::MissingSecret {
            names:   "SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY",
            purpose: "read or store submissions",
        })
    }

    /// Returns the OpenAI configuration, if the API key is present.
    pub fn openai(&self) -> Option<&OpenAiEnv> {
        self.openai.as_ref()
    }

    /// Returns the OpenAI configuration or the fatal configuration error.
    pub fn require_openai(&self) -> Result<&OpenAiEnv, ConfigError> {
        self.openai().ok_or(ConfigError::MissingSecret {
            names:   "OPENAI_API_KEY",
            purpose: "generate feedback",
        })
    }

    /// Returns the active question set.
    pub fn questions(&self) -> &QuestionSet {
        &self.questions
    }

    /// Returns the model identifier: `OPENAI_MODEL`, else the set default.
    pub fn model(&self) -> &str {
        self.model_override
            .as_deref()
            .unwrap_or(&self.questions.model)
    }

    /// Returns whether graded sessions may be graded again.
    pub fn allow_regrade(&self) -> bool {
        self.allow_regrade
    }

    /// Returns the address for the HTTP controller.
    pub fn bind(&self) -> &str {
        &self.bind
    }

    /// Assembles grading options from the environment and question set.
    pub fn grading_options(&self) -> GradingOptions {
        let openai = self.openai.as_ref();
        GradingOptions::builder()
            .model(self.model())
            .strategy(self.strategy)
            .timeout(self.completion_timeout)
            .max_completion_tokens(
                self.max_completion_tokens
                    .or(self.questions.max_completion_tokens),
            )
            .temperature(openai.and_then(OpenAiEnv::temperature))
            .top_p(openai.and_then(OpenAiEnv::top_p))
            .build()
    }
}

/// Shared configuration handle used throughout the crate.
#[derive(Clone)]
pub struct ConfigHandle(Arc<ConfigState>);

impl std::ops::Deref for ConfigHandle {
    type Target = ConfigState;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Global storage for the lazily constructed configuration state.
static CONFIG_SLOT: OnceLock<Mutex<Option<Arc<ConfigState>>>> = OnceLock::new();

/// Returns the mutex guarding the global configuration slot.
fn slot() -> &'static Mutex<Option<Arc<ConfigState>>> {
    CONFIG_SLOT.get_or_init(|| Mutex::new(None))
}

/// Ensure the global configuration has been initialized and return a handle.
/// `questions` only takes effect on the first call.
pub fn ensure_initialized(questions: Option<&str>) -> Result<ConfigHandle> {
    let slot = slot();
    let mut guard = slot
        .lock()
        .map_err(|_| anyhow::anyhow!("config slot poisoned"))?;
    if let Some(cfg) = guard.as_ref() {
        return Ok(ConfigHandle(Arc::clone(cfg)));
    }

    let cfg = Arc::new(ConfigState::new(questions)?);
    *guard = Some(Arc::clone(&cfg));
    Ok(ConfigHandle(cfg))
}

/// Reads a per-call timeout in whole seconds from `env`, using
/// `default_secs` when the variable is unset. Invalid or zero values are
/// rejected.
fn read_timeout_secs(env: &str, default_secs: u64) -> Result<Duration> {
    match std::env::var(env) {
        Ok(value) => parse_timeout_secs(&value).with_context(|| format!("Invalid {env}: {value}")),
        Err(_) => Ok(Duration::from_secs(default_secs)),
    }
}

/// Parses a positive number of seconds.
fn parse_timeout_secs(value: &str) -> Result<Duration> {
    let secs = value
        .trim()
        .parse::<u64>()
        .context("expected a whole number of seconds")?;
    anyhow::ensure!(secs > 0, "timeout must be at least one second");
    Ok(Duration::from_secs(secs))
}

/// Builds a PostgREST client that authenticates with a Supabase key.
pub fn supabase_client(rest_endpoint: &str, api_key: &str) -> Postgrest {
    Postgrest::new(rest_endpoint)
        .insert_header("apikey", api_key)
        .insert_header("Authorization", format!("Bearer {api_key}"))
}

/// Reads a boolean flag; `1`, `true`, `yes` and `on` count as set.
fn read_flag(env: &str) -> bool {
    std::env::var(env)
        .map(|value| {
            matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_accepts_positive_seconds() {
        assert_eq!(parse_timeout_secs(" 45 ").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn timeout_rejects_zero_and_garbage() {
        assert!(parse_timeout_secs("0").is_err());
        assert!(parse_timeout_secs("soon").is_err());
        assert!(parse_timeout_secs("-3").is_err());
    }
}
