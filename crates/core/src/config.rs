use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::FilterError;
use crate::refinement::engine::LoopSettings;
use crate::refinement::pipeline::{EnrichmentPlan, StatusPolling};
use crate::refinement::retry::RetryPolicy;
use crate::refinement::states::TargetRange;
use crate::search::EnrichmentOptions;

pub const MAX_ITERATIONS_CEILING: u32 = 50;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub supersearch: SuperSearchConfig,
    pub llm: LlmConfig,
    pub refinement: RefinementConfig,
    pub enrichment: EnrichmentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SuperSearchConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct RefinementConfig {
    pub max_iterations: u32,
    pub target_min: u64,
    pub target_max: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct EnrichmentConfig {
    pub default_limit: u64,
    pub work_email_enrichment: bool,
    pub email_verification: bool,
    pub fully_enriched_profile: bool,
    pub custom_flow: Vec<String>,
    pub poll_interval_secs: u64,
    /// Zero disables status polling after submission.
    pub max_status_polls: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub supersearch_api_key: Option<String>,
    pub supersearch_base_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub max_iterations: Option<u32>,
    pub target_min: Option<u64>,
    pub target_max: Option<u64>,
    pub enrichment_limit: Option<u64>,
}

/// Which sections must be complete for the caller. Search-only callers
/// (preview counts, status reads) never talk to the LLM.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValidationScope {
    #[default]
    Full,
    SearchOnly,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
    pub scope: ValidationScope,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supersearch: SuperSearchConfig {
                api_key: String::new().into(),
                base_url: "https://api.instantly.ai/api/v2".to_string(),
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Anthropic,
                api_key: None,
                base_url: None,
                model: "claude-sonnet-4-20250514".to_string(),
                timeout_secs: 60,
                max_tokens: 2_000,
            },
            refinement: RefinementConfig {
                max_iterations: 5,
                target_min: 500,
                target_max: 2_000,
                max_retries: 3,
                base_delay_ms: 500,
                max_delay_ms: 8_000,
            },
            enrichment: EnrichmentConfig {
                default_limit: 1_000,
                work_email_enrichment: true,
                email_verification: true,
                fully_enriched_profile: true,
                custom_flow: vec!["instantly".to_string()],
                poll_interval_secs: 10,
                max_status_polls: 0,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("leadloop.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate_for(options.scope)?;

        Ok(config)
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            max_iterations: self.refinement.max_iterations,
            retry: RetryPolicy {
                max_retries: self.refinement.max_retries,
                base_delay_ms: self.refinement.base_delay_ms,
                max_delay_ms: self.refinement.max_delay_ms,
            },
        }
    }

    pub fn target_range(&self) -> Result<TargetRange, FilterError> {
        TargetRange::new(self.refinement.target_min, self.refinement.target_max)
    }

    pub fn enrichment_options(&self) -> EnrichmentOptions {
        EnrichmentOptions {
            work_email_enrichment: self.enrichment.work_email_enrichment,
            email_verification: self.enrichment.email_verification,
            fully_enriched_profile: self.enrichment.fully_enriched_profile,
            custom_flow: self.enrichment.custom_flow.clone(),
            ..EnrichmentOptions::default()
        }
    }

    pub fn status_polling(&self) -> Option<StatusPolling> {
        (self.enrichment.max_status_polls > 0).then(|| StatusPolling {
            interval: Duration::from_secs(self.enrichment.poll_interval_secs),
            max_polls: self.enrichment.max_status_polls,
        })
    }

    pub fn enrichment_plan(&self) -> EnrichmentPlan {
        EnrichmentPlan {
            requested_limit: self.enrichment.default_limit,
            list_name: None,
            resource_id: None,
            options: self.enrichment_options(),
            polling: self.status_polling(),
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(supersearch) = patch.supersearch {
            if let Some(api_key) = supersearch.api_key {
                self.supersearch.api_key = secret_value(api_key);
            }
            if let Some(base_url) = supersearch.base_url {
                self.supersearch.base_url = base_url;
            }
            if let Some(timeout_secs) = supersearch.timeout_secs {
                self.supersearch.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
        }

        if let Some(refinement) = patch.refinement {
            if let Some(max_iterations) = refinement.max_iterations {
                self.refinement.max_iterations = max_iterations;
            }
            if let Some(target_min) = refinement.target_min {
                self.refinement.target_min = target_min;
            }
            if let Some(target_max) = refinement.target_max {
                self.refinement.target_max = target_max;
            }
            if let Some(max_retries) = refinement.max_retries {
                self.refinement.max_retries = max_retries;
            }
            if let Some(base_delay_ms) = refinement.base_delay_ms {
                self.refinement.base_delay_ms = base_delay_ms;
            }
            if let Some(max_delay_ms) = refinement.max_delay_ms {
                self.refinement.max_delay_ms = max_delay_ms;
            }
        }

        if let Some(enrichment) = patch.enrichment {
            if let Some(default_limit) = enrichment.default_limit {
                self.enrichment.default_limit = default_limit;
            }
            if let Some(work_email_enrichment) = enrichment.work_email_enrichment {
                self.enrichment.work_email_enrichment = work_email_enrichment;
            }
            if let Some(email_verification) = enrichment.email_verification {
                self.enrichment.email_verification = email_verification;
            }
            if let Some(fully_enriched_profile) = enrichment.fully_enriched_profile {
                self.enrichment.fully_enriched_profile = fully_enriched_profile;
            }
            if let Some(custom_flow) = enrichment.custom_flow {
                self.enrichment.custom_flow = custom_flow;
            }
            if let Some(poll_interval_secs) = enrichment.poll_interval_secs {
                self.enrichment.poll_interval_secs = poll_interval_secs;
            }
            if let Some(max_status_polls) = enrichment.max_status_polls {
                self.enrichment.max_status_polls = max_status_polls;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let supersearch_key =
            read_env("LEADLOOP_SUPERSEARCH_API_KEY").or_else(|| read_env("INSTANTLY_API_KEY"));
        if let Some(value) = supersearch_key {
            self.supersearch.api_key = secret_value(value);
        }
        if let Some(value) = read_env("LEADLOOP_SUPERSEARCH_BASE_URL") {
            self.supersearch.base_url = value;
        }
        if let Some(value) = read_env("LEADLOOP_SUPERSEARCH_TIMEOUT_SECS") {
            self.supersearch.timeout_secs = parse_u64("LEADLOOP_SUPERSEARCH_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADLOOP_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        let llm_key = read_env("LEADLOOP_LLM_API_KEY").or_else(|| match self.llm.provider {
            LlmProvider::Anthropic => read_env("ANTHROPIC_API_KEY"),
            LlmProvider::OpenAi => read_env("OPENAI_API_KEY"),
            LlmProvider::Ollama => None,
        });
        if let Some(value) = llm_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("LEADLOOP_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("LEADLOOP_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("LEADLOOP_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("LEADLOOP_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LEADLOOP_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("LEADLOOP_LLM_MAX_TOKENS", &value)?;
        }

        if let Some(value) = read_env("LEADLOOP_REFINEMENT_MAX_ITERATIONS") {
            self.refinement.max_iterations =
                parse_u32("LEADLOOP_REFINEMENT_MAX_ITERATIONS", &value)?;
        }
        if let Some(value) = read_env("LEADLOOP_REFINEMENT_TARGET_MIN") {
            self.refinement.target_min = parse_u64("LEADLOOP_REFINEMENT_TARGET_MIN", &value)?;
        }
        if let Some(value) = read_env("LEADLOOP_REFINEMENT_TARGET_MAX") {
            self.refinement.target_max = parse_u64("LEADLOOP_REFINEMENT_TARGET_MAX", &value)?;
        }
        if let Some(value) = read_env("LEADLOOP_REFINEMENT_MAX_RETRIES") {
            self.refinement.max_retries = parse_u32("LEADLOOP_REFINEMENT_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("LEADLOOP_REFINEMENT_BASE_DELAY_MS") {
            self.refinement.base_delay_ms = parse_u64("LEADLOOP_REFINEMENT_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("LEADLOOP_REFINEMENT_MAX_DELAY_MS") {
            self.refinement.max_delay_ms = parse_u64("LEADLOOP_REFINEMENT_MAX_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("LEADLOOP_ENRICHMENT_DEFAULT_LIMIT") {
            self.enrichment.default_limit = parse_u64("LEADLOOP_ENRICHMENT_DEFAULT_LIMIT", &value)?;
        }
        if let Some(value) = read_env("LEADLOOP_ENRICHMENT_WORK_EMAIL_ENRICHMENT") {
            self.enrichment.work_email_enrichment =
                parse_bool("LEADLOOP_ENRICHMENT_WORK_EMAIL_ENRICHMENT", &value)?;
        }
        if let Some(value) = read_env("LEADLOOP_ENRICHMENT_EMAIL_VERIFICATION") {
            self.enrichment.email_verification =
                parse_bool("LEADLOOP_ENRICHMENT_EMAIL_VERIFICATION", &value)?;
        }
        if let Some(value) = read_env("LEADLOOP_ENRICHMENT_FULLY_ENRICHED_PROFILE") {
            self.enrichment.fully_enriched_profile =
                parse_bool("LEADLOOP_ENRICHMENT_FULLY_ENRICHED_PROFILE", &value)?;
        }
        if let Some(value) = read_env("LEADLOOP_ENRICHMENT_POLL_INTERVAL_SECS") {
            self.enrichment.poll_interval_secs =
                parse_u64("LEADLOOP_ENRICHMENT_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("LEADLOOP_ENRICHMENT_MAX_STATUS_POLLS") {
            self.enrichment.max_status_polls =
                parse_u32("LEADLOOP_ENRICHMENT_MAX_STATUS_POLLS", &value)?;
        }

        let log_level =
            read_env("LEADLOOP_LOGGING_LEVEL").or_else(|| read_env("LEADLOOP_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LEADLOOP_LOGGING_FORMAT").or_else(|| read_env("LEADLOOP_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(api_key) = overrides.supersearch_api_key {
            self.supersearch.api_key = secret_value(api_key);
        }
        if let Some(base_url) = overrides.supersearch_base_url {
            self.supersearch.base_url = base_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(max_iterations) = overrides.max_iterations {
            self.refinement.max_iterations = max_iterations;
        }
        if let Some(target_min) = overrides.target_min {
            self.refinement.target_min = target_min;
        }
        if let Some(target_max) = overrides.target_max {
            self.refinement.target_max = target_max;
        }
        if let Some(limit) = overrides.enrichment_limit {
            self.enrichment.default_limit = limit;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_for(ValidationScope::Full)
    }

    pub fn validate_for(&self, scope: ValidationScope) -> Result<(), ConfigError> {
        validate_supersearch(&self.supersearch)?;
        if scope == ValidationScope::Full {
            validate_llm(&self.llm)?;
        }
        validate_refinement(&self.refinement)?;
        validate_enrichment(&self.enrichment)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("leadloop.toml"), PathBuf::from("config/leadloop.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn validate_supersearch(supersearch: &SuperSearchConfig) -> Result<(), ConfigError> {
    if supersearch.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "supersearch.api_key is required. Create one under Settings > Integrations > API Keys in the Instantly dashboard".to_string(),
        ));
    }

    if !is_http_url(supersearch.base_url.trim()) {
        return Err(ConfigError::Validation(
            "supersearch.base_url must start with http:// or https://".to_string(),
        ));
    }

    if supersearch.timeout_secs == 0 || supersearch.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "supersearch.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !is_http_url(base_url.trim()) {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_refinement(refinement: &RefinementConfig) -> Result<(), ConfigError> {
    if refinement.max_iterations == 0 || refinement.max_iterations > MAX_ITERATIONS_CEILING {
        return Err(ConfigError::Validation(format!(
            "refinement.max_iterations must be in range 1..={MAX_ITERATIONS_CEILING}"
        )));
    }

    if refinement.target_min > refinement.target_max {
        return Err(ConfigError::Validation(format!(
            "refinement.target_min ({}) must not exceed refinement.target_max ({})",
            refinement.target_min, refinement.target_max
        )));
    }

    if refinement.base_delay_ms > refinement.max_delay_ms {
        return Err(ConfigError::Validation(
            "refinement.base_delay_ms must not exceed refinement.max_delay_ms".to_string(),
        ));
    }

    Ok(())
}

fn validate_enrichment(enrichment: &EnrichmentConfig) -> Result<(), ConfigError> {
    if enrichment.default_limit == 0 {
        return Err(ConfigError::Validation(
            "enrichment.default_limit must be greater than zero".to_string(),
        ));
    }

    if enrichment.max_status_polls > 0 && enrichment.poll_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "enrichment.poll_interval_secs must be greater than zero when polling is enabled"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    supersearch: Option<SuperSearchPatch>,
    llm: Option<LlmPatch>,
    refinement: Option<RefinementPatch>,
    enrichment: Option<EnrichmentPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SuperSearchPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RefinementPatch {
    max_iterations: Option<u32>,
    target_min: Option<u64>,
    target_max: Option<u64>,
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EnrichmentPatch {
    default_limit: Option<u64>,
    work_email_enrichment: Option<bool>,
    email_verification: Option<bool>,
    fully_enriched_profile: Option<bool>,
    custom_flow: Option<Vec<String>>,
    poll_interval_secs: Option<u64>,
    max_status_polls: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat,
        ValidationScope,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const CREDENTIAL_VARS: [&str; 4] = [
        "LEADLOOP_SUPERSEARCH_API_KEY",
        "LEADLOOP_LLM_API_KEY",
        "INSTANTLY_API_KEY",
        "ANTHROPIC_API_KEY",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn set_credentials() {
        clear_vars(&CREDENTIAL_VARS);
        env::set_var("LEADLOOP_SUPERSEARCH_API_KEY", "ss-test-key");
        env::set_var("LEADLOOP_LLM_API_KEY", "llm-test-key");
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&CREDENTIAL_VARS);

        env::set_var("TEST_SUPERSEARCH_KEY", "ss-from-env");
        env::set_var("TEST_ANTHROPIC_KEY", "sk-ant-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("leadloop.toml");
            fs::write(
                &path,
                r#"
[supersearch]
api_key = "${TEST_SUPERSEARCH_KEY}"

[llm]
provider = "anthropic"
api_key = "${TEST_ANTHROPIC_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.supersearch.api_key.expose_secret() == "ss-from-env",
                "supersearch key should be loaded from environment",
            )?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("sk-ant-from-env".to_string()),
                "llm key should be loaded from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_SUPERSEARCH_KEY", "TEST_ANTHROPIC_KEY"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["TEST_UNSET_LEADLOOP_KEY"]);

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("leadloop.toml");
        fs::write(&path, "[supersearch]\napi_key = \"${TEST_UNSET_LEADLOOP_KEY}\"\n")
            .map_err(|err| err.to_string())?;

        let error =
            match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
            {
                Ok(_) => return Err("expected interpolation failure".to_string()),
                Err(error) => error,
            };
        ensure(
            matches!(
                error,
                ConfigError::MissingEnvInterpolation { ref var } if var == "TEST_UNSET_LEADLOOP_KEY"
            ),
            "error should name the missing variable",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_credentials();
        env::set_var("LEADLOOP_LOG_LEVEL", "warn");
        env::set_var("LEADLOOP_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&CREDENTIAL_VARS);
        clear_vars(&["LEADLOOP_LOG_LEVEL", "LEADLOOP_LOG_FORMAT"]);
        result
    }

    #[test]
    fn vendor_key_variables_are_accepted_as_fallbacks() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        clear_vars(&CREDENTIAL_VARS);
        env::set_var("INSTANTLY_API_KEY", "instantly-key");
        env::set_var("ANTHROPIC_API_KEY", "anthropic-key");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.supersearch.api_key.expose_secret() == "instantly-key",
                "INSTANTLY_API_KEY should fill the supersearch key",
            )?;
            ensure(
                config.llm.provider == LlmProvider::Anthropic,
                "default provider should be anthropic",
            )?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("anthropic-key".to_string()),
                "ANTHROPIC_API_KEY should fill the llm key",
            )?;
            Ok(())
        })();

        clear_vars(&CREDENTIAL_VARS);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_credentials();
        env::set_var("LEADLOOP_REFINEMENT_TARGET_MAX", "3000");
        env::set_var("LEADLOOP_REFINEMENT_MAX_ITERATIONS", "7");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("leadloop.toml");
            fs::write(
                &path,
                r#"
[refinement]
target_min = 100
target_max = 900
max_iterations = 3

[enrichment]
default_limit = 250
custom_flow = ["instantly", "clay"]

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    max_iterations: Some(9),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.refinement.target_min == 100, "file target_min should beat default")?;
            ensure(config.refinement.target_max == 3_000, "env target_max should beat file")?;
            ensure(config.refinement.max_iterations == 9, "override should beat env and file")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.enrichment.default_limit == 250, "file limit should be applied")?;
            ensure(
                config.enrichment_options().custom_flow == vec!["instantly", "clay"],
                "custom flow should come from file",
            )?;
            ensure(config.loop_settings().max_iterations == 9, "loop settings mirror config")?;
            Ok(())
        })();

        clear_vars(&CREDENTIAL_VARS);
        clear_vars(&["LEADLOOP_REFINEMENT_TARGET_MAX", "LEADLOOP_REFINEMENT_MAX_ITERATIONS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        clear_vars(&CREDENTIAL_VARS);
        env::set_var("LEADLOOP_LLM_API_KEY", "llm-test-key");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("supersearch.api_key")
            );
            ensure(has_message, "validation failure should mention supersearch.api_key")
        })();

        clear_vars(&CREDENTIAL_VARS);
        result
    }

    #[test]
    fn search_only_scope_does_not_require_llm_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        clear_vars(&CREDENTIAL_VARS);
        env::set_var("LEADLOOP_SUPERSEARCH_API_KEY", "ss-test-key");

        let result = (|| -> Result<(), String> {
            let full = AppConfig::load(LoadOptions::default());
            ensure(
                matches!(full, Err(ConfigError::Validation(ref message)) if message.contains("llm.api_key")),
                "full scope should still require llm.api_key",
            )?;

            let search_only = AppConfig::load(LoadOptions {
                scope: ValidationScope::SearchOnly,
                ..LoadOptions::default()
            })
            .map_err(|error| format!("search-only load failed: {error}"))?;
            ensure(search_only.llm.api_key.is_none(), "llm key should stay unset")?;

            let missing_search_key = {
                env::remove_var("LEADLOOP_SUPERSEARCH_API_KEY");
                AppConfig::load(LoadOptions {
                    scope: ValidationScope::SearchOnly,
                    ..LoadOptions::default()
                })
            };
            ensure(
                matches!(missing_search_key, Err(ConfigError::Validation(ref message)) if message.contains("supersearch.api_key")),
                "search-only scope should still require supersearch.api_key",
            )
        })();

        clear_vars(&CREDENTIAL_VARS);
        result
    }

    #[test]
    fn iteration_budget_and_target_are_bounded() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_credentials();

        let result = (|| -> Result<(), String> {
            let too_many = AppConfig::load(LoadOptions {
                overrides: ConfigOverrides { max_iterations: Some(51), ..ConfigOverrides::default() },
                ..LoadOptions::default()
            });
            ensure(
                matches!(too_many, Err(ConfigError::Validation(ref message)) if message.contains("max_iterations")),
                "max_iterations above the ceiling should fail",
            )?;

            let inverted = AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    target_min: Some(5_000),
                    target_max: Some(10),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            });
            ensure(
                matches!(inverted, Err(ConfigError::Validation(ref message)) if message.contains("target_min")),
                "inverted target range should fail",
            )
        })();

        clear_vars(&CREDENTIAL_VARS);
        result
    }

    #[test]
    fn invalid_numeric_env_value_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_credentials();
        env::set_var("LEADLOOP_ENRICHMENT_DEFAULT_LIMIT", "lots");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                key == "LEADLOOP_ENRICHMENT_DEFAULT_LIMIT",
                "error should name the offending variable",
            ),
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected invalid env override".to_string()),
        };

        clear_vars(&CREDENTIAL_VARS);
        clear_vars(&["LEADLOOP_ENRICHMENT_DEFAULT_LIMIT"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        clear_vars(&CREDENTIAL_VARS);
        env::set_var("LEADLOOP_SUPERSEARCH_API_KEY", "ss-secret-value");
        env::set_var("LEADLOOP_LLM_API_KEY", "llm-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("ss-secret-value"),
                "debug output should not contain supersearch key",
            )?;
            ensure(!debug.contains("llm-secret-value"), "debug output should not contain llm key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            ensure(config.status_polling().is_none(), "status polling is off by default")?;
            Ok(())
        })();

        clear_vars(&CREDENTIAL_VARS);
        result
    }
}
