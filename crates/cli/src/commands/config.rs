use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use leadloop_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct Entry {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Entry {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run(config_path: Option<PathBuf>) -> String {
    let config = match AppConfig::load(LoadOptions {
        config_path: config_path.clone(),
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path(config_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec![
        "effective config (source precedence: override > env > file > default):".to_string(),
    ];
    for entry in entries(&config) {
        let source = field_source(
            entry.key,
            entry.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(entry.key, &entry.value, source));
    }

    lines.join("\n")
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    let supersearch = &config.supersearch;
    let llm = &config.llm;
    let refinement = &config.refinement;
    let enrichment = &config.enrichment;

    vec![
        Entry::new(
            "supersearch.api_key",
            redact_secret(Some(&supersearch.api_key)),
            &["LEADLOOP_SUPERSEARCH_API_KEY", "INSTANTLY_API_KEY"],
        ),
        Entry::new(
            "supersearch.base_url",
            supersearch.base_url.as_str(),
            &["LEADLOOP_SUPERSEARCH_BASE_URL"],
        ),
        Entry::new(
            "supersearch.timeout_secs",
            supersearch.timeout_secs.to_string(),
            &["LEADLOOP_SUPERSEARCH_TIMEOUT_SECS"],
        ),
        Entry::new("llm.provider", llm.provider.as_str(), &["LEADLOOP_LLM_PROVIDER"]),
        Entry::new("llm.model", llm.model.as_str(), &["LEADLOOP_LLM_MODEL"]),
        Entry::new(
            "llm.base_url",
            llm.base_url.as_deref().unwrap_or("<provider default>"),
            &["LEADLOOP_LLM_BASE_URL"],
        ),
        Entry::new(
            "llm.api_key",
            redact_secret(llm.api_key.as_ref()),
            &["LEADLOOP_LLM_API_KEY", "ANTHROPIC_API_KEY", "OPENAI_API_KEY"],
        ),
        Entry::new("llm.timeout_secs", llm.timeout_secs.to_string(), &["LEADLOOP_LLM_TIMEOUT_SECS"]),
        Entry::new("llm.max_tokens", llm.max_tokens.to_string(), &["LEADLOOP_LLM_MAX_TOKENS"]),
        Entry::new(
            "refinement.max_iterations",
            refinement.max_iterations.to_string(),
            &["LEADLOOP_REFINEMENT_MAX_ITERATIONS"],
        ),
        Entry::new(
            "refinement.target_min",
            refinement.target_min.to_string(),
            &["LEADLOOP_REFINEMENT_TARGET_MIN"],
        ),
        Entry::new(
            "refinement.target_max",
            refinement.target_max.to_string(),
            &["LEADLOOP_REFINEMENT_TARGET_MAX"],
        ),
        Entry::new(
            "refinement.max_retries",
            refinement.max_retries.to_string(),
            &["LEADLOOP_REFINEMENT_MAX_RETRIES"],
        ),
        Entry::new(
            "enrichment.default_limit",
            enrichment.default_limit.to_string(),
            &["LEADLOOP_ENRICHMENT_DEFAULT_LIMIT"],
        ),
        Entry::new(
            "enrichment.custom_flow",
            format!("[{}]", enrichment.custom_flow.join(", ")),
            &[],
        ),
        Entry::new(
            "enrichment.max_status_polls",
            enrichment.max_status_polls.to_string(),
            &["LEADLOOP_ENRICHMENT_MAX_STATUS_POLLS"],
        ),
        Entry::new(
            "logging.level",
            config.logging.level.as_str(),
            &["LEADLOOP_LOGGING_LEVEL", "LEADLOOP_LOG_LEVEL"],
        ),
        Entry::new(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["LEADLOOP_LOGGING_FORMAT", "LEADLOOP_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then_some(path);
    }

    let root = PathBuf::from("leadloop.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/leadloop.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    let from_env = env_keys
        .iter()
        .find(|key| env::var(key).is_ok_and(|value| !value.trim().is_empty()));
    if let Some(env_key) = from_env {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        if prefix.len() <= 6 {
            return format!("{prefix}-***");
        }
    }

    "<redacted>".to_string()
}
