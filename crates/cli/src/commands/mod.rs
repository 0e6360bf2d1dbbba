pub mod config;
pub mod doctor;
pub mod preview;
pub mod run;
pub mod status;

use std::path::PathBuf;

use leadloop_core::config::{AppConfig, ConfigOverrides, LoadOptions, ValidationScope};
use serde::Serialize;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_INPUT: u8 = 3;
pub const EXIT_SERVICE: u8 = 4;
pub const EXIT_ENRICHMENT: u8 = 5;
pub const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Loads and validates config for `scope`, then installs the log subscriber.
/// The error side is the ready-to-print failure for `command`.
pub(crate) fn load_config(
    command: &str,
    config_path: Option<PathBuf>,
    overrides: ConfigOverrides,
    scope: ValidationScope,
) -> Result<AppConfig, CommandResult> {
    let config = AppConfig::load(LoadOptions { config_path, require_file: false, overrides, scope })
        .map_err(|error| {
            CommandResult::failure(command, "config_validation", error.to_string(), EXIT_CONFIG)
        })?;
    crate::init_logging(&config);
    Ok(config)
}

pub(crate) fn runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime",
            format!("failed to initialize async runtime: {error}"),
            EXIT_SERVICE,
        )
    })
}

pub(crate) fn read_input_file(command: &str, path: &std::path::Path) -> Result<String, CommandResult> {
    std::fs::read_to_string(path).map_err(|error| {
        CommandResult::failure(
            command,
            "invalid_input",
            format!("could not read `{}`: {error}", path.display()),
            EXIT_INPUT,
        )
    })
}
