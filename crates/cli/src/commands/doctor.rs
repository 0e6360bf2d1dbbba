use std::path::PathBuf;

use leadloop_core::config::{AppConfig, LlmProvider, LoadOptions, ValidationScope};
use leadloop_core::filters::FilterModel;
use leadloop_core::search::LeadSearch;
use leadloop_supersearch::SuperSearchClient;
use serde::Serialize;

use crate::commands::{CommandResult, EXIT_CONFIG};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: reason.to_string() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// `live` adds a live preview call with an empty filter; previews are free
/// but do need network access and a valid key.
pub fn run(json_output: bool, live: bool, config_path: Option<PathBuf>) -> CommandResult {
    let report = build_report(live, config_path);
    let exit_code = if report.overall_status == CheckStatus::Fail { EXIT_CONFIG } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(live: bool, config_path: Option<PathBuf>) -> DoctorReport {
    let mut checks = Vec::new();

    let options =
        LoadOptions { config_path, scope: ValidationScope::SearchOnly, ..LoadOptions::default() };
    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_provider(&config));
            checks.push(check_refinement_window(&config));
            if live {
                checks.push(check_preview_reachability(&config));
            } else {
                checks.push(DoctorCheck::skipped(
                    "supersearch_preview",
                    "pass --live to call the preview endpoint",
                ));
            }
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            let reason = "skipped because configuration did not load";
            checks.push(DoctorCheck::skipped("llm_provider", reason));
            checks.push(DoctorCheck::skipped("refinement_window", reason));
            checks.push(DoctorCheck::skipped("supersearch_preview", reason));
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_provider(config: &AppConfig) -> DoctorCheck {
    if let Err(error) = config.validate_for(ValidationScope::Full) {
        return DoctorCheck {
            name: "llm_provider",
            status: CheckStatus::Fail,
            details: format!("{error} (needed by `run`; `preview` and `status` still work)"),
        };
    }

    let endpoint = config
        .llm
        .base_url
        .clone()
        .unwrap_or_else(|| leadloop_agent::default_base_url(config.llm.provider).to_string());
    let credential = match config.llm.provider {
        LlmProvider::Ollama => "no api key required",
        LlmProvider::Anthropic | LlmProvider::OpenAi => "api key present",
    };
    DoctorCheck {
        name: "llm_provider",
        status: CheckStatus::Pass,
        details: format!(
            "{} model `{}` at {endpoint} ({credential})",
            config.llm.provider.as_str(),
            config.llm.model
        ),
    }
}

/// Informational; range and budget bounds are already enforced at load.
fn check_refinement_window(config: &AppConfig) -> DoctorCheck {
    let refinement = &config.refinement;
    DoctorCheck {
        name: "refinement_window",
        status: CheckStatus::Pass,
        details: format!(
            "target {}..={} leads within {} iterations, enrichment capped at {} leads",
            refinement.target_min,
            refinement.target_max,
            refinement.max_iterations,
            config.enrichment.default_limit
        ),
    }
}

fn check_preview_reachability(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "supersearch_preview",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let client = SuperSearchClient::from_config(&config.supersearch)?;
        client.preview(&FilterModel::default()).await
    });

    match result {
        Ok(preview) => DoctorCheck {
            name: "supersearch_preview",
            status: CheckStatus::Pass,
            details: format!("preview endpoint reachable ({} leads unfiltered)", preview.count),
        },
        Err(error) => DoctorCheck {
            name: "supersearch_preview",
            status: CheckStatus::Fail,
            details: format!("{}: {error}", error.error_class()),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
