use std::path::PathBuf;

use clap::Args;
use leadloop_agent::{HttpLlmClient, LlmAdvisor};
use leadloop_core::config::{AppConfig, ConfigOverrides, ValidationScope};
use leadloop_core::errors::ApplicationError;
use leadloop_core::filters::FilterModel;
use leadloop_core::refinement::{
    EnrichmentOutcome, LeadPipeline, LoopPhase, PipelineReport, PipelineRequest, TerminationReason,
};
use leadloop_supersearch::SuperSearchClient;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::commands::{
    load_config, read_input_file, runtime, CommandResult, EXIT_CANCELLED, EXIT_CONFIG,
    EXIT_ENRICHMENT, EXIT_INPUT, EXIT_SERVICE,
};

const COMMAND: &str = "run";

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    #[arg(long, help = "Plain-language description of the leads to find")]
    pub goal: Option<String>,
    #[arg(long, conflicts_with = "goal", help = "Read the goal text from a file")]
    pub goal_file: Option<PathBuf>,
    #[arg(long, help = "JSON filter document to start from instead of asking the advisor")]
    pub filters: Option<PathBuf>,
    #[arg(long)]
    pub target_min: Option<u64>,
    #[arg(long)]
    pub target_max: Option<u64>,
    #[arg(long)]
    pub max_iterations: Option<u32>,
    #[arg(long, help = "Submit the final filters for enrichment (billable)")]
    pub enrich: bool,
    #[arg(long, help = "Upper bound on leads to enrich; capped at the final preview count")]
    pub limit: Option<u64>,
    #[arg(long, conflicts_with = "resource_id")]
    pub list_name: Option<String>,
    #[arg(long, help = "Add leads to an existing list or campaign")]
    pub resource_id: Option<String>,
    #[arg(long, help = "Skip status polling after enrichment is submitted")]
    pub no_poll: bool,
    #[arg(long, help = "Path to leadloop.toml")]
    pub config: Option<PathBuf>,
}

pub fn run(args: RunArgs) -> CommandResult {
    let overrides = ConfigOverrides {
        max_iterations: args.max_iterations,
        target_min: args.target_min,
        target_max: args.target_max,
        enrichment_limit: args.limit,
        ..ConfigOverrides::default()
    };
    let scope = ValidationScope::Full;
    let config = match load_config(COMMAND, args.config.clone(), overrides, scope) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let request = match build_request(&config, args) {
        Ok(request) => request,
        Err(result) => return result,
    };
    let pipeline = match build_pipeline(&config) {
        Ok(pipeline) => pipeline,
        Err(result) => return result,
    };
    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let report = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!(event_name = "cli.run.interrupt", "interrupt received; stopping run");
                    cancel.cancel();
                }
            })
        };
        let report = pipeline.run(request, &cancel).await;
        watcher.abort();
        report
    });

    render_report(&report)
}

fn build_request(config: &AppConfig, args: RunArgs) -> Result<PipelineRequest, CommandResult> {
    let goal = match (args.goal, args.goal_file) {
        (Some(goal), _) => goal,
        (None, Some(path)) => read_input_file(COMMAND, &path)?,
        (None, None) => String::new(),
    };
    if goal.trim().is_empty() {
        return Err(CommandResult::failure(
            COMMAND,
            "invalid_input",
            "a non-empty --goal or --goal-file is required",
            EXIT_INPUT,
        ));
    }

    let initial_filters = match &args.filters {
        Some(path) => {
            let raw = read_input_file(COMMAND, path)?;
            let filters = FilterModel::from_json(&raw).map_err(|error| {
                let error = ApplicationError::from(error);
                CommandResult::failure(COMMAND, error.error_class(), error.to_string(), EXIT_INPUT)
            })?;
            Some(filters)
        }
        None => None,
    };

    let target = config.target_range().map_err(|error| {
        CommandResult::failure(COMMAND, "config_validation", error.to_string(), EXIT_CONFIG)
    })?;

    let mut enrichment = config.enrichment_plan();
    enrichment.list_name = args.list_name;
    enrichment.resource_id = args.resource_id;
    if args.no_poll {
        enrichment.polling = None;
    }

    Ok(PipelineRequest { goal, target, auto_enrich: args.enrich, initial_filters, enrichment })
}

type CliPipeline = LeadPipeline<SuperSearchClient, LlmAdvisor<HttpLlmClient>, SuperSearchClient>;

fn build_pipeline(config: &AppConfig) -> Result<CliPipeline, CommandResult> {
    let search = SuperSearchClient::from_config(&config.supersearch).map_err(|error| {
        CommandResult::failure(COMMAND, error.error_class(), error.to_string(), EXIT_SERVICE)
    })?;
    let llm = HttpLlmClient::from_config(&config.llm).map_err(|error| {
        CommandResult::failure(COMMAND, error.error_class(), error.to_string(), EXIT_SERVICE)
    })?;
    let advisor = LlmAdvisor::new(llm, config.llm.max_tokens);

    Ok(LeadPipeline::new(search.clone(), advisor, search, config.loop_settings()))
}

pub fn exit_code(report: &PipelineReport) -> u8 {
    let cancelled = report
        .termination
        .as_ref()
        .is_some_and(|summary| summary.code == TerminationReason::Cancelled.code());
    match (report.phase, &report.enrichment) {
        (LoopPhase::Aborted, _) if cancelled => EXIT_CANCELLED,
        (LoopPhase::Aborted, _) => EXIT_SERVICE,
        (_, EnrichmentOutcome::Failed { .. }) => EXIT_ENRICHMENT,
        _ => 0,
    }
}

pub fn render_report(report: &PipelineReport) -> CommandResult {
    match serde_json::to_string_pretty(report) {
        Ok(output) => CommandResult { exit_code: exit_code(report), output },
        Err(error) => CommandResult::failure(
            COMMAND,
            "serialization",
            format!("could not serialize run report: {error}"),
            EXIT_SERVICE,
        ),
    }
}
