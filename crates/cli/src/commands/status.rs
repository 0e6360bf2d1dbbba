use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use leadloop_core::config::{ConfigOverrides, ValidationScope};
use leadloop_core::errors::Service;
use leadloop_core::refinement::{poll_status, StatusPolling};
use leadloop_core::search::Enrichment;
use leadloop_supersearch::SuperSearchClient;

use crate::commands::{load_config, runtime, CommandResult, EXIT_INPUT, EXIT_SERVICE};

const COMMAND: &str = "status";
const WAIT_MAX_POLLS: u32 = 60;

#[derive(Debug, Clone, Args)]
pub struct StatusArgs {
    #[arg(help = "Resource id returned when enrichment was submitted")]
    pub resource_id: String,
    #[arg(long, help = "Poll until the enrichment job stops reporting in_progress")]
    pub wait: bool,
    #[arg(long, help = "Path to leadloop.toml")]
    pub config: Option<PathBuf>,
}

pub fn run(args: StatusArgs) -> CommandResult {
    if args.resource_id.trim().is_empty() {
        return CommandResult::failure(
            COMMAND,
            "invalid_input",
            "resource id must not be empty",
            EXIT_INPUT,
        );
    }
    let scope = ValidationScope::SearchOnly;
    let config = match load_config(COMMAND, args.config, ConfigOverrides::default(), scope) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let client = match SuperSearchClient::from_config(&config.supersearch) {
        Ok(client) => client,
        Err(error) => {
            return CommandResult::failure(COMMAND, error.error_class(), error.to_string(), EXIT_SERVICE)
        }
    };
    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let retry = config.loop_settings().retry;
    let resource_id = args.resource_id.as_str();
    let result = runtime.block_on(async {
        if args.wait {
            let polling = config.status_polling().unwrap_or(StatusPolling {
                interval: Duration::from_secs(config.enrichment.poll_interval_secs.max(1)),
                max_polls: WAIT_MAX_POLLS,
            });
            poll_status(&client, resource_id, polling, retry).await
        } else {
            let client = &client;
            retry.run(Service::Status, move || client.status(resource_id)).await
        }
    });

    match result {
        Ok(status) => match serde_json::to_string(&status) {
            Ok(body) => CommandResult::success(COMMAND, body),
            Err(error) => CommandResult::failure(COMMAND, "serialization", error.to_string(), EXIT_SERVICE),
        },
        Err(error) => {
            CommandResult::failure(COMMAND, error.error_class(), error.to_string(), EXIT_SERVICE)
        }
    }
}
