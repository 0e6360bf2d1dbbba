use std::path::PathBuf;

use clap::Args;
use leadloop_core::config::{ConfigOverrides, ValidationScope};
use leadloop_core::errors::{ApplicationError, Service};
use leadloop_core::filters::FilterModel;
use leadloop_core::search::LeadSearch;
use leadloop_supersearch::SuperSearchClient;

use crate::commands::{load_config, read_input_file, runtime, CommandResult, EXIT_INPUT, EXIT_SERVICE};

const COMMAND: &str = "preview";

#[derive(Debug, Clone, Args)]
pub struct PreviewArgs {
    #[arg(long, help = "JSON filter document to count")]
    pub filters: PathBuf,
    #[arg(long, help = "Path to leadloop.toml")]
    pub config: Option<PathBuf>,
}

/// One free count query, retried like a loop preview; no advisor involved.
pub fn run(args: PreviewArgs) -> CommandResult {
    let scope = ValidationScope::SearchOnly;
    let config = match load_config(COMMAND, args.config, ConfigOverrides::default(), scope) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let filters = match read_input_file(COMMAND, &args.filters).and_then(|raw| {
        FilterModel::from_json(&raw).map_err(|error| {
            let error = ApplicationError::from(error);
            CommandResult::failure(COMMAND, error.error_class(), error.to_string(), EXIT_INPUT)
        })
    }) {
        Ok(filters) => filters,
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
    let result = runtime.block_on(async {
        let client = &client;
        let filters = &filters;
        retry.run(Service::Preview, move || client.preview(filters)).await
    });

    match result {
        Ok(preview) => {
            let verdict = match config.target_range() {
                Ok(target) => match target.direction(preview.count) {
                    None => format!("inside target {}..={}", target.min(), target.max()),
                    Some(direction) => format!(
                        "outside target {}..={} ({} needed)",
                        target.min(),
                        target.max(),
                        direction.as_str()
                    ),
                },
                Err(error) => error.to_string(),
            };
            CommandResult::success(COMMAND, format!("{} leads match; {verdict}", preview.count))
        }
        Err(error) => {
            CommandResult::failure(COMMAND, error.error_class(), error.to_string(), EXIT_SERVICE)
        }
    }
}
