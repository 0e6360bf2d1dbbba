//! Goal in, report out: seed → refinement loop → at most one enrichment.

use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cost::CostEstimate;
use crate::errors::{Service, ServiceError};
use crate::filters::FilterModel;
use crate::refinement::engine::{LoopSettings, RefinementLoop};
use crate::refinement::retry::RetryPolicy;
use crate::refinement::states::{
    IterationRecord, LoopPhase, LoopState, TargetRange, TerminationReason, TerminationSummary,
};
use crate::search::{
    Enrichment, EnrichmentJob, EnrichmentOptions, EnrichmentRequest, EnrichmentStatus,
    EnrichmentTarget, LeadSearch, RefinementAdvisor,
};

const LIST_NAME_GOAL_CHARS: usize = 40;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusPolling {
    pub interval: Duration,
    pub max_polls: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnrichmentPlan {
    pub requested_limit: u64,
    pub list_name: Option<String>,
    pub resource_id: Option<String>,
    pub options: EnrichmentOptions,
    pub polling: Option<StatusPolling>,
}

impl Default for EnrichmentPlan {
    fn default() -> Self {
        Self {
            requested_limit: 1_000,
            list_name: None,
            resource_id: None,
            options: EnrichmentOptions::default(),
            polling: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineRequest {
    pub goal: String,
    pub target: TargetRange,
    pub auto_enrich: bool,
    pub initial_filters: Option<FilterModel>,
    pub enrichment: EnrichmentPlan,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EnrichmentOutcome {
    NotRequested,
    Skipped { reason: String },
    Started { limit: u64, job: EnrichmentJob, status: Option<EnrichmentStatus> },
    Failed { limit: u64, error_class: String, message: String },
    /// Accepted upstream but the reply was unreadable. The list may exist, so
    /// check `list_name`/`resource_id` before submitting again.
    SubmittedUnconfirmed {
        limit: u64,
        list_name: Option<String>,
        resource_id: Option<String>,
        message: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub goal: String,
    pub phase: LoopPhase,
    pub termination: Option<TerminationSummary>,
    pub exhausted_warning: bool,
    pub final_filters: FilterModel,
    pub final_count: Option<u64>,
    pub iterations: u32,
    pub target: TargetRange,
    pub history: Vec<IterationRecord>,
    pub cost_estimate: Option<CostEstimate>,
    pub enrichment: EnrichmentOutcome,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.phase.allows_enrichment() && !matches!(self.enrichment, EnrichmentOutcome::Failed { .. })
    }
}

pub struct LeadPipeline<S, A, E> {
    refinement: RefinementLoop<S, A>,
    enrichment: E,
}

impl<S, A, E> LeadPipeline<S, A, E>
where
    S: LeadSearch,
    A: RefinementAdvisor,
    E: Enrichment,
{
    pub fn new(search: S, advisor: A, enrichment: E, settings: LoopSettings) -> Self {
        Self { refinement: RefinementLoop::new(search, advisor, settings), enrichment }
    }

    pub fn refinement(&self) -> &RefinementLoop<S, A> {
        &self.refinement
    }

    pub fn enrichment(&self) -> &E {
        &self.enrichment
    }

    pub async fn run(&self, request: PipelineRequest, cancel: &CancellationToken) -> PipelineReport {
        let run_id = Uuid::new_v4();
        info!(
            event_name = "pipeline.run.started",
            run_id = %run_id,
            target_min = request.target.min(),
            target_max = request.target.max(),
            auto_enrich = request.auto_enrich,
            seeded = request.initial_filters.is_some(),
            "starting lead refinement run"
        );

        let state = match self.initial_filters(&request, cancel).await {
            Ok(initial) => self.refinement.run(&request.goal, initial, request.target, cancel).await,
            Err(reason) => {
                let mut state = self.refinement.start(FilterModel::default(), request.target);
                state.abort(reason);
                state
            }
        };

        let enrichment = if !request.auto_enrich {
            EnrichmentOutcome::NotRequested
        } else if !state.phase.allows_enrichment() {
            EnrichmentOutcome::Skipped { reason: "refinement did not complete".to_string() }
        } else if cancel.is_cancelled() {
            EnrichmentOutcome::Skipped { reason: "run cancelled before enrichment".to_string() }
        } else {
            self.enrich_once(&state, &request).await
        };

        let report = build_report(run_id, request, state, enrichment);
        info!(
            event_name = "pipeline.run.finished",
            run_id = %report.run_id,
            phase = ?report.phase,
            iterations = report.iterations,
            final_count = ?report.final_count,
            exhausted_warning = report.exhausted_warning,
            "lead refinement run finished"
        );
        report
    }

    async fn initial_filters(
        &self,
        request: &PipelineRequest,
        cancel: &CancellationToken,
    ) -> Result<FilterModel, TerminationReason> {
        if cancel.is_cancelled() {
            return Err(TerminationReason::Cancelled);
        }
        if let Some(filters) = &request.initial_filters {
            return filters.validate().map(|()| filters.clone()).map_err(|error| {
                TerminationReason::Failed(ServiceError::MalformedFilter {
                    filters: Box::new(filters.clone()),
                    message: error.to_string(),
                })
            });
        }

        let advisor = self.refinement.advisor();
        let goal = request.goal.as_str();
        let seeded = self.refinement.settings().retry.run(Service::Advisor, move || advisor.seed(goal)).await;
        match seeded.and_then(|filters| {
            filters.validate().map(|()| filters).map_err(|error| {
                ServiceError::UnparseableSuggestion { message: error.to_string() }
            })
        }) {
            Ok(filters) => {
                info!(
                    event_name = "pipeline.seed.generated",
                    categories = ?filters.active_categories(),
                    "initial filters generated from goal"
                );
                Ok(filters)
            }
            Err(error) => {
                warn!(
                    event_name = "pipeline.seed.failed",
                    error_class = error.error_class(),
                    error = %error,
                    "could not derive initial filters from goal"
                );
                Err(TerminationReason::Failed(error))
            }
        }
    }

    /// Submits the final filters once. Never retried: the call is billable
    /// and creates a new list each time.
    async fn enrich_once(&self, state: &LoopState, request: &PipelineRequest) -> EnrichmentOutcome {
        let Some(count) = state.last_count() else {
            return EnrichmentOutcome::Skipped { reason: "no preview count recorded".to_string() };
        };
        let limit = request.enrichment.requested_limit.min(count);
        if limit == 0 {
            return EnrichmentOutcome::Skipped {
                reason: "final preview reported no leads".to_string(),
            };
        }

        let target = match &request.enrichment.resource_id {
            Some(resource_id) => EnrichmentTarget::ExistingResource(resource_id.clone()),
            None => EnrichmentTarget::NewList(
                request
                    .enrichment
                    .list_name
                    .clone()
                    .unwrap_or_else(|| default_list_name(&request.goal, count)),
            ),
        };
        let enrichment_request = EnrichmentRequest::new(
            state.filters.clone(),
            limit,
            target,
            Some(request.enrichment.options.clone()),
        );

        info!(event_name = "pipeline.enrichment.submitting", limit, count, "submitting enrichment");
        let job = match self.enrichment.enrich(&enrichment_request).await {
            Ok(job) => job,
            Err(error @ ServiceError::EnrichmentUnconfirmed { .. }) => {
                warn!(
                    event_name = "pipeline.enrichment.unconfirmed",
                    list_name = enrichment_request.list_name.as_deref().unwrap_or(""),
                    resource_id = enrichment_request.resource_id.as_deref().unwrap_or(""),
                    error = %error,
                    "enrichment accepted but response unreadable; verify before resubmitting"
                );
                return EnrichmentOutcome::SubmittedUnconfirmed {
                    limit,
                    list_name: enrichment_request.list_name,
                    resource_id: enrichment_request.resource_id,
                    message: error.to_string(),
                };
            }
            Err(error) => {
                warn!(
                    event_name = "pipeline.enrichment.failed",
                    error_class = error.error_class(),
                    error = %error,
                    "enrichment submission failed; not retrying"
                );
                return EnrichmentOutcome::Failed {
                    limit,
                    error_class: error.error_class().to_string(),
                    message: error.to_string(),
                };
            }
        };
        info!(
            event_name = "pipeline.enrichment.started",
            job_id = job.id.as_deref().unwrap_or("unknown"),
            resource_id = job.resource_id.as_deref().unwrap_or("unknown"),
            "enrichment job started"
        );

        let status = match (&job.resource_id, request.enrichment.polling) {
            (Some(resource_id), Some(polling)) => {
                match self.poll_until_settled(resource_id, polling).await {
                    Ok(status) => Some(status),
                    Err(error) => {
                        warn!(
                            event_name = "pipeline.enrichment.status_failed",
                            resource_id = %resource_id,
                            error = %error,
                            "could not fetch enrichment status"
                        );
                        None
                    }
                }
            }
            _ => None,
        };

        EnrichmentOutcome::Started { limit, job, status }
    }

    /// Polls the status endpoint until the job stops reporting
    /// `in_progress` or `max_polls` is reached; returns the last status seen.
    pub async fn poll_until_settled(
        &self,
        resource_id: &str,
        polling: StatusPolling,
    ) -> Result<EnrichmentStatus, ServiceError> {
        poll_status(&self.enrichment, resource_id, polling, self.refinement.settings().retry).await
    }
}

pub async fn poll_status<E: Enrichment + ?Sized>(
    enrichment: &E,
    resource_id: &str,
    polling: StatusPolling,
    retry: RetryPolicy,
) -> Result<EnrichmentStatus, ServiceError> {
    let max_polls = polling.max_polls.max(1);
    let mut poll = 1;
    loop {
        let status = retry.run(Service::Status, move || enrichment.status(resource_id)).await?;
        info!(
            event_name = "pipeline.enrichment.status",
            resource_id,
            poll,
            in_progress = status.in_progress,
            has_no_leads = status.has_no_leads,
            "enrichment status polled"
        );
        if !status.in_progress || poll >= max_polls {
            return Ok(status);
        }
        if !polling.interval.is_zero() {
            tokio::time::sleep(polling.interval).await;
        }
        poll += 1;
    }
}

pub fn default_list_name(goal: &str, count: u64) -> String {
    let first_line = goal.lines().map(str::trim).find(|line| !line.is_empty()).unwrap_or("Leads");
    let mut prefix = first_line.chars().take(LIST_NAME_GOAL_CHARS).collect::<String>();
    if first_line.chars().count() > LIST_NAME_GOAL_CHARS {
        prefix = prefix.trim_end().to_string();
        prefix.push_str("...");
    }
    format!("{prefix} - Refined {count} leads")
}

fn build_report(
    run_id: Uuid,
    request: PipelineRequest,
    state: LoopState,
    enrichment: EnrichmentOutcome,
) -> PipelineReport {
    let final_count = state.last_count();
    let cost_estimate = final_count
        .filter(|_| state.phase.allows_enrichment())
        .map(|count| CostEstimate::for_leads(count.min(request.enrichment.requested_limit)));

    PipelineReport {
        run_id,
        goal: request.goal,
        phase: state.phase,
        termination: state.termination.as_ref().map(TerminationSummary::from),
        exhausted_warning: state.exhausted_warning(),
        iterations: state.iterations_completed(),
        final_count,
        target: state.target,
        cost_estimate,
        final_filters: state.filters,
        history: state.history,
        enrichment,
    }
}
