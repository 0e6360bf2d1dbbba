use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::{Service, ServiceError};
use crate::filters::FilterModel;
use crate::refinement::retry::RetryPolicy;
use crate::refinement::states::{
    IterationRecord, LoopPhase, LoopState, TargetRange, TerminationReason,
};
use crate::search::{LeadSearch, RefinementAdvisor, RefinementContext};

pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopSettings {
    pub max_iterations: u32,
    pub retry: RetryPolicy,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self { max_iterations: DEFAULT_MAX_ITERATIONS, retry: RetryPolicy::default() }
    }
}

/// Preview → advise → replace, bounded by `max_iterations`.
pub struct RefinementLoop<S, A> {
    search: S,
    advisor: A,
    settings: LoopSettings,
}

impl<S, A> RefinementLoop<S, A>
where
    S: LeadSearch,
    A: RefinementAdvisor,
{
    pub fn new(search: S, advisor: A, settings: LoopSettings) -> Self {
        Self { search, advisor, settings }
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn search(&self) -> &S {
        &self.search
    }

    pub fn advisor(&self) -> &A {
        &self.advisor
    }

    pub fn start(&self, initial: FilterModel, target: TargetRange) -> LoopState {
        LoopState::new(initial, target, self.settings.max_iterations)
    }

    /// Drives [`Self::step`] until the state is terminal. Cancellation is only
    /// observed between iterations.
    pub async fn run(
        &self,
        goal: &str,
        initial: FilterModel,
        target: TargetRange,
        cancel: &CancellationToken,
    ) -> LoopState {
        let mut state = self.start(initial, target);
        while !state.is_terminal() {
            if cancel.is_cancelled() {
                info!(
                    event_name = "refinement.loop.cancelled",
                    iteration = state.iteration,
                    "refinement cancelled between iterations"
                );
                state.abort(TerminationReason::Cancelled);
                break;
            }
            state = self.step(goal, state).await;
        }
        state
    }

    /// Runs one full iteration. The returned state either carries the new
    /// history entry and filter replacement together, or is terminal.
    pub async fn step(&self, goal: &str, mut state: LoopState) -> LoopState {
        if state.is_terminal() {
            return state;
        }
        state.phase = LoopPhase::Iterating;
        let iteration = state.iteration;

        let preview = {
            let search = &self.search;
            let filters = &state.filters;
            self.settings.retry.run(Service::Preview, move || search.preview(filters)).await
        };
        let count = match preview {
            Ok(result) => result.count,
            Err(error) => {
                warn!(
                    event_name = "refinement.preview.failed",
                    iteration,
                    error_class = error.error_class(),
                    error = %error,
                    "preview failed; aborting refinement"
                );
                state.abort(TerminationReason::Failed(error));
                return state;
            }
        };

        let direction = state.target.direction(count);
        info!(
            event_name = "refinement.preview.completed",
            iteration,
            count,
            target_min = state.target.min(),
            target_max = state.target.max(),
            "preview count received"
        );

        let Some(direction) = direction else {
            state.history.push(IterationRecord::observed(iteration, count, None));
            state.terminate(LoopPhase::Converged, TerminationReason::Converged { count });
            info!(event_name = "refinement.loop.converged", iteration, count, "count in range");
            return state;
        };

        if iteration >= state.max_iterations {
            state.history.push(IterationRecord::observed(iteration, count, Some(direction)));
            state.terminate(
                LoopPhase::Exhausted,
                TerminationReason::IterationBudgetExhausted { count },
            );
            warn!(
                event_name = "refinement.loop.exhausted",
                iteration,
                count,
                "iteration budget spent; proceeding with out-of-range filters"
            );
            return state;
        }

        let mut history = state.counts();
        history.push(count);
        let advice = {
            let context = RefinementContext {
                goal,
                filters: &state.filters,
                count,
                target: state.target,
                direction,
                iteration,
                max_iterations: state.max_iterations,
                history: &history,
            };
            let advisor = &self.advisor;
            let context = &context;
            self.settings.retry.run(Service::Advisor, move || advisor.refine(context)).await
        };

        let mut record = IterationRecord::observed(iteration, count, Some(direction));
        let suggestion = advice.and_then(|suggestion| match suggestion.modified_filters.validate() {
            Ok(()) => Ok(suggestion),
            Err(error) => Err(ServiceError::UnparseableSuggestion { message: error.to_string() }),
        });

        match suggestion {
            Ok(suggestion) => {
                record.changed_categories =
                    state.filters.changed_categories(&suggestion.modified_filters);
                record.change_description = Some(suggestion.change_description);
                record.estimated_new_count = suggestion.estimated_new_count;
                record.suggestion_applied = true;
                info!(
                    event_name = "refinement.suggestion.applied",
                    iteration,
                    direction = direction.as_str(),
                    changed = ?record.changed_categories,
                    estimated_new_count = ?record.estimated_new_count,
                    "advisor suggestion replaces current filters"
                );
                state.history.push(record);
                state.filters = suggestion.modified_filters;
            }
            Err(error) if error.is_soft() => {
                warn!(
                    event_name = "refinement.suggestion.unparseable",
                    iteration,
                    error = %error,
                    "keeping previous filters for this iteration"
                );
                state.history.push(record);
            }
            Err(error) => {
                warn!(
                    event_name = "refinement.advisor.failed",
                    iteration,
                    error_class = error.error_class(),
                    error = %error,
                    "advisor failed; aborting refinement"
                );
                state.history.push(record);
                state.abort(TerminationReason::Failed(error));
                return state;
            }
        }

        state.iteration += 1;
        state
    }
}
