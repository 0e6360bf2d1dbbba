use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::{FilterError, ServiceError};
use crate::filters::{FilterCategory, FilterModel};

/// Inclusive lead-count window the loop is trying to land in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TargetRange {
    min: u64,
    max: u64,
}

impl TargetRange {
    pub fn new(min: u64, max: u64) -> Result<Self, FilterError> {
        if min > max {
            return Err(FilterError::InvalidTargetRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn contains(&self, count: u64) -> bool {
        self.min <= count && count <= self.max
    }

    /// `None` when the count is already in range.
    pub fn direction(&self, count: u64) -> Option<Direction> {
        if count < self.min {
            Some(Direction::Broaden)
        } else if count > self.max {
            Some(Direction::Narrow)
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Broaden,
    Narrow,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Broaden => "broaden",
            Self::Narrow => "narrow",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Init,
    Iterating,
    Converged,
    Exhausted,
    Aborted,
}

impl LoopPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Converged | Self::Exhausted | Self::Aborted)
    }

    pub fn allows_enrichment(&self) -> bool {
        matches!(self, Self::Converged | Self::Exhausted)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TerminationReason {
    Converged { count: u64 },
    IterationBudgetExhausted { count: u64 },
    Failed(ServiceError),
    Cancelled,
}

impl TerminationReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Converged { .. } => "converged",
            Self::IterationBudgetExhausted { .. } => "iteration_budget_exhausted",
            Self::Failed(error) => error.error_class(),
            Self::Cancelled => "cancelled",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Converged { count } => format!("lead count {count} is inside the target range"),
            Self::IterationBudgetExhausted { count } => {
                format!("iteration budget spent with lead count {count} still out of range")
            }
            Self::Failed(error) => error.to_string(),
            Self::Cancelled => "run cancelled by caller".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TerminationSummary {
    pub code: String,
    pub message: String,
}

impl From<&TerminationReason> for TerminationSummary {
    fn from(reason: &TerminationReason) -> Self {
        Self { code: reason.code().to_string(), message: reason.describe() }
    }
}

/// One preview observation plus what the advisor did with it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub count: u64,
    pub direction: Option<Direction>,
    pub change_description: Option<String>,
    pub estimated_new_count: Option<u64>,
    pub suggestion_applied: bool,
    pub changed_categories: Vec<FilterCategory>,
    pub recorded_at: DateTime<Utc>,
}

impl IterationRecord {
    pub fn observed(iteration: u32, count: u64, direction: Option<Direction>) -> Self {
        Self {
            iteration,
            count,
            direction,
            change_description: None,
            estimated_new_count: None,
            suggestion_applied: false,
            changed_categories: Vec::new(),
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoopState {
    pub phase: LoopPhase,
    pub filters: FilterModel,
    pub iteration: u32,
    pub history: Vec<IterationRecord>,
    pub target: TargetRange,
    pub max_iterations: u32,
    pub termination: Option<TerminationReason>,
}

impl LoopState {
    pub fn new(initial: FilterModel, target: TargetRange, max_iterations: u32) -> Self {
        Self {
            phase: LoopPhase::Init,
            filters: initial,
            iteration: 1,
            history: Vec::new(),
            target,
            max_iterations: max_iterations.max(1),
            termination: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn counts(&self) -> Vec<u64> {
        self.history.iter().map(|record| record.count).collect()
    }

    pub fn last_count(&self) -> Option<u64> {
        self.history.last().map(|record| record.count)
    }

    pub fn iterations_completed(&self) -> u32 {
        self.history.len() as u32
    }

    /// Set when the run ended on the iteration budget with an out-of-range
    /// count; the result is still usable.
    pub fn exhausted_warning(&self) -> bool {
        self.phase == LoopPhase::Exhausted
    }

    pub(crate) fn terminate(&mut self, phase: LoopPhase, reason: TerminationReason) {
        self.phase = phase;
        self.termination = Some(reason);
    }

    pub(crate) fn abort(&mut self, reason: TerminationReason) {
        self.terminate(LoopPhase::Aborted, reason);
    }
}
