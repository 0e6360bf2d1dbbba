pub mod engine;
pub mod pipeline;
pub mod retry;
pub mod states;

pub use engine::{LoopSettings, RefinementLoop, DEFAULT_MAX_ITERATIONS};
pub use pipeline::{
    default_list_name, poll_status, EnrichmentOutcome, EnrichmentPlan, LeadPipeline,
    PipelineReport, PipelineRequest, StatusPolling,
};
pub use retry::RetryPolicy;
pub use states::{
    Direction, IterationRecord, LoopPhase, LoopState, TargetRange, TerminationReason,
    TerminationSummary,
};
