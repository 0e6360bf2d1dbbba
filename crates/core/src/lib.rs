pub mod config;
pub mod cost;
pub mod errors;
pub mod filters;
pub mod refinement;
pub mod search;

pub use config::{
    AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat, ValidationScope,
};
pub use cost::CostEstimate;
pub use errors::{ApplicationError, FilterError, Service, ServiceError};
pub use filters::{
    FilterCategory, FilterModel, Location, LocationFilter, NumericRange, TermFilter, TermSet,
};
pub use refinement::{
    Direction, EnrichmentOutcome, EnrichmentPlan, IterationRecord, LeadPipeline, LoopPhase,
    LoopSettings, LoopState, PipelineReport, PipelineRequest, RefinementLoop, RetryPolicy,
    StatusPolling, TargetRange, TerminationReason, TerminationSummary,
};
pub use search::{
    AiEnrichment, Enrichment, EnrichmentJob, EnrichmentOptions, EnrichmentRequest,
    EnrichmentStatus, EnrichmentTarget, LeadSearch, PreviewResult, RefinementAdvisor,
    RefinementContext, RefinementSuggestion,
};
