use thiserror::Error;

use crate::filters::{FilterCategory, FilterModel};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("{category} range is inverted: min {min} > max {max}")]
    InvalidRange { category: FilterCategory, min: u64, max: u64 },
    #[error("target range is inverted: min {min} > max {max}")]
    InvalidTargetRange { min: u64, max: u64 },
    #[error("filter document could not be decoded: {0}")]
    Decode(String),
}

/// Which external collaborator a [`ServiceError`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Service {
    Preview,
    Advisor,
    Enrichment,
    Status,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Advisor => "advisor",
            Self::Enrichment => "enrichment",
            Self::Status => "status",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ServiceError {
    #[error("{service} authentication failed: {message}")]
    Auth { service: Service, message: String },
    #[error("{service} rate limited: {message}")]
    RateLimited { service: Service, message: String },
    #[error("{service} call timed out: {message}")]
    Timeout { service: Service, message: String },
    #[error("search filters rejected by remote service: {message}")]
    MalformedFilter { filters: Box<FilterModel>, message: String },
    #[error("advisor output could not be parsed: {message}")]
    UnparseableSuggestion { message: String },
    #[error("enrichment request failed: {message}")]
    EnrichmentFailure { message: String },
    /// The enrich call returned success but its body could not be read; the
    /// job and its list may already exist.
    #[error("enrichment was accepted with status {status} but the response was unreadable: {message}")]
    EnrichmentUnconfirmed { status: u16, message: String },
    #[error("{service} returned status {status}: {message}")]
    Upstream { service: Service, status: u16, message: String },
    #[error("{service} transport failure: {message}")]
    Transport { service: Service, message: String },
}

impl ServiceError {
    /// Maps a non-success HTTP status to the error taxonomy.
    ///
    /// 400/422 on a preview call carries the offending filters so the caller
    /// can diagnose them; every enrichment failure collapses into
    /// `EnrichmentFailure` because that call is never retried.
    pub fn from_status(
        service: Service,
        status: u16,
        body: &str,
        filters: Option<&FilterModel>,
    ) -> Self {
        let message = truncate_body(body);
        if service == Service::Enrichment {
            return Self::EnrichmentFailure { message: format!("status {status}: {message}") };
        }

        match (status, filters) {
            (401 | 403, _) => Self::Auth { service, message },
            (429, _) => Self::RateLimited { service, message },
            (408 | 504, _) => Self::Timeout { service, message },
            (400 | 422, Some(filters)) if service == Service::Preview => {
                Self::MalformedFilter { filters: Box::new(filters.clone()), message }
            }
            _ => Self::Upstream { service, status, message },
        }
    }

    /// Connection-level failure before any status was received.
    pub fn from_transport(service: Service, timed_out: bool, message: String) -> Self {
        match (service, timed_out) {
            (Service::Enrichment, _) => Self::EnrichmentFailure { message },
            (_, true) => Self::Timeout { service, message },
            (_, false) => Self::Transport { service, message },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Timeout { .. })
    }

    pub fn is_soft(&self) -> bool {
        matches!(self, Self::UnparseableSuggestion { .. })
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout { .. } => "timeout",
            Self::MalformedFilter { .. } => "malformed_filter",
            Self::UnparseableSuggestion { .. } => "unparseable_suggestion",
            Self::EnrichmentFailure { .. } => "enrichment_failure",
            Self::EnrichmentUnconfirmed { .. } => "enrichment_unconfirmed",
            Self::Upstream { .. } => "upstream",
            Self::Transport { .. } => "transport",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ApplicationError {
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("invalid input: {0}")]
    Input(String),
}

impl ApplicationError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Filter(_) => "filter_validation",
            Self::Service(error) => error.error_class(),
            Self::Configuration(_) => "config_validation",
            Self::Input(_) => "invalid_input",
        }
    }
}

const MAX_BODY_CHARS: usize = 500;

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_BODY_CHARS {
        return trimmed.to_string();
    }
    let mut truncated = trimmed.chars().take(MAX_BODY_CHARS).collect::<String>();
    truncated.push_str("...");
    truncated
}
