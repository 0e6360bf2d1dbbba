//! Capability traits for the external collaborators and their wire types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ServiceError;
use crate::filters::FilterModel;
use crate::refinement::states::{Direction, TargetRange};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewResult {
    #[serde(default)]
    pub count: u64,
}

/// Everything the advisor sees for one out-of-range iteration.
#[derive(Clone, Debug)]
pub struct RefinementContext<'a> {
    pub goal: &'a str,
    pub filters: &'a FilterModel,
    pub count: u64,
    pub target: TargetRange,
    pub direction: Direction,
    pub iteration: u32,
    pub max_iterations: u32,
    pub history: &'a [u64],
}

#[derive(Clone, Debug, PartialEq)]
pub struct RefinementSuggestion {
    pub modified_filters: FilterModel,
    pub change_description: String,
    /// Advisory only; never used to skip a preview.
    pub estimated_new_count: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiEnrichment {
    pub model_version: String,
    pub prompt: String,
    pub output_column: String,
    #[serde(default)]
    pub input_columns: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentOptions {
    #[serde(default)]
    pub work_email_enrichment: bool,
    #[serde(default)]
    pub email_verification: bool,
    #[serde(default)]
    pub fully_enriched_profile: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub technologies: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub news: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub funding: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_enrichment: Option<AiEnrichment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_flow: Vec<String>,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self {
            work_email_enrichment: true,
            email_verification: true,
            fully_enriched_profile: true,
            technologies: false,
            news: false,
            funding: false,
            ai_enrichment: None,
            custom_flow: vec!["instantly".to_string()],
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Where enriched leads land: a freshly created list, or an existing
/// list/campaign.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnrichmentTarget {
    NewList(String),
    ExistingResource(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnrichmentRequest {
    pub search_filters: FilterModel,
    pub limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment_payload: Option<EnrichmentOptions>,
}

impl EnrichmentRequest {
    pub fn new(
        search_filters: FilterModel,
        limit: u64,
        target: EnrichmentTarget,
        options: Option<EnrichmentOptions>,
    ) -> Self {
        let (list_name, resource_id) = match target {
            EnrichmentTarget::NewList(name) => (Some(name), None),
            EnrichmentTarget::ExistingResource(id) => (None, Some(id)),
        };
        Self { search_filters, limit, list_name, resource_id, enrichment_payload: options }
    }
}

/// Handle returned by the enrichment endpoint. Unknown fields are kept.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentJob {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub list_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentStatus {
    #[serde(default)]
    pub in_progress: bool,
    #[serde(default)]
    pub has_no_leads: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<Value>,
}

#[async_trait]
pub trait LeadSearch: Send + Sync {
    /// Free, read-only count query. Safe to retry.
    async fn preview(&self, filters: &FilterModel) -> Result<PreviewResult, ServiceError>;
}

#[async_trait]
pub trait Enrichment: Send + Sync {
    /// Billable and non-idempotent: every call creates a new job.
    async fn enrich(&self, request: &EnrichmentRequest) -> Result<EnrichmentJob, ServiceError>;
    async fn status(&self, resource_id: &str) -> Result<EnrichmentStatus, ServiceError>;
}

#[async_trait]
pub trait RefinementAdvisor: Send + Sync {
    async fn seed(&self, goal: &str) -> Result<FilterModel, ServiceError>;
    async fn refine(
        &self,
        context: &RefinementContext<'_>,
    ) -> Result<RefinementSuggestion, ServiceError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{EnrichmentJob, EnrichmentOptions, EnrichmentRequest, EnrichmentTarget};
    use crate::filters::{FilterModel, TermSet};

    #[test]
    fn new_list_request_serializes_without_resource_id() {
        let filters = FilterModel {
            management_levels: Some(TermSet::new(["c_level"])),
            ..FilterModel::default()
        };
        let request = EnrichmentRequest::new(
            filters,
            250,
            EnrichmentTarget::NewList("CO CEOs".to_string()),
            Some(EnrichmentOptions::default()),
        );

        let value = serde_json::to_value(&request).expect("request serializes");
        assert_eq!(
            value,
            json!({
                "search_filters": {"management_levels": ["c_level"]},
                "limit": 250,
                "list_name": "CO CEOs",
                "enrichment_payload": {
                    "work_email_enrichment": true,
                    "email_verification": true,
                    "fully_enriched_profile": true,
                    "custom_flow": ["instantly"]
                }
            })
        );
    }

    #[test]
    fn existing_resource_request_omits_list_name() {
        let request = EnrichmentRequest::new(
            FilterModel::default(),
            10,
            EnrichmentTarget::ExistingResource("list-42".to_string()),
            None,
        );

        let value = serde_json::to_value(&request).expect("request serializes");
        assert_eq!(value["resource_id"], "list-42");
        assert!(value.get("list_name").is_none());
        assert!(value.get("enrichment_payload").is_none());
    }

    #[test]
    fn job_keeps_unknown_fields() {
        let job: EnrichmentJob = serde_json::from_value(json!({
            "id": "job-1",
            "resource_id": "res-1",
            "organization_id": "org-1",
            "list_name": "CO CEOs",
            "limit": 250
        }))
        .expect("job decodes");

        assert_eq!(job.resource_id.as_deref(), Some("res-1"));
        assert_eq!(job.extra.get("limit"), Some(&json!(250)));
    }
}
