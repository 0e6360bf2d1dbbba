use std::time::Duration;

use async_trait::async_trait;
use leadloop_core::config::SuperSearchConfig;
use leadloop_core::errors::{Service, ServiceError};
use leadloop_core::filters::FilterModel;
use leadloop_core::search::{
    Enrichment, EnrichmentJob, EnrichmentRequest, EnrichmentStatus, LeadSearch, PreviewResult,
};
use reqwest::{Response, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

const RESOURCE_ROOT: &str = "supersearch-enrichment";
const PREVIEW_PATH: &str = "preview-leads-from-supersearch";
const ENRICH_PATH: &str = "enrich-leads-from-supersearch";

#[derive(Serialize)]
struct PreviewBody<'a> {
    search_filters: &'a FilterModel,
}

/// HTTP client for the SuperSearch preview, enrichment and status endpoints.
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct SuperSearchClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl std::fmt::Debug for SuperSearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuperSearchClient").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

impl SuperSearchClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder().timeout(timeout).build().map_err(|error| {
            ServiceError::from_transport(Service::Preview, false, error.to_string())
        })?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, api_key, base_url })
    }

    pub fn from_config(config: &SuperSearchConfig) -> Result<Self, ServiceError> {
        Self::new(
            config.base_url.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, service: Service, segment: &str) -> Result<Url, ServiceError> {
        let mut url = Url::parse(&self.base_url).map_err(|error| {
            ServiceError::from_transport(service, false, format!("invalid base url: {error}"))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                ServiceError::from_transport(service, false, "base url cannot carry a path".to_string())
            })?
            .pop_if_empty()
            .push(RESOURCE_ROOT)
            .push(segment);
        Ok(url)
    }

    async fn send(
        &self,
        service: Service,
        builder: reqwest::RequestBuilder,
    ) -> Result<Response, ServiceError> {
        builder.bearer_auth(self.api_key.expose_secret()).send().await.map_err(|error| {
            ServiceError::from_transport(service, error.is_timeout(), error.to_string())
        })
    }

    async fn decode<T: DeserializeOwned>(
        service: Service,
        response: Response,
    ) -> Result<T, ServiceError> {
        let status = response.status().as_u16();
        response.json::<T>().await.map_err(|error| match service {
            Service::Enrichment => {
                ServiceError::EnrichmentUnconfirmed { status, message: error.to_string() }
            }
            _ if error.is_timeout() => {
                ServiceError::Timeout { service, message: error.to_string() }
            }
            _ => ServiceError::Upstream {
                service,
                status,
                message: format!("could not decode response: {error}"),
            },
        })
    }
}

#[async_trait]
impl LeadSearch for SuperSearchClient {
    async fn preview(&self, filters: &FilterModel) -> Result<PreviewResult, ServiceError> {
        let url = self.endpoint(Service::Preview, PREVIEW_PATH)?;
        debug!(
            event_name = "supersearch.preview.request",
            categories = ?filters.active_categories(),
            "requesting preview count"
        );

        let builder = self.client.post(url).json(&PreviewBody { search_filters: filters });
        let response = self.send(Service::Preview, builder).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                event_name = "supersearch.preview.rejected",
                status = status.as_u16(),
                "preview request rejected"
            );
            return Err(ServiceError::from_status(
                Service::Preview,
                status.as_u16(),
                &body,
                Some(filters),
            ));
        }

        let result: PreviewResult = Self::decode(Service::Preview, response).await?;
        debug!(event_name = "supersearch.preview.response", count = result.count, "preview count");
        Ok(result)
    }
}

#[async_trait]
impl Enrichment for SuperSearchClient {
    async fn enrich(&self, request: &EnrichmentRequest) -> Result<EnrichmentJob, ServiceError> {
        let url = self.endpoint(Service::Enrichment, ENRICH_PATH)?;
        info!(
            event_name = "supersearch.enrich.request",
            limit = request.limit,
            list_name = request.list_name.as_deref().unwrap_or(""),
            resource_id = request.resource_id.as_deref().unwrap_or(""),
            "submitting enrichment request"
        );

        let builder = self.client.post(url).json(request);
        let response = self.send(Service::Enrichment, builder).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(Service::Enrichment, status.as_u16(), &body, None));
        }

        Self::decode(Service::Enrichment, response).await
    }

    async fn status(&self, resource_id: &str) -> Result<EnrichmentStatus, ServiceError> {
        if resource_id.trim().is_empty() {
            return Err(ServiceError::Upstream {
                service: Service::Status,
                status: 0,
                message: "resource id is empty".to_string(),
            });
        }
        let url = self.endpoint(Service::Status, resource_id)?;

        let response = self.send(Service::Status, self.client.get(url)).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(Service::Status, status.as_u16(), &body, None));
        }

        Self::decode(Service::Status, response).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{SuperSearchClient, ENRICH_PATH, PREVIEW_PATH};
    use leadloop_core::errors::Service;

    fn client(base_url: &str) -> SuperSearchClient {
        SuperSearchClient::new(base_url, "key".to_string().into(), Duration::from_secs(1))
            .expect("client builds")
    }

    #[test]
    fn endpoints_are_joined_under_the_resource_root() {
        let client = client("https://api.instantly.ai/api/v2/");

        assert_eq!(
            client.endpoint(Service::Preview, PREVIEW_PATH).expect("url").as_str(),
            "https://api.instantly.ai/api/v2/supersearch-enrichment/preview-leads-from-supersearch"
        );
        assert_eq!(
            client.endpoint(Service::Enrichment, ENRICH_PATH).expect("url").as_str(),
            "https://api.instantly.ai/api/v2/supersearch-enrichment/enrich-leads-from-supersearch"
        );
    }

    #[test]
    fn resource_ids_are_path_encoded() {
        let client = client("http://localhost:9000");

        assert_eq!(
            client.endpoint(Service::Status, "list 1/2").expect("url").as_str(),
            "http://localhost:9000/supersearch-enrichment/list%201%2F2"
        );
    }

    #[test]
    fn debug_output_hides_api_key() {
        let client = SuperSearchClient::new(
            "http://localhost",
            "very-secret".to_string().into(),
            Duration::from_secs(1),
        )
        .expect("client builds");

        assert!(!format!("{client:?}").contains("very-secret"));
    }
}
