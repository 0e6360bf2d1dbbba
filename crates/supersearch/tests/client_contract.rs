use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use leadloop_core::errors::{Service, ServiceError};
use leadloop_core::filters::{FilterModel, NumericRange, TermSet};
use leadloop_core::search::{
    Enrichment, EnrichmentOptions, EnrichmentRequest, EnrichmentTarget, LeadSearch,
};
use leadloop_supersearch::SuperSearchClient;
use serde_json::{json, Value};
use tokio::sync::Mutex;

#[derive(Clone, Debug)]
struct RecordedCall {
    route: &'static str,
    authorization: Option<String>,
    resource_id: Option<String>,
    body: Value,
}

#[derive(Default)]
struct StubInner {
    responses: HashMap<&'static str, VecDeque<(StatusCode, Value)>>,
    calls: Vec<RecordedCall>,
    delay: Option<Duration>,
}

#[derive(Clone, Default)]
struct StubState {
    inner: Arc<Mutex<StubInner>>,
}

impl StubState {
    async fn script(&self, route: &'static str, status: StatusCode, body: Value) {
        self.inner.lock().await.responses.entry(route).or_default().push_back((status, body));
    }

    async fn delay_responses(&self, delay: Duration) {
        self.inner.lock().await.delay = Some(delay);
    }

    async fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().await.calls.clone()
    }

    async fn respond(
        &self,
        route: &'static str,
        headers: &HeaderMap,
        resource_id: Option<String>,
        body: Value,
    ) -> (StatusCode, Json<Value>) {
        let (delay, response) = {
            let mut inner = self.inner.lock().await;
            inner.calls.push(RecordedCall {
                route,
                authorization: headers
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string),
                resource_id,
                body,
            });
            let response = inner
                .responses
                .get_mut(route)
                .and_then(VecDeque::pop_front)
                .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "unscripted"})));
            (inner.delay, response)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        (response.0, Json(response.1))
    }
}

async fn preview(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.respond("preview", &headers, None, body).await
}

async fn enrich(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.respond("enrich", &headers, None, body).await
}

async fn status(
    State(state): State<StubState>,
    Path(resource_id): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.respond("status", &headers, Some(resource_id), Value::Null).await
}

async fn spawn_stub(state: StubState) -> String {
    let router = Router::new()
        .route("/api/v2/supersearch-enrichment/preview-leads-from-supersearch", post(preview))
        .route("/api/v2/supersearch-enrichment/enrich-leads-from-supersearch", post(enrich))
        .route("/api/v2/supersearch-enrichment/{resource_id}", get(status))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("stub binds");
    let address = listener.local_addr().expect("stub has an address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{address}/api/v2")
}

fn client(base_url: &str, timeout: Duration) -> SuperSearchClient {
    SuperSearchClient::new(base_url, "ss-test-key".to_string().into(), timeout)
        .expect("client builds")
}

fn filters() -> FilterModel {
    FilterModel {
        management_levels: Some(TermSet::new(["c_level"])),
        company_size: Some(NumericRange::between(20, 150)),
        ..FilterModel::default()
    }
}

#[tokio::test]
async fn preview_posts_filters_with_bearer_auth() {
    let state = StubState::default();
    state.script("preview", StatusCode::OK, json!({"count": 1234, "took_ms": 80})).await;
    let base_url = spawn_stub(state.clone()).await;

    let result = client(&base_url, Duration::from_secs(5)).preview(&filters()).await;

    assert_eq!(result.map(|preview| preview.count), Ok(1_234));
    let calls = state.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].route, "preview");
    assert_eq!(calls[0].authorization.as_deref(), Some("Bearer ss-test-key"));
    assert_eq!(
        calls[0].body,
        json!({"search_filters": {"management_levels": ["c_level"], "company_size": {"min": 20, "max": 150}}})
    );
}

#[tokio::test]
async fn rejected_preview_maps_to_malformed_filter() {
    let state = StubState::default();
    state.script("preview", StatusCode::BAD_REQUEST, json!({"message": "unknown level"})).await;
    let base_url = spawn_stub(state.clone()).await;

    let error = client(&base_url, Duration::from_secs(5))
        .preview(&filters())
        .await
        .expect_err("preview rejected");

    match error {
        ServiceError::MalformedFilter { filters: offending, message } => {
            assert_eq!(*offending, filters());
            assert!(message.contains("unknown level"));
        }
        other => panic!("expected malformed filter, got {other:?}"),
    }
}

#[tokio::test]
async fn unauthorized_and_rate_limited_statuses_are_classified() {
    let state = StubState::default();
    state.script("preview", StatusCode::UNAUTHORIZED, json!({"message": "bad key"})).await;
    state.script("preview", StatusCode::TOO_MANY_REQUESTS, json!({"message": "slow"})).await;
    let base_url = spawn_stub(state.clone()).await;
    let client = client(&base_url, Duration::from_secs(5));

    let auth = client.preview(&filters()).await.expect_err("unauthorized");
    let limited = client.preview(&filters()).await.expect_err("rate limited");

    assert!(matches!(auth, ServiceError::Auth { service: Service::Preview, .. }));
    assert!(!auth.is_retryable());
    assert!(matches!(limited, ServiceError::RateLimited { .. }));
    assert!(limited.is_retryable());
}

#[tokio::test]
async fn slow_preview_times_out_as_retryable() {
    let state = StubState::default();
    state.script("preview", StatusCode::OK, json!({"count": 1})).await;
    state.delay_responses(Duration::from_millis(1_500)).await;
    let base_url = spawn_stub(state.clone()).await;

    let error = client(&base_url, Duration::from_millis(200))
        .preview(&filters())
        .await
        .expect_err("timed out");

    assert!(matches!(error, ServiceError::Timeout { service: Service::Preview, .. }));
    assert!(error.is_retryable());
}

#[tokio::test]
async fn enrich_submits_request_and_keeps_job_fields() {
    let state = StubState::default();
    state
        .script(
            "enrich",
            StatusCode::OK,
            json!({
                "id": "job-9",
                "resource_id": "list-9",
                "organization_id": "org-1",
                "list_name": "CO CEOs",
                "limit": 800
            }),
        )
        .await;
    let base_url = spawn_stub(state.clone()).await;
    let request = EnrichmentRequest::new(
        filters(),
        800,
        EnrichmentTarget::NewList("CO CEOs".to_string()),
        Some(EnrichmentOptions::default()),
    );

    let job = client(&base_url, Duration::from_secs(5)).enrich(&request).await.expect("job");

    assert_eq!(job.resource_id.as_deref(), Some("list-9"));
    assert_eq!(job.extra.get("limit"), Some(&json!(800)));
    let calls = state.calls().await;
    assert_eq!(calls[0].body["limit"], 800);
    assert_eq!(calls[0].body["list_name"], "CO CEOs");
    assert_eq!(calls[0].body["enrichment_payload"]["custom_flow"], json!(["instantly"]));
}

#[tokio::test]
async fn enrich_failures_are_not_retryable_and_sent_once() {
    let state = StubState::default();
    state.script("enrich", StatusCode::TOO_MANY_REQUESTS, json!({"message": "busy"})).await;
    let base_url = spawn_stub(state.clone()).await;
    let request =
        EnrichmentRequest::new(filters(), 10, EnrichmentTarget::NewList("x".to_string()), None);

    let error = client(&base_url, Duration::from_secs(5)).enrich(&request).await.expect_err("fails");

    assert!(matches!(error, ServiceError::EnrichmentFailure { .. }));
    assert!(!error.is_retryable());
    assert_eq!(state.calls().await.len(), 1);
}

#[tokio::test]
async fn unreadable_enrich_success_is_unconfirmed_not_failed() {
    let state = StubState::default();
    state.script("enrich", StatusCode::OK, json!("accepted")).await;
    let base_url = spawn_stub(state.clone()).await;
    let request =
        EnrichmentRequest::new(filters(), 10, EnrichmentTarget::NewList("x".to_string()), None);

    let error =
        client(&base_url, Duration::from_secs(5)).enrich(&request).await.expect_err("unreadable");

    assert!(matches!(error, ServiceError::EnrichmentUnconfirmed { status: 200, .. }));
    assert!(!error.is_retryable());
    assert_eq!(state.calls().await.len(), 1);
}

#[tokio::test]
async fn status_reads_resource_by_id() {
    let state = StubState::default();
    state
        .script(
            "status",
            StatusCode::OK,
            json!({"in_progress": true, "has_no_leads": false, "resource_type": 1}),
        )
        .await;
    let base_url = spawn_stub(state.clone()).await;

    let status = client(&base_url, Duration::from_secs(5)).status("list-9").await.expect("status");

    assert!(status.in_progress);
    assert!(!status.has_no_leads);
    assert_eq!(status.resource_type, Some(json!(1)));
    assert_eq!(state.calls().await[0].resource_id.as_deref(), Some("list-9"));
}
