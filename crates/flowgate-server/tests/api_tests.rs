use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use flowgate_core::{FlowGateway, GatewayConfig, ManualClock};
use flowgate_server::{api, FlowgateServer, ServerConfig};
use flowgate_upstream::{RawResponse, UpstreamClient, UpstreamFailure, UpstreamResult};

// Upstream that answers every call of a kind the same way
struct FixedUpstream {
    listing: UpstreamResult<RawResponse>,
    run: UpstreamResult<RawResponse>,
    get_calls: AtomicUsize,
    post_calls: AtomicUsize,
}

impl FixedUpstream {
    fn healthy() -> Self {
        Self::new(
            Ok(json_response(json!([
                {"id": "f1", "name": "Demo", "description": "d", "tags": ["x"], "is_component": false, "mcp_enabled": true},
                {"id": "f2", "name": "Second"},
                {"id": "f3", "name": "Third"},
                {"id": "f4", "name": "Fourth"}
            ]))),
            Ok(json_response(json!({"outputs": [{"text": "hi there"}]}))),
        )
    }

    fn new(listing: UpstreamResult<RawResponse>, run: UpstreamResult<RawResponse>) -> Self {
        Self {
            listing,
            run,
            get_calls: AtomicUsize::new(0),
            post_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl UpstreamClient for FixedUpstream {
    async fn get(&self, _path: &str, _query: &[(&str, &str)]) -> UpstreamResult<RawResponse> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.listing.clone()
    }

    async fn post(&self, _path: &str, _body: &Value) -> UpstreamResult<RawResponse> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        self.run.clone()
    }
}

fn json_response(body: Value) -> RawResponse {
    RawResponse { status: 200, body: body.to_string() }
}

fn router_with(upstream: Arc<FixedUpstream>) -> Router {
    let gateway = FlowGateway::with_client(GatewayConfig::default(), upstream, Arc::new(ManualClock::new()));
    api::build_router(Arc::new(gateway))
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_root() {
    let (status, body) = send(router_with(Arc::new(FixedUpstream::healthy())), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Flow Gateway API"}));
}

#[tokio::test]
async fn test_list_flows() {
    let (status, body) = send(router_with(Arc::new(FixedUpstream::healthy())), get("/flows")).await;

    assert_eq!(status, StatusCode::OK);
    let flows = body["flows"].as_array().unwrap();
    assert_eq!(flows.len(), 4);
    assert_eq!(
        flows[0],
        json!({"id": "f1", "name": "Demo", "description": "d", "tags": ["x"], "is_component": false, "mcp_enabled": true})
    );
}

#[tokio::test]
async fn test_list_flows_unreachable_upstream() {
    let upstream = Arc::new(FixedUpstream::new(
        Err(UpstreamFailure::connection("connection refused")),
        Err(UpstreamFailure::connection("connection refused")),
    ));
    let (status, body) = send(router_with(upstream.clone()), get("/flows")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_UPSTREAM_UNAVAILABLE");
    assert_eq!(body["error"], body["errorDetails"]["errorMessage"]);
    assert_eq!(upstream.get_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_list_flows_upstream_failure_is_bad_gateway() {
    let upstream = Arc::new(FixedUpstream::new(
        Err(UpstreamFailure::http(500, "stack trace")),
        Err(UpstreamFailure::http(500, "stack trace")),
    ));
    let (status, body) = send(router_with(upstream), get("/flows")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_UPSTREAM_FAILURE");
    assert_eq!(body["error"], "Flow service encountered an internal error");
}

#[tokio::test]
async fn test_execute_flow() {
    let upstream = Arc::new(FixedUpstream::healthy());
    let (status, body) = send(
        router_with(upstream.clone()),
        post_json("/flows/f1/execute", json!({"input_value": "hello", "tweaks": {}})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"success": true, "result": {"outputs": [{"text": "hi there"}]}, "error": null})
    );
    assert_eq!(upstream.post_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_execute_flow_rejection_is_a_result_not_a_status() {
    let upstream = Arc::new(FixedUpstream::new(
        Ok(json_response(json!([]))),
        Err(UpstreamFailure::http(422, "tweaks are invalid")),
    ));
    let (status, body) = send(
        router_with(upstream.clone()),
        post_json("/flows/f1/execute", json!({"input_value": "hello"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["result"], Value::Null);
    assert_eq!(body["error_kind"], "client_rejected");
    assert_eq!(body["error"], "Flow service rejected the request (422): tweaks are invalid");
    assert_eq!(upstream.post_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_execute_flow_with_empty_input_never_calls_upstream() {
    let upstream = Arc::new(FixedUpstream::healthy());
    let (status, body) = send(
        router_with(upstream.clone()),
        post_json("/flows/f1/execute", json!({"input_value": ""})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error_kind"], "validation_error");
    assert_eq!(upstream.post_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_execute_flow_without_input_is_unprocessable() {
    let upstream = Arc::new(FixedUpstream::healthy());
    let response = router_with(upstream.clone())
        .oneshot(post_json("/flows/f1/execute", json!({"tweaks": {}})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(upstream.post_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalidate_cache() {
    let upstream = Arc::new(FixedUpstream::healthy());
    let router = router_with(upstream.clone());

    send(router.clone(), get("/flows")).await;
    send(router.clone(), get("/flows")).await;
    assert_eq!(upstream.get_calls.load(Ordering::SeqCst), 1);

    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/flows/cache")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(router.clone(), request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    send(router, get("/flows")).await;
    assert_eq!(upstream.get_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_health_up() {
    let (status, body) = send(router_with(Arc::new(FixedUpstream::healthy())), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "UP");
    assert_eq!(body["flowsCount"], 4);
    assert_eq!(
        body["sampleFlows"],
        json!([
            {"id": "f1", "name": "Demo"},
            {"id": "f2", "name": "Second"},
            {"id": "f3", "name": "Third"}
        ])
    );
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_health_down() {
    let upstream = Arc::new(FixedUpstream::new(
        Err(UpstreamFailure::timeout("operation timed out")),
        Err(UpstreamFailure::timeout("operation timed out")),
    ));
    let (status, body) = send(router_with(upstream), get("/health")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "DOWN");
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_UPSTREAM_TIMEOUT");
}

#[tokio::test]
async fn test_cors_allows_configured_origin_only() {
    let gateway = FlowGateway::with_client(
        GatewayConfig::default(),
        Arc::new(FixedUpstream::healthy()),
        Arc::new(ManualClock::new()),
    );
    let server = FlowgateServer::with_gateway(ServerConfig::default(), Arc::new(gateway));
    let app = server.app().unwrap();

    let preflight = |origin: &str| {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/flows")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap()
    };

    let allowed = app.clone().oneshot(preflight("http://localhost:3000")).await.unwrap();
    assert_eq!(
        allowed.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:3000"
    );
    assert_eq!(
        allowed.headers().get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );

    let denied = app.oneshot(preflight("http://evil.test")).await.unwrap();
    assert!(denied.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn test_cors_wildcard_allows_any_origin_without_credentials() {
    let gateway = FlowGateway::with_client(
        GatewayConfig::default(),
        Arc::new(FixedUpstream::healthy()),
        Arc::new(ManualClock::new()),
    );
    let config = ServerConfig {
        cors_allowed_origins: vec!["*".to_string()],
        ..ServerConfig::default()
    };
    let app = FlowgateServer::with_gateway(config, Arc::new(gateway)).app().unwrap();

    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/flows")
        .header(header::ORIGIN, "http://anywhere.test")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(preflight).await.unwrap();

    assert_eq!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());
}

#[test]
fn test_invalid_cors_origin_is_rejected() {
    let origins = vec!["http://ok.test".to_string(), "bad\norigin".to_string()];
    assert!(flowgate_server::server::cors_layer(&origins).is_err());
}
