//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener and serve until shutdown
//! - Translate inspection verdicts into HTTP responses

use axum::{
    extract::{ConnectInfo, Path, Request, State},
    http::{HeaderName, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::http::request::{
    client_address, mark_generated_request_id, request_host, request_id, GeneratedRequestId,
    MakeRequestUuid, X_REQUEST_ID,
};
use crate::store::RuleStore;
use crate::waf::{InspectionRequest, Inspector, ProfileId, Verdict};

/// Body returned when a rule engine cannot be obtained.
const INTERNAL_ERROR_BODY: &str = "internal error";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub inspector: Arc<Inspector>,
    pub client_ip_headers: Arc<[HeaderName]>,
}

/// HTTP front of the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server backed by `store`.
    pub fn new(config: &GatewayConfig, store: Arc<dyn RuleStore>) -> Self {
        let inspector = Arc::new(Inspector::new(store, &config.store, &config.waf));
        let client_ip_headers = config
            .waf
            .client_ip_headers
            .iter()
            .filter_map(|h| HeaderName::from_bytes(h.as_bytes()).ok())
            .collect();

        let state = AppState {
            inspector,
            client_ip_headers,
        };
        let router = Self::build_router(config, state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/pre", any(pre_handler))
            .route("/remove", get(remove_default_handler))
            .route("/remove/{profile}", get(remove_handler))
            .route("/profiles", get(profiles_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(middleware::from_fn(mark_generated_request_id))
    }

    /// The configured router, without connection info.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn inspector(&self) -> &Arc<Inspector> {
        &self.state.inspector
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health_handler() -> &'static str {
    "OK"
}

/// Inspect the inbound request with the engine of its profile.
async fn pre_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let (parts, _) = request.into_parts();
    let request_id = request_id(&parts.headers).to_string();

    // Rules only see what the client sent.
    let mut headers = parts.headers;
    if parts.extensions.get::<GeneratedRequestId>().is_some() {
        headers.remove(&X_REQUEST_ID);
    }

    let profile = state.inspector.resolve_profile(&headers);
    let (client_addr, client_port) = client_address(&headers, &state.client_ip_headers, peer);
    let host = request_host(&headers, &parts.uri);

    tracing::debug!(
        request_id = %request_id,
        profile = %profile,
        client = %client_addr,
        host = %host,
        "Inspecting request"
    );

    let request = InspectionRequest {
        client_addr: &client_addr,
        client_port,
        host,
        headers: &headers,
    };

    match state.inspector.inspect(&profile, request).await {
        Ok(Verdict::Continue) => StatusCode::OK.into_response(),
        Ok(Verdict::Interrupt { status, body, rule_id }) => {
            tracing::debug!(request_id = %request_id, rule_id, status, "Transaction interrupted");
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::FORBIDDEN);
            (status, body).into_response()
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, profile = %profile, error = %e, "Inspection failed");
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY).into_response()
        }
    }
}

async fn remove_handler(State(state): State<AppState>, Path(profile): Path<String>) -> Response {
    let profile = ProfileId::new(profile)
        .unwrap_or_else(|| state.inspector.resolver().default_profile().clone());
    invalidate(&state, &profile)
}

async fn remove_default_handler(State(state): State<AppState>) -> Response {
    let profile = state.inspector.resolver().default_profile().clone();
    invalidate(&state, &profile)
}

fn invalidate(state: &AppState, profile: &ProfileId) -> Response {
    match state.inspector.invalidate_profile(profile) {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(e) => {
            tracing::error!(profile = %profile, error = %e, "Invalidation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY).into_response()
        }
    }
}

async fn profiles_handler(State(state): State<AppState>) -> Json<Vec<ProfileId>> {
    Json(state.inspector.cache().cached_profiles())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRuleStore;
    use axum::body::{to_bytes, Body};
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::Request;
    use tower::ServiceExt;

    const BLOCK_ATTACK: &str =
        r#"SecRule REQUEST_HEADERS:X-Attack "@streq 1" "id:1,phase:2,deny,status:403,msg:'attack blocked'""#;

    fn app(store: &MemoryRuleStore) -> Router {
        let mut config = GatewayConfig::default();
        config.store.key_prefix = "RULE".into();
        HttpServer::new(&config, Arc::new(store.clone()))
            .router()
            .layer(MockConnectInfo(SocketAddr::from(([192, 0, 2, 1], 55000))))
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(&MemoryRuleStore::new())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(body_text(response).await, "OK");
    }

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        let response = app(&MemoryRuleStore::new())
            .oneshot(
                Request::get("/health")
                    .header("x-request-id", "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "req-42");
    }

    #[tokio::test]
    async fn test_pre_continue_and_interrupt() {
        let store = MemoryRuleStore::new();
        store.insert("RULE:acme:1", BLOCK_ATTACK);
        let app = app(&store);

        let response = app
            .clone()
            .oneshot(
                Request::post("/pre")
                    .header("x-waf-profile", "acme")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "");

        let response = app
            .oneshot(
                Request::post("/pre")
                    .header("x-waf-profile", "acme")
                    .header("x-attack", "1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(response).await, "attack blocked");
    }

    #[tokio::test]
    async fn test_generated_request_id_is_never_evaluated() {
        let store = MemoryRuleStore::new();
        store.insert(
            "RULE:default:1",
            r#"SecRule REQUEST_HEADERS_NAMES "@streq x-request-id" "id:9,phase:2,deny,status:418""#,
        );
        let app = app(&store);

        let response = app
            .clone()
            .oneshot(Request::post("/pre").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        // A client-supplied id is request data like any other header.
        let response = app
            .oneshot(
                Request::post("/pre")
                    .header("x-request-id", "req-7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.headers()["x-request-id"], "req-7");
    }

    #[tokio::test]
    async fn test_pre_store_failure_is_500() {
        let store = MemoryRuleStore::new();
        store.set_scan_failure(true);
        let response = app(&store)
            .oneshot(Request::post("/pre").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, INTERNAL_ERROR_BODY);
    }

    #[tokio::test]
    async fn test_pre_compile_failure_is_500() {
        let store = MemoryRuleStore::new();
        store.insert("RULE:default:1", "SecBogus On");
        let response = app(&store)
            .oneshot(Request::post("/pre").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_forwarded_address_reaches_rules() {
        let store = MemoryRuleStore::new();
        store.insert(
            "RULE:default:1",
            r#"SecRule REMOTE_ADDR "@ipMatch 198.51.100.0/24" "id:7,phase:1,deny,status:401,msg:'banned'""#,
        );
        let app = app(&store);

        let response = app
            .clone()
            .oneshot(
                Request::post("/pre")
                    .header("x-forwarded-for", "198.51.100.20, 10.0.0.1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Peer address 192.0.2.1 is outside the banned range.
        let response = app
            .oneshot(Request::post("/pre").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_remove_and_profiles() {
        let store = MemoryRuleStore::new();
        let app = app(&store);

        for profile in ["acme", "globex"] {
            let response = app
                .clone()
                .oneshot(
                    Request::post("/pre")
                        .header("x-waf-profile", profile)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(Request::get("/profiles").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_text(response).await, r#"["acme","globex"]"#);

        let response = app
            .clone()
            .oneshot(Request::get("/remove/acme").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "OK");

        // Never cached.
        let response = app
            .clone()
            .oneshot(Request::get("/remove/initech").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(Request::get("/remove").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/profiles").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_text(response).await, r#"["globex"]"#);
    }
}
