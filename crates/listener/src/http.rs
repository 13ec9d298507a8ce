//! Webhook HTTP router.
//!
//! | Route | Method | Source |
//! |-------|--------|--------|
//! | `/dockerhub` | `POST` | DockerHub push webhook |
//! | `/gcr` | `POST` | GCR notification in a Pub/Sub push envelope |
//! | configurable | `POST` | GitHub `push` webhook (only when configured) |
//! | `/__heartbeat__`, `/__lbheartbeat__` | `GET` | health checks |
//!
//! Any other method on a webhook route is `400 Bad Request`. Failures return
//! [`ProxyError::public_message`] with [`ProxyError::status_code`]; the
//! detail goes to the log only. Success is `200 OK`.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use proxy::{
    DockerHubPush, EventId, EventSource, GcrPush, GitHubPush, ProxyError, WebhookEvent,
};
use tracing::{info, info_span, warn, Instrument};

/// Header GitHub names its event type in.
pub const GITHUB_EVENT_HEADER: &str = "x-github-event";

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Router options that are not part of the verifiers.
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    /// Path the GitHub webhook is mounted on; `None` disables it.
    pub github_path: Option<String>,
    /// Take the caller's address from the last `X-Forwarded-For` entry.
    pub github_use_x_forwarded_for: bool,
}

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<proxy::Dispatcher>,
    use_x_forwarded_for: bool,
}

/// Builds the webhook router.
///
/// The GitHub route is only mounted when both a path is configured and the
/// dispatcher carries a GitHub verifier.
pub fn build_router(dispatcher: Arc<proxy::Dispatcher>, config: RouterConfig) -> Router {
    let github_enabled = dispatcher.verifiers().github().is_some();
    let state = AppState {
        dispatcher,
        use_x_forwarded_for: config.github_use_x_forwarded_for,
    };

    let mut router = Router::new()
        .route("/__heartbeat__", get(heartbeat))
        .route("/__lbheartbeat__", get(heartbeat))
        .route("/dockerhub", post(dockerhub).fallback(bad_request))
        .route("/gcr", post(gcr).fallback(bad_request));

    match config.github_path {
        Some(path) if github_enabled => {
            info!(%path, "mounting github webhook endpoint");
            router = router.route(&path, post(github).fallback(bad_request));
        }
        Some(path) => warn!(%path, "github path configured without a github verifier"),
        None => {}
    }

    router.with_state(state)
}

async fn heartbeat() -> &'static str {
    "OK"
}

async fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "Bad Request").into_response()
}

async fn dockerhub(State(state): State<AppState>, body: Bytes) -> Response {
    let decode = || DockerHubPush::from_json(&body).map(WebhookEvent::DockerHubPush);
    handle(&state, EventSource::DockerHub, decode).await
}

async fn gcr(State(state): State<AppState>, body: Bytes) -> Response {
    let decode = || GcrPush::from_push_envelope(&body).map(WebhookEvent::GcrPush);
    handle(&state, EventSource::Gcr, decode).await
}

async fn github(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let event_id = EventId::new_random();
    let span = info_span!("webhook", source = %EventSource::GitHub, %event_id);
    async {
        let ip = if state.use_x_forwarded_for {
            forwarded_for(&headers)
        } else {
            connect_info.map(|ConnectInfo(addr)| addr.ip())
        };

        let result = match state.dispatcher.verifiers().github() {
            Some(verifier) => verifier.check_origin(ip),
            None => Err(ProxyError::Configuration {
                message: "github webhook is not configured".to_string(),
            }),
        };
        if let Err(e) = result {
            return error_response(&e);
        }
        info!(ip = ?ip, "received github request");

        let event_header = headers
            .get(GITHUB_EVENT_HEADER)
            .and_then(|value| value.to_str().ok());
        let result = match GitHubPush::from_request(event_header, &body) {
            Ok(push) => state
                .dispatcher
                .dispatch(&WebhookEvent::GitHubPush(push))
                .await
                .map(|_| ()),
            Err(e) => {
                warn!(error = %e, "error parsing request");
                Err(e)
            }
        };
        respond(result)
    }
    .instrument(span)
    .await
}

async fn handle<F>(state: &AppState, source: EventSource, decode: F) -> Response
where
    F: FnOnce() -> Result<WebhookEvent, ProxyError>,
{
    let event_id = EventId::new_random();
    let span = info_span!("webhook", %source, %event_id);
    async {
        let result = match decode() {
            Ok(event) => state.dispatcher.dispatch(&event).await.map(|_| ()),
            Err(e) => {
                warn!(error = %e, "error parsing request");
                Err(e)
            }
        };
        respond(result)
    }
    .instrument(span)
    .await
}

fn respond(result: Result<(), ProxyError>) -> Response {
    match result {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(e) => error_response(&e),
    }
}

fn error_response(error: &ProxyError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, error.public_message()).into_response()
}

// The last entry is the one appended by our own load balancer.
fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get(FORWARDED_FOR_HEADER)?
        .to_str()
        .ok()?
        .rsplit(',')
        .next()?
        .trim()
        .parse()
        .ok()
}
