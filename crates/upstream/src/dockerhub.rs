//! DockerHub webhook callback client.

use async_trait::async_trait;
use proxy::{CallbackPayload, ProxyError, RegistryCallback};
use tracing::{info, instrument};

use crate::UpstreamClientError;

const SERVICE: &str = "dockerhub";

/// Posts validation callbacks to DockerHub.
#[derive(Debug, Clone)]
pub struct DockerHubCallbackClient {
    http: reqwest::Client,
}

impl DockerHubCallbackClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Posts `payload` as JSON to `callback_url`; any non-2xx is an error.
    #[instrument(skip(self, payload))]
    pub async fn post_callback(
        &self,
        callback_url: &str,
        payload: &CallbackPayload,
    ) -> Result<(), UpstreamClientError> {
        let response = self
            .http
            .post(callback_url)
            .json(payload)
            .send()
            .await
            .map_err(|source| UpstreamClientError::Transport {
                url: callback_url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamClientError::Status {
                url: callback_url.to_string(),
                status: status.as_u16(),
            });
        }
        info!(status = status.as_u16(), "callback accepted");
        Ok(())
    }
}

#[async_trait]
impl RegistryCallback for DockerHubCallbackClient {
    async fn confirm(&self, callback_url: &str, payload: &CallbackPayload) -> Result<(), ProxyError> {
        self.post_callback(callback_url, payload)
            .await
            .map_err(|e| e.into_proxy_error(SERVICE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{client, serve};

    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;

    type Bodies = Arc<Mutex<Vec<Value>>>;

    async fn accept(State(bodies): State<Bodies>, Json(body): Json<Value>) -> StatusCode {
        bodies.lock().unwrap().push(body);
        StatusCode::OK
    }

    async fn fake_dockerhub() -> (Bodies, std::net::SocketAddr) {
        let bodies: Bodies = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route("/u/mozilla/testrepo/hook/2020202020/", post(accept))
            .route(
                "/u/mozilla/testrepo/hook/2020202020/fail",
                post(|| async { StatusCode::BAD_REQUEST }),
            )
            .with_state(bodies.clone());
        (bodies, serve(router).await)
    }

    #[tokio::test]
    async fn success_payload_is_posted() {
        let (bodies, addr) = fake_dockerhub().await;
        DockerHubCallbackClient::new(client())
            .confirm(
                &format!("http://{addr}/u/mozilla/testrepo/hook/2020202020/"),
                &CallbackPayload::success(),
            )
            .await
            .unwrap();

        let bodies = bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["state"], "success");
    }

    #[tokio::test]
    async fn refused_callback_is_an_error() {
        let (_bodies, addr) = fake_dockerhub().await;
        let err = DockerHubCallbackClient::new(client())
            .confirm(
                &format!("http://{addr}/u/mozilla/testrepo/hook/2020202020/fail"),
                &CallbackPayload::success(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Upstream { status: Some(400), .. }));
    }
}
