//! hg.mozilla.org pushlog client.

use async_trait::async_trait;
use proxy::{ProxyError, PushlogApi, PushlogResponse};
use reqwest::StatusCode;
use tracing::debug;

use crate::UpstreamClientError;

const SERVICE: &str = "hgmo";

/// Reads `json-pushes` documents.
#[derive(Debug, Clone)]
pub struct HgPushlogClient {
    http: reqwest::Client,
}

impl HgPushlogClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// GETs `url`; only `200` is accepted.
    pub async fn get_pushes(&self, url: &str) -> Result<PushlogResponse, UpstreamClientError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| UpstreamClientError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(UpstreamClientError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let pushes: PushlogResponse =
            response
                .json()
                .await
                .map_err(|source| UpstreamClientError::Decode {
                    url: url.to_string(),
                    source,
                })?;
        debug!(url, pushes = pushes.pushes.len(), "pushlog fetched");
        Ok(pushes)
    }
}

#[async_trait]
impl PushlogApi for HgPushlogClient {
    async fn fetch_pushes(&self, url: &str) -> Result<PushlogResponse, ProxyError> {
        self.get_pushes(url)
            .await
            .map_err(|e| e.into_proxy_error(SERVICE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{client, serve};

    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn json_pushes(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
        assert_eq!(query.get("tipsonly").map(String::as_str), Some("1"));
        Json(json!({
            "lastpushid": 143,
            "pushes": {
                "143": {
                    "changesets": ["9c9a898b351909b2e0fe8420ac9d649ded523af3"],
                    "date": 1585778355,
                    "user": "tom@mozilla.com"
                }
            }
        }))
    }

    #[tokio::test]
    async fn pushlog_is_decoded() {
        let router = Router::new().route("/ci/ci-admin/json-pushes", get(json_pushes));
        let addr = serve(router).await;

        let response = HgPushlogClient::new(client())
            .fetch_pushes(&format!(
                "http://{addr}/ci/ci-admin/json-pushes?version=2&startID=142&endID=143&tipsonly=1"
            ))
            .await
            .unwrap();
        assert_eq!(response.pushes[&143].user, "tom@mozilla.com");
    }

    #[tokio::test]
    async fn non_200_fails() {
        let router = Router::new().route(
            "/ci/ci-admin/json-pushes",
            get(|| async { AxumStatus::NOT_FOUND }),
        );
        let addr = serve(router).await;

        let err = HgPushlogClient::new(client())
            .fetch_pushes(&format!("http://{addr}/ci/ci-admin/json-pushes?version=2"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Upstream { status: Some(404), .. }));
    }

    #[tokio::test]
    async fn malformed_body_fails() {
        let router = Router::new().route(
            "/ci/ci-admin/json-pushes",
            get(|| async { "not json" }),
        );
        let addr = serve(router).await;

        let err = HgPushlogClient::new(client())
            .get_pushes(&format!("http://{addr}/ci/ci-admin/json-pushes"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamClientError::Decode { .. }));
    }
}
