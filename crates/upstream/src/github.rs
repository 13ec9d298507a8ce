//! GitHub meta endpoint client.
//!
//! Used once at startup to learn the address ranges GitHub sends webhooks
//! from. A failure here stops the GitHub adapter from starting.

use serde::Deserialize;
use tracing::info;

use crate::UpstreamClientError;

#[derive(Debug, Deserialize)]
struct MetaResponse {
    #[serde(default)]
    hooks: Vec<String>,
}

/// Reads `<api>/meta`.
#[derive(Debug, Clone)]
pub struct GitHubMetaClient {
    api_url: String,
    http: reqwest::Client,
}

impl GitHubMetaClient {
    pub fn new(api_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    /// Returns the `hooks` CIDR strings. Parsing them is left to
    /// [`proxy::parse_source_ranges`].
    pub async fn fetch_hook_ranges(&self) -> Result<Vec<String>, UpstreamClientError> {
        let url = format!("{}/meta", self.api_url);
        let response = self
            .http
            .get(&url)
            .header("accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|source| UpstreamClientError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamClientError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let meta: MetaResponse = response
            .json()
            .await
            .map_err(|source| UpstreamClientError::Decode { url, source })?;
        info!(ranges = meta.hooks.len(), "fetched github hook source ranges");
        Ok(meta.hooks)
    }
}
