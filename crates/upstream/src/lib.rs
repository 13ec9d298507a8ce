//! Outbound clients for the deployment proxy's sources of truth.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Each module implements one [`proxy`] port trait (or,
//! for GitHub, a startup-time fetch) over a shared `reqwest` client. No
//! verification logic lives here; clients report transport and status
//! failures and nothing else.
//!
//! ## Module Layout
//!
//! | Module | Implements |
//! |--------|-----------|
//! | [`dockerhub`] | [`proxy::RegistryCallback`] |
//! | [`github`] | Hook source-range fetch from `<api>/meta` |
//! | [`hgmo`] | [`proxy::PushlogApi`] |
//! | [`taskcluster`] | [`proxy::TaskDefinitionApi`] |

use std::time::Duration;

use thiserror::Error;

pub mod dockerhub;
pub mod github;
pub mod hgmo;
pub mod taskcluster;

pub use dockerhub::DockerHubCallbackClient;
pub use github::GitHubMetaClient;
pub use hgmo::HgPushlogClient;
pub use taskcluster::TaskclusterQueueClient;

/// `User-Agent` sent on every outbound request.
pub const USER_AGENT: &str = concat!("deploy-proxy/", env!("CARGO_PKG_VERSION"));

/// Failures talking to an upstream HTTP API.
#[derive(Debug, Error)]
pub enum UpstreamClientError {
    /// The shared client could not be constructed.
    #[error("could not build http client: {0}")]
    Build(#[source] reqwest::Error),

    /// The request could not be sent or the body not read.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with an unexpected status.
    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },

    /// The body did not have the expected shape.
    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl UpstreamClientError {
    /// The HTTP status, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn into_proxy_error(self, service: &'static str) -> proxy::ProxyError {
        let status = self.status();
        proxy::ProxyError::upstream(service, self.to_string(), status)
    }
}

/// Builds the client shared by every outbound call, bounded by `timeout`.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, UpstreamClientError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(UpstreamClientError::Build)
}

#[cfg(test)]
pub(crate) mod test_server {
    use std::net::SocketAddr;

    use axum::Router;

    /// Serves `router` on an ephemeral loopback port.
    pub(crate) async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    pub(crate) fn client() -> reqwest::Client {
        super::build_http_client(std::time::Duration::from_secs(5)).unwrap()
    }
}
