//! Jenkins trigger client.
//!
//! Implements [`proxy::JenkinsTrigger`] over `reqwest`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** The CSRF crumb handshake, basic authentication and the
//! `buildWithParameters` form post live here. The [`proxy`] crate sees only
//! [`proxy::JenkinsTrigger`].
//!
//! ## Protocol
//!
//! 1. `GET <base>/crumbIssuer/api/json` with basic auth. The crumb is fetched
//!    for every trigger and never cached.
//! 2. `POST <base><job path>/buildWithParameters` with the crumb in the header
//!    Jenkins named, the parameters URL-encoded in the body.
//! 3. Only `201 Created` counts as success.
//!
//! Nothing is retried.

use async_trait::async_trait;
use proxy::{CanonicalTriggerRequest, JenkinsCrumb, JenkinsTrigger, JobPath, ProxyError, TriggerParams};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

const SERVICE: &str = "jenkins";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures of one trigger attempt.
#[derive(Debug, Error)]
pub enum JenkinsError {
    /// The crumb request could not be sent or its body not read.
    #[error("crumb request to {url} failed: {source}")]
    CrumbRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The crumb issuer answered with something other than 200.
    #[error("crumb issuer returned {status} for {url}")]
    CrumbStatus { status: u16, url: String },

    /// The crumb issuer's body was not `{crumb, crumbRequestField}`.
    #[error("could not decode crumb from {url}: {source}")]
    CrumbDecode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The crumb could not be used as an HTTP header.
    #[error("crumb header {header:?} is not a valid header")]
    InvalidCrumbHeader { header: String },

    /// The build request could not be sent.
    #[error("POST to {url} failed: {source}")]
    Post {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Jenkins answered the build request with something other than 201.
    #[error("Jenkins returned {status} for {url}, expected 201")]
    UnexpectedStatus { status: u16, url: String },

    /// A job path segment failed the client-side character check.
    #[error("refusing job path segment {segment:?}")]
    InvalidJobPath { segment: String },
}

impl JenkinsError {
    fn status(&self) -> Option<u16> {
        match self {
            Self::CrumbStatus { status, .. } | Self::UnexpectedStatus { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

impl From<JenkinsError> for ProxyError {
    fn from(err: JenkinsError) -> Self {
        match err {
            JenkinsError::InvalidJobPath { segment } => {
                ProxyError::validation("job path segment", segment, "rejected by jenkins client")
            }
            other => {
                let status = other.status();
                ProxyError::upstream(SERVICE, other.to_string(), status)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Authenticated client for one Jenkins controller.
#[derive(Debug, Clone)]
pub struct JenkinsClient {
    base_url: String,
    user: String,
    password: String,
    http: reqwest::Client,
}

impl JenkinsClient {
    /// Creates a client. `http` should carry the process-wide timeout.
    pub fn new(
        base_url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user: user.into(),
            password: password.into(),
            http,
        }
    }

    /// Fetches a fresh CSRF crumb.
    pub async fn fetch_crumb(&self) -> Result<JenkinsCrumb, JenkinsError> {
        let url = format!("{}/crumbIssuer/api/json", self.base_url);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .map_err(|source| JenkinsError::CrumbRequest {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(JenkinsError::CrumbStatus {
                status: status.as_u16(),
                url,
            });
        }

        response
            .json::<JenkinsCrumb>()
            .await
            .map_err(|source| JenkinsError::CrumbDecode { url, source })
    }

    /// Posts `params` to `<job_path>/buildWithParameters`.
    #[instrument(skip(self, params), fields(job = %job_path))]
    pub async fn trigger_job(
        &self,
        job_path: &JobPath,
        params: &TriggerParams,
    ) -> Result<(), JenkinsError> {
        for segment in job_path.segments() {
            check_segment(segment.as_str())?;
        }

        let crumb = self.fetch_crumb().await?;
        let header_name = HeaderName::from_bytes(crumb.header_name.as_bytes()).map_err(|_| {
            JenkinsError::InvalidCrumbHeader {
                header: crumb.header_name.clone(),
            }
        })?;
        let header_value =
            HeaderValue::from_str(&crumb.value).map_err(|_| JenkinsError::InvalidCrumbHeader {
                header: crumb.header_name.clone(),
            })?;

        let url = format!("{}{}/buildWithParameters", self.base_url, job_path.to_url_path());
        debug!(%url, "posting build request");
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.user, Some(&self.password))
            .header(header_name, header_value)
            .form(params)
            .send()
            .await
            .map_err(|source| JenkinsError::Post {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::CREATED {
            error!(status = status.as_u16(), %url, "jenkins rejected build request");
            return Err(JenkinsError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        info!(%url, "build queued");
        Ok(())
    }
}

#[async_trait]
impl JenkinsTrigger for JenkinsClient {
    async fn trigger(&self, request: &CanonicalTriggerRequest) -> Result<(), ProxyError> {
        self.trigger_job(&request.job_path, &request.params)
            .await
            .map_err(ProxyError::from)
    }
}

// Second line of defence: the segment types already enforce this.
fn check_segment(segment: &str) -> Result<(), JenkinsError> {
    let allowed = !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if allowed {
        Ok(())
    } else {
        Err(JenkinsError::InvalidJobPath {
            segment: segment.to_string(),
        })
    }
}
