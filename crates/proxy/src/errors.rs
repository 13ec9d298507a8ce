//! Error taxonomy for the deployment proxy.
//!
//! Every failure an inbound event can meet on its way to Jenkins is one of the
//! [`ProxyError`] variants. HTTP adapters turn the variant into a status code
//! with [`ProxyError::status_code`] and return only
//! [`ProxyError::public_message`] to the caller; bus adapters log the error and
//! acknowledge the message. Nothing in this crate retries.

use thiserror::Error;

use crate::EventSource;

/// Everything that can stop an inbound event from becoming a Jenkins build.
///
/// The `Display` output carries the full detail and is meant for logs only.
/// Callers outside the process never see it.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The transport body could not be decoded into the source's structure.
    ///
    /// Maps to 500. A malformed body is never reported as an authorization
    /// failure.
    #[error("could not parse {source_kind} payload: {message}")]
    Parse {
        /// Source adapter that attempted the decode.
        source_kind: EventSource,
        /// Decoder error text.
        message: String,
    },

    /// The event claims an identity the proxy does not trust: namespace, org,
    /// project or repository outside its allow-list, a callback URL bound to
    /// another owner, a refused callback, or a push-log mismatch.
    ///
    /// Maps to 401.
    #[error("{source_kind} event rejected: {reason} ('{value}')")]
    Authenticity {
        /// Source adapter that rejected the event.
        source_kind: EventSource,
        /// The rejected identifying value, logged verbatim.
        value: String,
        /// Which check failed.
        reason: String,
    },

    /// The request did not come from a network range published by the source.
    ///
    /// Maps to 400.
    #[error("request from untrusted origin '{ip}'")]
    UntrustedOrigin {
        /// The offending address as seen by the proxy (or `"unknown"`).
        ip: String,
    },

    /// A value failed its allow-list pattern or a structural rule (head count,
    /// repository path shape, reference grammar, accepted action).
    ///
    /// Maps to 500.
    #[error("invalid {field} '{value}': {reason}")]
    Validation {
        /// Name of the field that failed.
        field: &'static str,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An outbound call (Jenkins, registry, provider API) failed at the
    /// transport level or returned a non-success status.
    ///
    /// Maps to 500.
    #[error("{service} call failed: {message}")]
    Upstream {
        /// Logical name of the remote service (e.g. `"jenkins"`).
        service: &'static str,
        /// Human-readable failure description, including status and URL.
        message: String,
        /// HTTP status returned by the remote, when one was received.
        status: Option<u16>,
    },

    /// The proxy itself is not set up to handle this event.
    ///
    /// Maps to 500.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl ProxyError {
    /// Shorthand for a [`ProxyError::Validation`].
    pub fn validation(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`ProxyError::Authenticity`].
    pub fn authenticity(
        source_kind: EventSource,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Authenticity {
            source_kind,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`ProxyError::Parse`].
    pub fn parse(source_kind: EventSource, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            source_kind,
            message: message.to_string(),
        }
    }

    /// Shorthand for a [`ProxyError::Upstream`].
    pub fn upstream(service: &'static str, message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Upstream {
            service,
            message: message.into(),
            status,
        }
    }

    /// HTTP status code returned to a webhook caller for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Authenticity { .. } => 401,
            Self::UntrustedOrigin { .. } => 400,
            Self::Parse { .. }
            | Self::Validation { .. }
            | Self::Upstream { .. }
            | Self::Configuration { .. } => 500,
        }
    }

    /// Generic text returned to a webhook caller. Never names the failed check.
    /// Returns `true` for failures of an outbound call rather than of the
    /// event itself.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream { .. })
    }

    pub fn public_message(&self) -> &'static str {
        match self.status_code() {
            400 => "Bad Request",
            401 => "Unauthorized",
            _ => "Internal Service Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_webhook_contract() {
        let cases = [
            (ProxyError::parse(EventSource::DockerHub, "eof"), 500),
            (
                ProxyError::authenticity(EventSource::DockerHub, "evil", "namespace not allowed"),
                401,
            ),
            (
                ProxyError::UntrustedOrigin {
                    ip: "10.0.0.1".into(),
                },
                400,
            ),
            (ProxyError::validation("tag", "v1[bad]", "pattern"), 500),
            (ProxyError::upstream("jenkins", "boom", Some(400)), 500),
        ];
        for (error, status) in cases {
            assert_eq!(error.status_code(), status, "{error}");
        }
    }

    #[test]
    fn only_upstream_failures_are_upstream() {
        assert!(ProxyError::upstream("hgmo", "status 500", Some(500)).is_upstream());
        assert!(!ProxyError::parse(EventSource::HgPush, "eof").is_upstream());
        assert!(!ProxyError::authenticity(EventSource::HgPush, "ci/x", "unwatched").is_upstream());
    }

    #[test]
    fn public_message_hides_detail() {
        let error = ProxyError::authenticity(EventSource::GitHub, "evil-org", "org not allowed");
        assert_eq!(error.public_message(), "Unauthorized");
        assert!(error.to_string().contains("evil-org"));

        let error = ProxyError::validation("repository name", "../x", "pattern");
        assert_eq!(error.public_message(), "Internal Service Error");
    }
}
