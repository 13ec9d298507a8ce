//! Inbound events, one variant per source.
//!
//! Each variant is produced by exactly one decoder from exactly one raw
//! transport message (an HTTP body or a bus delivery body) and is consumed by
//! exactly one verifier. Events live for the duration of one request or
//! delivery and are never persisted.
//!
//! Decoders only check structure. Every trust decision belongs to
//! [`crate::verify`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::Value;

use crate::{EventSource, ProxyError};

// ---------------------------------------------------------------------------
// Union
// ---------------------------------------------------------------------------

/// A decoded, not yet verified, trigger notification.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    /// DockerHub repository push.
    DockerHubPush(DockerHubPush),
    /// GCR image insert notification.
    GcrPush(GcrPush),
    /// GitHub `push` event.
    GitHubPush(GitHubPush),
    /// hg.mozilla.org changegroup notification.
    HgChangegroup(HgChangegroup),
    /// Taskcluster task completion on a watched route.
    TaskclusterCompletion(TaskclusterCompletion),
}

impl WebhookEvent {
    /// The source this event claims to come from.
    pub fn source(&self) -> EventSource {
        match self {
            Self::DockerHubPush(_) => EventSource::DockerHub,
            Self::GcrPush(_) => EventSource::Gcr,
            Self::GitHubPush(_) => EventSource::GitHub,
            Self::HgChangegroup(_) => EventSource::HgPush,
            Self::TaskclusterCompletion(_) => EventSource::TaskclusterCompletion,
        }
    }
}

fn parse_value(source: EventSource, body: &[u8]) -> Result<Value, ProxyError> {
    serde_json::from_slice(body).map_err(|e| ProxyError::parse(source, e))
}

fn from_value<T: for<'de> Deserialize<'de>>(
    source: EventSource,
    value: &Value,
) -> Result<T, ProxyError> {
    T::deserialize(value).map_err(|e| ProxyError::parse(source, e))
}

// ---------------------------------------------------------------------------
// DockerHub
// ---------------------------------------------------------------------------

/// A DockerHub push webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct DockerHubPush {
    /// `repository.namespace`
    pub namespace: String,
    /// `repository.name`
    pub repo_name: String,
    /// `push_data.tag`
    pub tag: String,
    /// `callback_url`, where the registry expects the validation callback.
    pub callback_url: String,
    /// The whole body, forwarded to Jenkins as `RawJSON`.
    pub raw_payload: Value,
}

// Missing fields decode as empty so the allow-list check still runs on
// partial bodies; empty values fail later validation.
#[derive(Default, Deserialize)]
#[serde(default)]
struct DockerHubWire {
    callback_url: String,
    repository: DockerHubRepositoryWire,
    push_data: DockerHubPushDataWire,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct DockerHubRepositoryWire {
    namespace: String,
    name: String,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct DockerHubPushDataWire {
    tag: String,
}

impl DockerHubPush {
    /// Decodes a DockerHub webhook body.
    ///
    /// Malformed JSON yields [`ProxyError::Parse`]. Missing fields decode as
    /// empty strings.
    pub fn from_json(body: &[u8]) -> Result<Self, ProxyError> {
        let raw_payload = parse_value(EventSource::DockerHub, body)?;
        let wire: DockerHubWire = from_value(EventSource::DockerHub, &raw_payload)?;
        Ok(Self {
            namespace: wire.repository.namespace,
            repo_name: wire.repository.name,
            tag: wire.push_data.tag,
            callback_url: wire.callback_url,
            raw_payload,
        })
    }
}

// ---------------------------------------------------------------------------
// GCR
// ---------------------------------------------------------------------------

/// A GCR push notification.
///
/// `tag` is set for tagged pushes; otherwise `digest` identifies the image.
#[derive(Debug, Clone, PartialEq)]
pub struct GcrPush {
    /// `INSERT` or `DELETE`.
    pub action: String,
    /// Fully qualified tag reference, e.g. `gcr.io/my-project/hello-world:1.1`.
    pub tag: Option<String>,
    /// Fully qualified digest reference, e.g. `gcr.io/p/r@sha256:...`.
    pub digest: Option<String>,
    /// The decoded notification, forwarded to Jenkins as `RawJSON`.
    pub raw_payload: Value,
}

#[derive(Deserialize)]
struct PushEnvelopeWire {
    message: PushMessageWire,
}

#[derive(Deserialize)]
struct PushMessageWire {
    data: String,
}

#[derive(Deserialize)]
struct GcrWire {
    action: String,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    digest: Option<String>,
}

impl GcrPush {
    /// Decodes a Pub/Sub push delivery whose `message.data` is base64 JSON.
    pub fn from_push_envelope(body: &[u8]) -> Result<Self, ProxyError> {
        let envelope: PushEnvelopeWire = serde_json::from_slice(body)
            .map_err(|e| ProxyError::parse(EventSource::Gcr, format!("envelope: {e}")))?;
        let data = STANDARD
            .decode(envelope.message.data.trim())
            .map_err(|e| ProxyError::parse(EventSource::Gcr, format!("message data: {e}")))?;
        let raw_payload = parse_value(EventSource::Gcr, &data)?;
        let wire: GcrWire = from_value(EventSource::Gcr, &raw_payload)?;
        Ok(Self {
            action: wire.action,
            tag: wire.tag.filter(|t| !t.is_empty()),
            digest: wire.digest.filter(|d| !d.is_empty()),
            raw_payload,
        })
    }

    /// The image reference to build: the tag if present, else the digest.
    pub fn image_reference(&self) -> Option<&str> {
        self.tag.as_deref().or(self.digest.as_deref())
    }
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

/// A GitHub `push` webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct GitHubPush {
    /// `repository.owner.login`
    pub org_login: String,
    /// `repository.name`
    pub repo_name: String,
    /// `ref`, e.g. `refs/heads/main`.
    pub git_ref: String,
    /// The whole body, forwarded to Jenkins as `RawJSON`.
    pub raw_payload: Value,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct GitHubPushWire {
    #[serde(rename = "ref")]
    git_ref: String,
    repository: GitHubRepositoryWire,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct GitHubRepositoryWire {
    name: String,
    owner: GitHubOwnerWire,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct GitHubOwnerWire {
    login: String,
}

/// The only `X-GitHub-Event` value this proxy accepts.
pub const GITHUB_PUSH_EVENT: &str = "push";

impl GitHubPush {
    /// Decodes a GitHub webhook body after checking the event header.
    ///
    /// The header is checked before the body is touched; anything other than
    /// `push` (including a missing header) is a [`ProxyError::Parse`].
    pub fn from_request(event_header: Option<&str>, body: &[u8]) -> Result<Self, ProxyError> {
        if event_header != Some(GITHUB_PUSH_EVENT) {
            return Err(ProxyError::parse(
                EventSource::GitHub,
                format!(
                    "only push events are supported, got {:?}",
                    event_header.unwrap_or("<none>")
                ),
            ));
        }
        let raw_payload = parse_value(EventSource::GitHub, body)?;
        let wire: GitHubPushWire = from_value(EventSource::GitHub, &raw_payload)?;
        Ok(Self {
            org_login: wire.repository.owner.login,
            repo_name: wire.repository.name,
            git_ref: wire.git_ref,
            raw_payload,
        })
    }
}

// ---------------------------------------------------------------------------
// hg.mozilla.org
// ---------------------------------------------------------------------------

/// The one hg notification type this proxy understands.
pub const CHANGEGROUP_MESSAGE_TYPE: &str = "changegroup.1";

/// One pushlog entry as claimed by a changegroup notification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushlogEntry {
    /// Push id in the repository's pushlog.
    #[serde(rename = "pushid")]
    pub push_id: u64,
    /// Pusher.
    pub user: String,
    /// Push time, seconds since the epoch.
    pub time: i64,
    /// JSON pushlog URL for this push.
    #[serde(rename = "push_json_url", default)]
    pub push_json_url: String,
}

/// A `changegroup.1` notification delivered on the hg push exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct HgChangegroup {
    /// Routing key of the delivery: the repository path, e.g. `ci/ci-admin`.
    pub routing_key: String,
    /// `repo_url`
    pub repo_url: String,
    /// `heads`
    pub heads: Vec<String>,
    /// `pushlog_pushes`
    pub pushlog_entries: Vec<PushlogEntry>,
    /// The whole body, forwarded to Jenkins as `RawJSON`.
    pub raw_payload: Value,
}

#[derive(Deserialize)]
struct HgEnvelopeWire {
    payload: HgPayloadWire,
}

#[derive(Deserialize)]
struct HgPayloadWire {
    #[serde(rename = "type")]
    message_type: String,
    data: Value,
}

#[derive(Deserialize)]
struct ChangegroupWire {
    repo_url: String,
    heads: Vec<String>,
    pushlog_pushes: Vec<PushlogEntry>,
}

impl HgChangegroup {
    /// Decodes a Pulse delivery from the hg push exchange.
    ///
    /// hg.mozilla.org wraps the notification in an extra `payload` layer.
    /// Message types other than `changegroup.1` are a [`ProxyError::Parse`].
    pub fn from_delivery(routing_key: &str, body: &[u8]) -> Result<Self, ProxyError> {
        let raw_payload = parse_value(EventSource::HgPush, body)?;
        let envelope: HgEnvelopeWire = from_value(EventSource::HgPush, &raw_payload)?;
        if envelope.payload.message_type != CHANGEGROUP_MESSAGE_TYPE {
            return Err(ProxyError::parse(
                EventSource::HgPush,
                format!("unknown hg message type {}", envelope.payload.message_type),
            ));
        }
        let data: ChangegroupWire = from_value(EventSource::HgPush, &envelope.payload.data)?;
        Ok(Self {
            routing_key: routing_key.to_string(),
            repo_url: data.repo_url,
            heads: data.heads,
            pushlog_entries: data.pushlog_pushes,
            raw_payload,
        })
    }
}

// ---------------------------------------------------------------------------
// Taskcluster
// ---------------------------------------------------------------------------

/// A task-completed message received through a watched route.
///
/// The deployment metadata is not part of the message; the verifier fetches
/// it from the task definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskclusterCompletion {
    /// `status.taskId`
    pub task_id: String,
    /// Routing key of the delivery, e.g. `route.cloudops.deploy.v1.app.prod`.
    pub routing_key: String,
    /// The whole body, forwarded to Jenkins as `RawJSON`.
    pub raw_payload: Value,
}

#[derive(Deserialize)]
struct TaskCompletedWire {
    status: TaskStatusWire,
}

#[derive(Deserialize)]
struct TaskStatusWire {
    #[serde(rename = "taskId")]
    task_id: String,
}

impl TaskclusterCompletion {
    /// Decodes a delivery from the task-completed exchange.
    pub fn from_delivery(routing_key: &str, body: &[u8]) -> Result<Self, ProxyError> {
        let source = EventSource::TaskclusterCompletion;
        let raw_payload = parse_value(source, body)?;
        let wire: TaskCompletedWire = from_value(source, &raw_payload)?;
        Ok(Self {
            task_id: wire.status.task_id,
            routing_key: routing_key.to_string(),
            raw_payload,
        })
    }
}
