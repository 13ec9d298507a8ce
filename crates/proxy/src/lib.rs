//! Core domain for the deployment proxy.
//!
//! The proxy accepts build-trigger notifications from untrusted sources
//! (DockerHub and GCR push webhooks, GitHub push webhooks, hg.mozilla.org push
//! notifications and Taskcluster task completions on Pulse), establishes that
//! each one genuinely originates from the claimed source, and turns it into a
//! [`CanonicalTriggerRequest`] for Jenkins.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate performs no network I/O.
//! Every outbound call a verifier needs (registry callback, push-log lookup,
//! task-definition fetch, the Jenkins trigger itself) goes through a trait in
//! [`ports`]; the `jenkins` and `upstream` crates supply the implementations.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Allow-list validated identifiers (`Namespace`, `ImageTag`, `JobSegment`, ...) |
//! | [`types`] | `CanonicalTriggerRequest`, `JobPath`, `TriggerParams`, `JenkinsCrumb`, `PulseBinding`, `AllowList` |
//! | [`events`] | The closed [`WebhookEvent`] union and the decoders for each transport body |
//! | [`reference`] | Container image reference grammar used by the GCR adapter |
//! | [`verify`] | One trust verifier per source, plus the [`Verifiers`] dispatch table |
//! | [`dispatch`] | Verify-then-trigger sequencing shared by every inbound transport |
//! | [`ports`] | Outbound capability traits |
//! | [`errors`] | The [`ProxyError`] taxonomy and its HTTP status mapping |

pub mod dispatch;
pub mod errors;
pub mod events;
pub mod identifiers;
pub mod ports;
pub mod reference;
pub mod types;
pub mod verify;

#[cfg(test)]
mod testing;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use dispatch::Dispatcher;
pub use errors::ProxyError;
pub use events::{
    DockerHubPush, GcrPush, GitHubPush, HgChangegroup, PushlogEntry, TaskclusterCompletion,
    WebhookEvent,
};
pub use identifiers::{
    EventId, ImageDigest, ImageTag, JobSegment, Namespace, RepositoryName, Revision, SlugId,
};
pub use ports::{
    CallbackPayload, JenkinsTrigger, PushlogApi, PushlogPush, PushlogResponse, RegistryCallback,
    TaskDefinition, TaskDefinitionApi,
};
pub use reference::{ImageReference, ReferenceTarget};
pub use types::{
    AllowList, CanonicalTriggerRequest, EventSource, JenkinsCrumb, JobPath, PulseBinding,
    TriggerParams,
};
pub use verify::{
    parse_source_ranges, DeployMetadata, DockerHubVerifier, GcrVerifier, GitHubVerifier,
    HgPushVerifier, TaskclusterVerifier, Verifiers,
};
