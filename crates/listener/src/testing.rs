//! Test doubles shared by the HTTP and Pulse tests.

use std::sync::Mutex;

use async_trait::async_trait;
use proxy::{CanonicalTriggerRequest, JenkinsTrigger, ProxyError};

/// Records every trigger request and always succeeds.
#[derive(Default)]
pub(crate) struct RecordingJenkins {
    pub(crate) requests: Mutex<Vec<CanonicalTriggerRequest>>,
}

#[async_trait]
impl JenkinsTrigger for RecordingJenkins {
    async fn trigger(&self, request: &CanonicalTriggerRequest) -> Result<(), ProxyError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}
