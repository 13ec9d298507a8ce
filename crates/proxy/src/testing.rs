//! In-memory port fakes shared by the verifier and dispatcher tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    CallbackPayload, CanonicalTriggerRequest, JenkinsTrigger, ProxyError, PushlogApi,
    PushlogResponse, RegistryCallback, SlugId, TaskDefinition, TaskDefinitionApi,
};

pub(crate) struct FakeCallback {
    refuse_with: Option<u16>,
    calls: Mutex<Vec<String>>,
}

impl FakeCallback {
    pub(crate) fn accepting() -> Self {
        Self {
            refuse_with: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn refusing(status: u16) -> Self {
        Self {
            refuse_with: Some(status),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistryCallback for FakeCallback {
    async fn confirm(&self, callback_url: &str, _payload: &CallbackPayload) -> Result<(), ProxyError> {
        self.calls.lock().unwrap().push(callback_url.to_string());
        match self.refuse_with {
            None => Ok(()),
            Some(status) => Err(ProxyError::upstream(
                "dockerhub",
                format!("callback returned {status}"),
                Some(status),
            )),
        }
    }
}

pub(crate) struct FakePushlog {
    response: Result<PushlogResponse, u16>,
    urls: Mutex<Vec<String>>,
}

impl FakePushlog {
    pub(crate) fn returning(response: PushlogResponse) -> Self {
        Self {
            response: Ok(response),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(status: u16) -> Self {
        Self {
            response: Err(status),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushlogApi for FakePushlog {
    async fn fetch_pushes(&self, url: &str) -> Result<PushlogResponse, ProxyError> {
        self.urls.lock().unwrap().push(url.to_string());
        match &self.response {
            Ok(response) => Ok(response.clone()),
            Err(status) => Err(ProxyError::upstream(
                "hgmo",
                format!("pushlog returned {status} for {url}"),
                Some(*status),
            )),
        }
    }
}

pub(crate) struct FakeTaskDefinitions {
    definition: Option<TaskDefinition>,
    requested: Mutex<Vec<String>>,
}

impl FakeTaskDefinitions {
    pub(crate) fn returning(definition: TaskDefinition) -> Self {
        Self {
            definition: Some(definition),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn missing() -> Self {
        Self {
            definition: None,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskDefinitionApi for FakeTaskDefinitions {
    async fn task_definition(&self, task_id: &SlugId) -> Result<TaskDefinition, ProxyError> {
        self.requested.lock().unwrap().push(task_id.to_string());
        self.definition.clone().ok_or_else(|| {
            ProxyError::upstream("taskcluster", format!("task {task_id} not found"), Some(404))
        })
    }
}

pub(crate) struct RecordingJenkins {
    fail: bool,
    requests: Mutex<Vec<CanonicalTriggerRequest>>,
}

impl RecordingJenkins {
    pub(crate) fn new() -> Self {
        Self {
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<CanonicalTriggerRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl JenkinsTrigger for RecordingJenkins {
    async fn trigger(&self, request: &CanonicalTriggerRequest) -> Result<(), ProxyError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(ProxyError::upstream(
                "jenkins",
                format!("Jenkins returned 400 for {}, expected 201", request.job_path),
                Some(400),
            ));
        }
        Ok(())
    }
}
