//! Scripted in-memory providers with call counters.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use serde_json::{Map, Value};
use tryon_contracts::artifacts::GenerationArtifact;
use tryon_contracts::jobs::{JobSnapshot, JobStatus, RawOutput};
use tryon_contracts::models::ModelVersionId;

use crate::error::{StudioError, StudioResult};
use crate::gemini::{ContentRequest, ContentResponse, GenerativeModel};
use crate::jobs::JobQueueApi;
use crate::normalize::{FetchedMedia, MediaFetcher};

pub fn snapshot(id: &str, status: JobStatus, output: Value) -> JobSnapshot {
    JobSnapshot {
        id: id.to_string(),
        status,
        output: RawOutput::from_value(Some(&output)),
        error: None,
    }
}

pub fn failed_snapshot(id: &str, detail: &str) -> JobSnapshot {
    JobSnapshot {
        error: Some(detail.to_string()),
        ..snapshot(id, JobStatus::Failed, Value::Null)
    }
}

pub fn image_reply(payload: &str) -> StudioResult<ContentResponse> {
    Ok(ContentResponse {
        images: vec![GenerationArtifact::inline(payload, None)],
        text: None,
    })
}

pub fn text_reply(text: &str) -> StudioResult<ContentResponse> {
    Ok(ContentResponse {
        images: Vec::new(),
        text: Some(text.to_string()),
    })
}

/// Job queue answering create and fetch calls from one shared script.
pub struct ScriptedQueue {
    script: Mutex<VecDeque<JobSnapshot>>,
    repeat: Option<JobSnapshot>,
    create_delay: Duration,
    creates: AtomicUsize,
    fetches: AtomicUsize,
    created_inputs: Mutex<Vec<Map<String, Value>>>,
}

impl ScriptedQueue {
    pub fn new(script: Vec<JobSnapshot>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            create_delay: Duration::ZERO,
            creates: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            created_inputs: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call with the same snapshot.
    pub fn repeating(snapshot: JobSnapshot) -> Self {
        Self {
            repeat: Some(snapshot),
            ..Self::new(Vec::new())
        }
    }

    /// Create calls take this long (on the tokio clock) before answering.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst) + self.fetches()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn created_inputs(&self) -> Vec<Map<String, Value>> {
        self.created_inputs.lock().unwrap().clone()
    }

    fn next(&self) -> StudioResult<JobSnapshot> {
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return Ok(next);
        }
        self.repeat
            .clone()
            .ok_or_else(|| StudioError::decode("scripted", "script exhausted"))
    }
}

#[async_trait]
impl JobQueueApi for ScriptedQueue {
    fn name(&self) -> &str {
        "Replicate"
    }

    async fn create_job(
        &self,
        _api_token: &str,
        _version: &ModelVersionId,
        input: &Map<String, Value>,
    ) -> StudioResult<JobSnapshot> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.created_inputs.lock().unwrap().push(input.clone());
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        self.next()
    }

    async fn fetch_job(&self, _api_token: &str, _job_id: &str) -> StudioResult<JobSnapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.next()
    }
}

pub struct FakeFetcher {
    result: Result<Vec<u8>, String>,
    urls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn serving(bytes: Vec<u8>) -> Self {
        Self {
            result: Ok(bytes),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            result: Err(reason.to_string()),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> StudioResult<FetchedMedia> {
        self.urls.lock().unwrap().push(url.to_string());
        match &self.result {
            Ok(bytes) => Ok(FetchedMedia {
                bytes: bytes.clone(),
                content_type: Some("image/png".to_string()),
            }),
            Err(reason) => Err(StudioError::OutputFetch {
                url: url.to_string(),
                reason: reason.clone(),
            }),
        }
    }
}

pub struct ScriptedModel {
    script: Mutex<VecDeque<StudioResult<ContentResponse>>>,
    requests: Mutex<Vec<ContentRequest>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<StudioResult<ContentResponse>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ContentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn generate_content(
        &self,
        _api_key: &str,
        request: &ContentRequest,
    ) -> StudioResult<ContentResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(StudioError::decode("scripted", "script exhausted")))
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path_and_query: String,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct StubState {
    replies: Arc<Mutex<VecDeque<(u16, String)>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Loopback HTTP server answering every request, whatever its path, with
/// the next scripted `(status, body)` reply.
pub struct StubServer {
    pub base: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    pub async fn start(replies: Vec<(u16, String)>) -> std::io::Result<Self> {
        let state = StubState {
            replies: Arc::new(Mutex::new(replies.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let requests = state.requests.clone();
        let app = Router::new().fallback(answer).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self {
            base: format!("http://{addr}"),
            requests,
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn answer(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path_and_query: uri
            .path_and_query()
            .map(ToString::to_string)
            .unwrap_or_default(),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_str(&body).unwrap_or(Value::Null),
    });
    let (status, reply) = state
        .replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((500, "script exhausted".to_string()));
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        reply,
    )
}
