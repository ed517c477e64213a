use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};
use tryon_contracts::artifacts::ensure_data_url;
use tryon_contracts::jobs::{JobSnapshot, JobStatus, RawOutput};
use tryon_contracts::models::ModelVersionId;

use crate::config::PollSettings;
use crate::error::{StudioError, StudioResult};

/// External job-queue API: create a job, then read its status by id.
#[async_trait]
pub trait JobQueueApi: Send + Sync {
    fn name(&self) -> &str;

    async fn create_job(
        &self,
        api_token: &str,
        version: &ModelVersionId,
        input: &Map<String, Value>,
    ) -> StudioResult<JobSnapshot>;

    async fn fetch_job(&self, api_token: &str, job_id: &str) -> StudioResult<JobSnapshot>;
}

/// Alternate field names sent next to each canonical image field. Models on
/// the same queue disagree on naming; the fan-out stays at this boundary.
const IMAGE_FIELD_ALIASES: &[(&str, &[&str])] = &[
    ("source_image", &["source", "swap_image"]),
    ("target_image", &["target", "input_image"]),
    ("image", &["input_image", "start_image"]),
];

/// Caller-side job input with canonical field names only.
#[derive(Debug, Clone, Default)]
pub struct JobInput {
    images: Vec<(String, String)>,
    params: Map<String, Value>,
}

impl JobInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(mut self, field: &str, value: impl Into<String>) -> Self {
        self.images.push((field.to_string(), value.into()));
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn has_images(&self) -> bool {
        self.images.iter().any(|(_, value)| !value.trim().is_empty())
    }

    /// Request body `input` object: images as data URLs under their canonical
    /// name plus every alias not already taken, then the free parameters.
    pub fn to_provider_input(&self) -> Map<String, Value> {
        let mut input = Map::new();
        for (field, value) in &self.images {
            input.insert(field.clone(), Value::String(ensure_data_url(value)));
        }
        for (field, value) in &self.images {
            let Some((_, aliases)) = IMAGE_FIELD_ALIASES
                .iter()
                .find(|(canonical, _)| canonical == field)
            else {
                continue;
            };
            for alias in *aliases {
                if input.contains_key(*alias) {
                    continue;
                }
                input.insert(alias.to_string(), Value::String(ensure_data_url(value)));
            }
        }
        for (key, value) in &self.params {
            if input.contains_key(key) {
                continue;
            }
            input.insert(key.clone(), value.clone());
        }
        input
    }
}

/// One in-flight external job. Lives only for the request that created it.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub id: String,
    pub provider: String,
    pub status: JobStatus,
    /// Taken before the create call; the poll deadline counts from here.
    pub submitted: Instant,
    pub raw_output: RawOutput,
    pub error_detail: Option<String>,
}

impl GenerationJob {
    pub fn from_snapshot(provider: &str, snapshot: JobSnapshot, submitted: Instant) -> Self {
        let mut job = Self {
            id: snapshot.id.clone(),
            provider: provider.to_string(),
            status: JobStatus::Queued,
            submitted,
            raw_output: RawOutput::Absent,
            error_detail: None,
        };
        job.observe(snapshot);
        job
    }

    /// Applies a fresh status reading. Terminal states are final: a reading
    /// that arrives after one is ignored and `false` is returned.
    pub fn observe(&mut self, snapshot: JobSnapshot) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = snapshot.status;
        self.raw_output = snapshot.output;
        self.error_detail = match snapshot.status {
            JobStatus::Failed | JobStatus::Canceled => snapshot.error,
            _ => None,
        };
        true
    }
}

pub struct JobSubmitter<'a> {
    queue: &'a dyn JobQueueApi,
}

impl<'a> JobSubmitter<'a> {
    pub fn new(queue: &'a dyn JobQueueApi) -> Self {
        Self { queue }
    }

    /// Credential and model identifier are checked before anything is sent.
    /// Rejections are returned as-is; retrying is the caller's call.
    #[instrument(skip_all, fields(provider = %self.queue.name(), model = %model_version))]
    pub async fn submit(
        &self,
        api_token: Option<&str>,
        model_version: &str,
        input: &JobInput,
    ) -> StudioResult<GenerationJob> {
        let api_token = api_token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                StudioError::configuration(format!(
                    "{} API token is not set; add it to the server environment.",
                    self.queue.name()
                ))
            })?;
        let version = ModelVersionId::parse(model_version).map_err(StudioError::Configuration)?;
        if !input.has_images() {
            return Err(StudioError::validation(
                "job input needs at least one image",
            ));
        }

        let submitted = Instant::now();
        let snapshot = self
            .queue
            .create_job(api_token, &version, &input.to_provider_input())
            .await?;
        let job = GenerationJob::from_snapshot(self.queue.name(), snapshot, submitted);
        info!(job_id = %job.id, status = %job.status, "job submitted");
        Ok(job)
    }
}

pub struct JobPoller<'a> {
    queue: &'a dyn JobQueueApi,
    settings: PollSettings,
}

impl<'a> JobPoller<'a> {
    pub fn new(queue: &'a dyn JobQueueApi, settings: PollSettings) -> Self {
        Self { queue, settings }
    }

    /// Drives the job to a terminal state and returns its canonical output.
    ///
    /// The deadline counts from submission. Each round is one status fetch
    /// followed by one fixed sleep; nothing is fetched once the job is
    /// terminal.
    #[instrument(skip_all, fields(provider = %job.provider, job_id = %job.id))]
    pub async fn wait(&self, api_token: &str, job: &mut GenerationJob) -> StudioResult<String> {
        loop {
            if job.status.is_terminal() {
                return settle(job);
            }
            let elapsed = job.submitted.elapsed();
            if elapsed > self.settings.timeout {
                warn!(
                    elapsed_s = elapsed.as_secs_f64(),
                    status = %job.status,
                    "job polling deadline exceeded"
                );
                return Err(StudioError::Timeout {
                    provider: job.provider.clone(),
                    job_id: job.id.clone(),
                    elapsed,
                });
            }

            let snapshot = self.queue.fetch_job(api_token, &job.id).await?;
            job.observe(snapshot);
            debug!(status = %job.status, elapsed_s = elapsed.as_secs_f64(), "job polled");
            if job.status.is_terminal() {
                return settle(job);
            }
            sleep(self.settings.interval).await;
        }
    }
}

fn settle(job: &GenerationJob) -> StudioResult<String> {
    match job.status {
        JobStatus::Succeeded => {
            let output = job.raw_output.canonical().map(str::to_string).ok_or_else(|| {
                StudioError::NoOutput(format!(
                    "{} job {} succeeded without an output",
                    job.provider, job.id
                ))
            })?;
            info!(job_id = %job.id, "job succeeded");
            Ok(output)
        }
        status => Err(StudioError::JobFailed {
            provider: job.provider.clone(),
            job_id: job.id.clone(),
            status,
            detail: job
                .error_detail
                .clone()
                .unwrap_or_else(|| "no error detail provided".to_string()),
        }),
    }
}
