use std::sync::Arc;

use tokio::time::Instant;
use tracing::{error, info, instrument, warn};
use tryon_contracts::api::{
    EditRequest, FaceSwapRequest, OperationResult, TryOnRequest, VideoRequest,
};
use tryon_contracts::artifacts::MediaType;
use tryon_contracts::events::{EventLog, OperationEvent};
use tryon_contracts::history::{ActionKind, EditHistoryEntry};

use crate::config::StudioConfig;
use crate::error::StudioResult;
use crate::fallback::{run_with_fallback, FaceSwapJob, GenerativeTransfer, IdentityTransfer};
use crate::gemini::{generate_image, ContentPart, ContentRequest, GeminiClient, GenerativeModel};
use crate::jobs::{JobInput, JobPoller, JobQueueApi, JobSubmitter};
use crate::normalize::{ArtifactNormalizer, Delivery, HttpMediaFetcher, MediaFetcher};
use crate::prompts::{
    edit_instruction, refinement_instruction, try_on_instruction, DEFAULT_VIDEO_PROMPT,
};
use crate::refine::{MultiPassRefiner, RefinementPlan};
use crate::replicate::ReplicateClient;
use crate::validate::{optional_text, require_image, require_text};

/// Operation entry points. Built once per process and shared; holds no
/// per-request state.
pub struct Studio {
    config: StudioConfig,
    queue: Arc<dyn JobQueueApi>,
    model: Arc<dyn GenerativeModel>,
    fetcher: Arc<dyn MediaFetcher>,
    events: Option<EventLog>,
}

impl Studio {
    /// Real HTTP providers, plus the event log when `events_path` is set.
    pub fn from_config(config: StudioConfig) -> Self {
        let http = reqwest::Client::new();
        let queue = Arc::new(ReplicateClient::from_config(&config, http.clone()));
        let model = Arc::new(GeminiClient::from_config(&config, http.clone()));
        let fetcher = Arc::new(HttpMediaFetcher::new(http));
        let events = config.events_path.clone().map(EventLog::new);
        let studio = Self::with_backends(config, queue, model, fetcher);
        match events {
            Some(events) => studio.with_events(events),
            None => studio,
        }
    }

    pub fn with_backends(
        config: StudioConfig,
        queue: Arc<dyn JobQueueApi>,
        model: Arc<dyn GenerativeModel>,
        fetcher: Arc<dyn MediaFetcher>,
    ) -> Self {
        Self {
            config,
            queue,
            model,
            fetcher,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    #[instrument(skip_all, name = "try_on")]
    pub async fn try_on(&self, request: &TryOnRequest) -> StudioResult<OperationResult> {
        let started = Instant::now();
        let result = self.run_try_on(request).await;
        self.finish(ActionKind::TryOn, started, result)
    }

    #[instrument(skip_all, name = "edit")]
    pub async fn edit(&self, request: &EditRequest) -> StudioResult<OperationResult> {
        let started = Instant::now();
        let result = self.run_edit(request).await;
        self.finish(ActionKind::Edit, started, result)
    }

    #[instrument(skip_all, name = "face_swap")]
    pub async fn face_swap(&self, request: &FaceSwapRequest) -> StudioResult<OperationResult> {
        let started = Instant::now();
        let result = self.run_face_swap(request).await;
        self.finish(ActionKind::FaceSwap, started, result)
    }

    #[instrument(skip_all, name = "generate_video")]
    pub async fn generate_video(&self, request: &VideoRequest) -> StudioResult<OperationResult> {
        let started = Instant::now();
        let result = self.run_video(request).await;
        self.finish(ActionKind::Video, started, result)
    }

    async fn run_try_on(&self, request: &TryOnRequest) -> StudioResult<OperationResult> {
        let api_key = self.config.require_gemini_key()?;
        let model_image = require_image("modelImage", request.model_image.as_deref())?;
        let clothing_image = require_image("clothingImage", request.clothing_image.as_deref())?;
        let extra = optional_text(request.instructions.as_deref());

        let garment = ContentPart::image(clothing_image)?;
        let initial = vec![
            ContentPart::image(model_image)?,
            garment.clone(),
            ContentPart::text(try_on_instruction(&request.options, extra)),
        ];
        let plan = RefinementPlan::new(request.refine_enabled(), request.clamped_passes());
        let model_name = self.config.image_model.as_str();
        let options = request.options;
        let refined = MultiPassRefiner::new(self.model.as_ref(), api_key)
            .run(model_name, initial, &garment, plan, |pass, total| {
                refinement_instruction(&options, pass, total, extra)
            })
            .await?;

        let prompt = extra.unwrap_or("virtual try-on");
        let mut result = OperationResult::new(EditHistoryEntry::new(
            ActionKind::TryOn,
            prompt,
            model_name,
            refined.artifact,
        ));
        result.refinement = Some(refined.summary);
        result.model_text = refined.model_text;
        Ok(result)
    }

    async fn run_edit(&self, request: &EditRequest) -> StudioResult<OperationResult> {
        let api_key = self.config.require_gemini_key()?;
        let base_image = require_image("baseImage", request.base_image.as_deref())?;
        let prompt = require_text("prompt", request.prompt.as_deref())?;
        let strength = request.clamped_strength();

        let model_name = self.config.image_model.as_str();
        let content = ContentRequest::new(
            model_name,
            vec![
                ContentPart::image(base_image)?,
                ContentPart::text(edit_instruction(prompt, strength)),
            ],
        );
        let generated = generate_image(self.model.as_ref(), api_key, &content).await?;
        let mut result = OperationResult::new(
            EditHistoryEntry::new(ActionKind::Edit, prompt, model_name, generated.artifact)
                .with_strength(strength),
        );
        result.model_text = generated.text;
        Ok(result)
    }

    async fn run_face_swap(&self, request: &FaceSwapRequest) -> StudioResult<OperationResult> {
        let api_token = self.config.require_replicate_token()?;
        let model_version = self.config.require_face_swap_model()?;
        let source = require_image("sourceImage", request.source_image.as_deref())?;
        let target = require_image("targetImage", request.target_image.as_deref())?;

        let primary = FaceSwapJob {
            queue: self.queue.as_ref(),
            fetcher: self.fetcher.as_ref(),
            api_token,
            model_version: model_version.as_str(),
            poll: self.config.poll,
        };
        let secondary = self
            .config
            .gemini_api_key
            .as_deref()
            .map(|api_key| GenerativeTransfer {
                model: self.model.as_ref(),
                api_key,
                model_name: self.config.image_model.as_str(),
            });
        let transfer = run_with_fallback(
            &primary,
            secondary.as_ref().map(|strategy| strategy as &dyn IdentityTransfer),
            source,
            target,
        )
        .await?;

        let mut result = OperationResult::new(EditHistoryEntry::new(
            ActionKind::FaceSwap,
            "face swap",
            transfer.model_name,
            transfer.artifact,
        ));
        result.strategy = Some(transfer.outcome);
        Ok(result)
    }

    async fn run_video(&self, request: &VideoRequest) -> StudioResult<OperationResult> {
        let api_token = self.config.require_replicate_token()?;
        let model_version = self.config.require_video_model()?;
        let image = require_image("image", request.image.as_deref())?;
        let prompt = optional_text(request.prompt.as_deref()).unwrap_or(DEFAULT_VIDEO_PROMPT);

        let input = JobInput::new().image("image", image).param("prompt", prompt);
        let mut job = JobSubmitter::new(self.queue.as_ref())
            .submit(Some(api_token), model_version.as_str(), &input)
            .await?;
        let output = JobPoller::new(self.queue.as_ref(), self.config.video_poll)
            .wait(api_token, &mut job)
            .await?;
        let delivery = if self.config.video_inline {
            Delivery::Inline
        } else {
            Delivery::Url
        };
        let artifact = ArtifactNormalizer::new(self.fetcher.as_ref())
            .normalize(&output, MediaType::Mp4, delivery)
            .await?;

        Ok(OperationResult::new(EditHistoryEntry::new(
            ActionKind::Video,
            prompt,
            model_version.as_str(),
            artifact,
        )))
    }

    fn finish(
        &self,
        action: ActionKind,
        started: Instant,
        result: StudioResult<OperationResult>,
    ) -> StudioResult<OperationResult> {
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(mut output) => {
                output.entry.duration_ms = duration_ms;
                info!(
                    action = ?action,
                    model = %output.entry.model_name,
                    duration_ms,
                    "operation succeeded"
                );
                self.record(OperationEvent::OperationSucceeded {
                    action,
                    entry_id: output.entry.id.clone(),
                    model: output.entry.model_name.clone(),
                    media_type: output.entry.artifact.media_type.clone(),
                    duration_ms,
                    refinement: output.refinement,
                    strategy: output.strategy,
                });
                Ok(output)
            }
            Err(err) => {
                if err.is_local() {
                    warn!(action = ?action, error = %err, "operation rejected");
                } else {
                    error!(action = ?action, error = %err, duration_ms, "operation failed");
                }
                self.record(OperationEvent::OperationFailed {
                    action,
                    error: err.to_string(),
                    code: err.user_message().code().to_string(),
                    duration_ms,
                });
                Err(err)
            }
        }
    }

    fn record(&self, event: OperationEvent) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = events.record(&event) {
            warn!(error = %err, path = %events.path().display(), "event log write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use serde_json::{json, Value};
    use tempfile::tempdir;
    use tryon_contracts::api::{
        EditRequest, FaceSwapRequest, IdentityStrategy, TryOnRequest, VideoRequest,
    };
    use tryon_contracts::artifacts::{ArtifactEncoding, MediaType};
    use tryon_contracts::events::EventLog;
    use tryon_contracts::history::ActionKind;
    use tryon_contracts::jobs::JobStatus;

    use super::Studio;
    use crate::config::StudioConfig;
    use crate::error::{ErrorKind, StudioError};
    use crate::testing::{
        failed_snapshot, image_reply, snapshot, text_reply, FakeFetcher, ScriptedModel,
        ScriptedQueue,
    };

    struct Harness {
        studio: Studio,
        queue: Arc<ScriptedQueue>,
        model: Arc<ScriptedModel>,
        fetcher: Arc<FakeFetcher>,
    }

    fn harness(config: StudioConfig, queue: ScriptedQueue, model: ScriptedModel) -> Harness {
        let queue = Arc::new(queue);
        let model = Arc::new(model);
        let fetcher = Arc::new(FakeFetcher::serving(b"\x89PNG\r\n".to_vec()));
        let studio = Studio::with_backends(config, queue.clone(), model.clone(), fetcher.clone());
        Harness {
            studio,
            queue,
            model,
            fetcher,
        }
    }

    fn configured() -> StudioConfig {
        StudioConfig {
            replicate_api_token: Some("r8_token".to_string()),
            gemini_api_key: Some("g-key".to_string()),
            video_model_version: Some("acme/animate:v2".to_string()),
            ..StudioConfig::default()
        }
    }

    fn try_on_request(passes: u32) -> TryOnRequest {
        TryOnRequest {
            model_image: Some("iVBORperson".to_string()),
            clothing_image: Some("/9j/garment".to_string()),
            refinement_passes: Some(passes),
            ..TryOnRequest::default()
        }
    }

    fn face_swap_request() -> FaceSwapRequest {
        FaceSwapRequest {
            source_image: Some("iVBORface".to_string()),
            target_image: Some("/9j/scene".to_string()),
        }
    }

    #[tokio::test]
    async fn missing_credentials_block_every_entry_point_before_any_call() {
        let h = harness(
            StudioConfig::default(),
            ScriptedQueue::new(vec![]),
            ScriptedModel::new(vec![]),
        );
        let edit = EditRequest {
            base_image: Some("iVBOR".to_string()),
            prompt: Some("add a hat".to_string()),
            strength: None,
        };
        let video = VideoRequest {
            image: Some("iVBOR".to_string()),
            prompt: None,
        };

        let errors = vec![
            h.studio.try_on(&try_on_request(1)).await.unwrap_err(),
            h.studio.edit(&edit).await.unwrap_err(),
            h.studio.face_swap(&face_swap_request()).await.unwrap_err(),
            h.studio.generate_video(&video).await.unwrap_err(),
        ];
        for err in errors {
            assert_eq!(err.kind(), ErrorKind::Configuration, "{err}");
        }
        assert_eq!(h.queue.calls(), 0);
        assert_eq!(h.model.calls(), 0);
        assert!(h.fetcher.urls().is_empty());
    }

    #[tokio::test]
    async fn face_swap_needs_queue_token_even_with_model_key() {
        let config = StudioConfig {
            gemini_api_key: Some("g-key".to_string()),
            ..StudioConfig::default()
        };
        let h = harness(config, ScriptedQueue::new(vec![]), ScriptedModel::new(vec![]));
        let err = h.studio.face_swap(&face_swap_request()).await.unwrap_err();
        assert!(err.to_string().contains("REPLICATE_API_TOKEN"));
        assert_eq!(h.model.calls(), 0);
    }

    #[tokio::test]
    async fn missing_images_are_validation_errors_without_calls() {
        let h = harness(configured(), ScriptedQueue::new(vec![]), ScriptedModel::new(vec![]));
        let request = TryOnRequest {
            clothing_image: None,
            ..try_on_request(1)
        };
        let err = h.studio.try_on(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("clothingImage"));

        let err = h
            .studio
            .face_swap(&FaceSwapRequest {
                target_image: Some("  ".to_string()),
                ..face_swap_request()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(h.queue.calls(), 0);
        assert_eq!(h.model.calls(), 0);
    }

    #[tokio::test]
    async fn try_on_reports_completed_refinement_passes() -> anyhow::Result<()> {
        let h = harness(
            configured(),
            ScriptedQueue::new(vec![]),
            ScriptedModel::new(vec![
                image_reply("iVBORinitial"),
                image_reply("iVBORpass1"),
                image_reply("iVBORpass2"),
            ]),
        );
        let result = h.studio.try_on(&try_on_request(2)).await?;
        assert_eq!(result.entry.action_kind, ActionKind::TryOn);
        assert_eq!(result.entry.artifact.payload, "iVBORpass2");
        assert_eq!(result.entry.model_name, "gemini-2.5-flash-image");
        let summary = result.refinement.unwrap_or_default();
        assert_eq!(summary.completed_passes, 2);
        assert_eq!(summary.requested_passes, 2);
        Ok(())
    }

    #[tokio::test]
    async fn try_on_without_image_surfaces_model_text() {
        let h = harness(
            configured(),
            ScriptedQueue::new(vec![]),
            ScriptedModel::new(vec![text_reply("face not detected")]),
        );
        let err = h.studio.try_on(&try_on_request(2)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoOutput);
        assert!(err.to_string().contains("face not detected"));
    }

    #[tokio::test]
    async fn edit_records_clamped_strength() -> anyhow::Result<()> {
        let h = harness(
            configured(),
            ScriptedQueue::new(vec![]),
            ScriptedModel::new(vec![image_reply("iVBORedited")]),
        );
        let request = EditRequest {
            base_image: Some("data:image/png;base64,iVBORbase".to_string()),
            prompt: Some("add a red scarf".to_string()),
            strength: Some(3.0),
        };
        let result = h.studio.edit(&request).await?;
        assert_eq!(result.entry.strength, Some(1.0));
        assert_eq!(result.entry.prompt, "add a red scarf");
        assert_eq!(h.model.calls(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn failed_face_swap_job_falls_back_to_model() -> anyhow::Result<()> {
        let h = harness(
            configured(),
            ScriptedQueue::new(vec![
                snapshot("p-1", JobStatus::Starting, json!(null)),
                failed_snapshot("p-1", "no face found in source"),
            ]),
            ScriptedModel::new(vec![image_reply("iVBORswapped")]),
        );
        let result = h.studio.face_swap(&face_swap_request()).await?;
        let outcome = result.strategy.expect("strategy recorded");
        assert_eq!(outcome.strategy, IdentityStrategy::GenerativeTransfer);
        assert!(outcome.fallback_used);
        assert_eq!(result.entry.artifact.payload, "iVBORswapped");
        assert_eq!(h.model.calls(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn face_swap_without_model_key_reports_primary_error() {
        let config = StudioConfig {
            gemini_api_key: None,
            ..configured()
        };
        let h = harness(
            config,
            ScriptedQueue::new(vec![
                snapshot("p-1", JobStatus::Starting, json!(null)),
                failed_snapshot("p-1", "no face found in source"),
            ]),
            ScriptedModel::new(vec![]),
        );
        let err = h.studio.face_swap(&face_swap_request()).await.unwrap_err();
        assert!(matches!(err, StudioError::JobFailed { .. }));
        assert!(err.to_string().contains("no face found"));
        assert_eq!(h.model.calls(), 0);
    }

    #[tokio::test]
    async fn malformed_face_swap_version_fails_without_fallback() {
        let config = StudioConfig {
            face_swap_model_version: Some("face-swap-latest".to_string()),
            ..configured()
        };
        let h = harness(
            config,
            ScriptedQueue::new(vec![]),
            ScriptedModel::new(vec![image_reply("iVBORswapped")]),
        );
        let err = h.studio.face_swap(&face_swap_request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("FACE_SWAP_MODEL_VERSION"));
        assert_eq!(h.queue.calls(), 0);
        assert_eq!(h.model.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn video_is_delivered_as_url_by_default() -> anyhow::Result<()> {
        let h = harness(
            configured(),
            ScriptedQueue::new(vec![
                snapshot("v-1", JobStatus::Starting, json!(null)),
                snapshot("v-1", JobStatus::Processing, json!(null)),
                snapshot("v-1", JobStatus::Succeeded, json!("https://cdn/clip.mp4")),
            ]),
            ScriptedModel::new(vec![]),
        );
        let request = VideoRequest {
            image: Some("iVBORstill".to_string()),
            prompt: None,
        };
        let result = h.studio.generate_video(&request).await?;
        let artifact = &result.entry.artifact;
        assert_eq!(artifact.encoding, ArtifactEncoding::Url);
        assert_eq!(artifact.media_type, MediaType::Mp4);
        assert_eq!(artifact.payload, "https://cdn/clip.mp4");
        assert_eq!(result.entry.model_name, "acme/animate:v2");
        assert!(h.fetcher.urls().is_empty());
        let sent = h.queue.created_inputs();
        assert_eq!(sent[0]["start_image"], json!("data:image/png;base64,iVBORstill"));
        Ok(())
    }

    #[tokio::test]
    async fn video_without_model_version_is_a_configuration_error() {
        let config = StudioConfig {
            video_model_version: None,
            ..configured()
        };
        let h = harness(config, ScriptedQueue::new(vec![]), ScriptedModel::new(vec![]));
        let request = VideoRequest {
            image: Some("iVBOR".to_string()),
            prompt: None,
        };
        let err = h.studio.generate_video(&request).await.unwrap_err();
        assert!(err.to_string().contains("VIDEO_MODEL_VERSION"));
        assert_eq!(h.queue.calls(), 0);
    }

    #[tokio::test]
    async fn outcomes_are_written_to_the_event_log() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let path = temp.path().join("events.jsonl");
        let h = harness(
            configured(),
            ScriptedQueue::new(vec![]),
            ScriptedModel::new(vec![image_reply("iVBORedited")]),
        );
        let studio = h.studio.with_events(EventLog::with_session(&path, "s-1"));
        let request = EditRequest {
            base_image: Some("iVBORbase".to_string()),
            prompt: Some("add a hat".to_string()),
            strength: None,
        };
        studio.edit(&request).await?;
        let _ = studio.edit(&EditRequest::default()).await;

        let lines: Vec<Value> = fs::read_to_string(&path)?
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], json!("operation_succeeded"));
        assert_eq!(lines[0]["action"], json!("edit"));
        assert_eq!(lines[0]["session_id"], json!("s-1"));
        assert_eq!(lines[1]["type"], json!("operation_failed"));
        assert_eq!(lines[1]["code"], json!("invalid_input"));
        Ok(())
    }
}
