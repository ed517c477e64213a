use async_trait::async_trait;
use tracing::{info, instrument, warn};
use tryon_contracts::api::{IdentityStrategy, StrategyOutcome};
use tryon_contracts::artifacts::{GenerationArtifact, MediaType};

use crate::config::PollSettings;
use crate::error::StudioResult;
use crate::gemini::{generate_image, ContentPart, ContentRequest, GenerativeModel};
use crate::jobs::{JobInput, JobPoller, JobQueueApi, JobSubmitter};
use crate::normalize::{ArtifactNormalizer, Delivery, MediaFetcher};
use crate::prompts::identity_transfer_instruction;

/// One way of putting the source face onto the target image.
#[async_trait]
pub trait IdentityTransfer: Send + Sync {
    fn strategy(&self) -> IdentityStrategy;

    fn model_name(&self) -> &str;

    async fn transfer(&self, source: &str, target: &str) -> StudioResult<GenerationArtifact>;
}

/// Face swap model on the job queue: submit, poll, fetch as PNG.
pub struct FaceSwapJob<'a> {
    pub queue: &'a dyn JobQueueApi,
    pub fetcher: &'a dyn MediaFetcher,
    pub api_token: &'a str,
    pub model_version: &'a str,
    pub poll: PollSettings,
}

#[async_trait]
impl<'a> IdentityTransfer for FaceSwapJob<'a> {
    fn strategy(&self) -> IdentityStrategy {
        IdentityStrategy::FaceSwapJob
    }

    fn model_name(&self) -> &str {
        self.model_version
    }

    async fn transfer(&self, source: &str, target: &str) -> StudioResult<GenerationArtifact> {
        let input = JobInput::new()
            .image("source_image", source)
            .image("target_image", target);
        let mut job = JobSubmitter::new(self.queue)
            .submit(Some(self.api_token), self.model_version, &input)
            .await?;
        let output = JobPoller::new(self.queue, self.poll)
            .wait(self.api_token, &mut job)
            .await?;
        ArtifactNormalizer::new(self.fetcher)
            .normalize(&output, MediaType::Png, Delivery::Inline)
            .await
    }
}

/// Identity transfer through the synchronous image model.
pub struct GenerativeTransfer<'a> {
    pub model: &'a dyn GenerativeModel,
    pub api_key: &'a str,
    pub model_name: &'a str,
}

#[async_trait]
impl<'a> IdentityTransfer for GenerativeTransfer<'a> {
    fn strategy(&self) -> IdentityStrategy {
        IdentityStrategy::GenerativeTransfer
    }

    fn model_name(&self) -> &str {
        self.model_name
    }

    async fn transfer(&self, source: &str, target: &str) -> StudioResult<GenerationArtifact> {
        let request = ContentRequest::new(
            self.model_name,
            vec![
                ContentPart::image(target)?,
                ContentPart::image(source)?,
                ContentPart::text(identity_transfer_instruction()),
            ],
        );
        let generated = generate_image(self.model, self.api_key, &request).await?;
        Ok(generated.artifact)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferOutcome {
    pub artifact: GenerationArtifact,
    pub model_name: String,
    pub outcome: StrategyOutcome,
}

/// Primary first; on a provider failure the secondary gets exactly one
/// attempt with the same inputs. When both fail the secondary's error is
/// returned. Configuration and validation errors are returned as-is.
#[instrument(skip_all, fields(primary = ?primary.strategy()))]
pub async fn run_with_fallback(
    primary: &dyn IdentityTransfer,
    secondary: Option<&dyn IdentityTransfer>,
    source: &str,
    target: &str,
) -> StudioResult<TransferOutcome> {
    let primary_error = match primary.transfer(source, target).await {
        Ok(artifact) => {
            return Ok(TransferOutcome {
                artifact,
                model_name: primary.model_name().to_string(),
                outcome: StrategyOutcome {
                    strategy: primary.strategy(),
                    fallback_used: false,
                },
            })
        }
        Err(err) if err.is_local() => return Err(err),
        Err(err) => err,
    };

    let Some(secondary) = secondary else {
        warn!(error = %primary_error, "primary strategy failed; no fallback configured");
        return Err(primary_error);
    };
    warn!(
        error = %primary_error,
        fallback = ?secondary.strategy(),
        "primary strategy failed; trying fallback"
    );
    let artifact = secondary.transfer(source, target).await?;
    info!(strategy = ?secondary.strategy(), "fallback strategy succeeded");
    Ok(TransferOutcome {
        artifact,
        model_name: secondary.model_name().to_string(),
        outcome: StrategyOutcome {
            strategy: secondary.strategy(),
            fallback_used: true,
        },
    })
}
