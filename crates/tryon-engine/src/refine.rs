use tracing::{info, instrument, warn};
use tryon_contracts::api::{RefinementSummary, MAX_REFINEMENT_PASSES};
use tryon_contracts::artifacts::GenerationArtifact;

use crate::error::StudioResult;
use crate::gemini::{generate_image, ContentPart, ContentRequest, GenerativeModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefinementPlan {
    pub enabled: bool,
    pub passes: u32,
}

impl RefinementPlan {
    pub fn new(enabled: bool, passes: u32) -> Self {
        Self {
            enabled,
            passes: passes.min(MAX_REFINEMENT_PASSES),
        }
    }

    fn effective_passes(&self) -> u32 {
        if self.enabled {
            self.passes
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefinedImage {
    pub artifact: GenerationArtifact,
    pub model_text: Option<String>,
    pub summary: RefinementSummary,
}

/// Initial generation followed by up to three refinement passes, each fed the
/// previous result plus the untouched reference image.
pub struct MultiPassRefiner<'a> {
    model: &'a dyn GenerativeModel,
    api_key: &'a str,
}

impl<'a> MultiPassRefiner<'a> {
    pub fn new(model: &'a dyn GenerativeModel, api_key: &'a str) -> Self {
        Self { model, api_key }
    }

    /// The initial call must produce an image or the whole run fails. A failed
    /// pass ends the chain and the last good image is returned as success.
    #[instrument(skip_all, fields(model = %model_name, passes = plan.effective_passes()))]
    pub async fn run(
        &self,
        model_name: &str,
        initial_parts: Vec<ContentPart>,
        reference: &ContentPart,
        plan: RefinementPlan,
        pass_instruction: impl Fn(u32, u32) -> String,
    ) -> StudioResult<RefinedImage> {
        let initial = ContentRequest::new(model_name, initial_parts);
        let first = generate_image(self.model, self.api_key, &initial).await?;
        let mut current = first.artifact;
        let mut model_text = first.text;

        let total = plan.effective_passes();
        let mut completed = 0;
        for pass in 1..=total {
            let parts = match ContentPart::from_artifact(&current) {
                Ok(previous) => vec![
                    previous,
                    reference.clone(),
                    ContentPart::text(pass_instruction(pass, total)),
                ],
                Err(err) => {
                    warn!(pass, error = %err, "refinement stopped");
                    break;
                }
            };
            let request = ContentRequest::new(model_name, parts);
            match generate_image(self.model, self.api_key, &request).await {
                Ok(refined) => {
                    current = refined.artifact;
                    if refined.text.is_some() {
                        model_text = refined.text;
                    }
                    completed = pass;
                }
                Err(err) => {
                    warn!(pass, completed, error = %err, "refinement pass failed; keeping last result");
                    break;
                }
            }
        }

        info!(requested = total, completed, "generation finished");
        Ok(RefinedImage {
            artifact: current,
            model_text,
            summary: RefinementSummary {
                requested: plan.enabled,
                requested_passes: total,
                completed_passes: completed,
            },
        })
    }
}
