use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::models::quality::{
    Directive, GenerationParameter, RetryRecommendation, RetryStrategy,
};

/// Amount an `increase` directive adds to a guidance knob.
pub const ADJUSTMENT_STEP: f64 = 0.1;

/// Parameters sent to the generation provider for one attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct GenerationParams {
    #[garde(length(min = 1, max = 2000))]
    pub prompt: String,
    #[garde(range(min = 0.0, max = 1.0))]
    pub reference_strength: f64,
    #[garde(range(min = 0.0, max = 1.0))]
    pub pose_guidance: f64,
    #[garde(range(min = 0.0, max = 1.0))]
    pub color_guidance: f64,
    #[garde(range(min = 0.0, max = 1.0))]
    pub style_strength: f64,
    #[garde(range(min = 0.0, max = 1.0))]
    pub product_reference_weight: f64,
    #[garde(skip)]
    pub face_restoration: bool,
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub seed: Option<u64>,
}

impl GenerationParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            reference_strength: 0.7,
            pose_guidance: 0.5,
            color_guidance: 0.5,
            style_strength: 0.6,
            product_reference_weight: 0.6,
            face_restoration: false,
            seed: None,
        }
    }

    /// Apply the advisory directives of a retry recommendation.
    ///
    /// A complete regeneration also drops the seed so the provider samples a
    /// fresh composition.
    pub fn apply(&mut self, recommendation: &RetryRecommendation) {
        for directives in recommendation.parameter_adjustments.values() {
            for (parameter, directive) in directives {
                self.adjust(*parameter, *directive);
            }
        }
        if recommendation.strategy == RetryStrategy::CompleteRegeneration {
            self.seed = None;
        }
    }

    fn adjust(&mut self, parameter: GenerationParameter, directive: Directive) {
        let knob = match parameter {
            GenerationParameter::FaceRestoration => {
                self.face_restoration = true;
                return;
            }
            GenerationParameter::ReferenceStrength => &mut self.reference_strength,
            GenerationParameter::PoseGuidance => &mut self.pose_guidance,
            GenerationParameter::ColorGuidance => &mut self.color_guidance,
            GenerationParameter::StyleStrength => &mut self.style_strength,
            GenerationParameter::ProductReferenceWeight => &mut self.product_reference_weight,
        };
        match directive {
            Directive::Increase => *knob = (*knob + ADJUSTMENT_STEP).min(1.0),
            Directive::Enable => *knob = knob.max(ADJUSTMENT_STEP),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReferenceRole {
    Model,
    Product,
}

/// An uploaded reference image.
#[derive(Debug, Clone)]
pub struct ReferenceImage {
    pub role: ReferenceRole,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Generated image bytes returned by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Metadata portion of a generation upload.
#[derive(Debug, Deserialize, Validate)]
pub struct GenerateRequest {
    #[garde(length(min = 1, max = 2000))]
    pub prompt: String,

    #[garde(length(min = 1, max = 16))]
    pub priority: Option<String>,

    #[garde(length(min = 1, max = 32))]
    pub tier: Option<String>,
}

/// Response after submitting a generation request.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub run_id: uuid::Uuid,
    pub job_id: uuid::Uuid,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    pub message: String,
}
