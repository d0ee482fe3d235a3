use std::collections::BTreeMap;

use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// One scored aspect of a generated try-on image.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Dimension {
    Face,
    Pose,
    Color,
    Style,
    Branding,
}

impl Dimension {
    pub fn group(self) -> ScoreGroup {
        match self {
            Self::Face | Self::Pose => ScoreGroup::Consistency,
            Self::Color | Self::Style | Self::Branding => ScoreGroup::Accuracy,
        }
    }
}

/// Scorer sub-validators: model consistency (face, pose) and product
/// accuracy (color, style, branding).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScoreGroup {
    Consistency,
    Accuracy,
}

impl ScoreGroup {
    pub fn dimensions(self) -> &'static [Dimension] {
        match self {
            Self::Consistency => &[Dimension::Face, Dimension::Pose],
            Self::Accuracy => &[Dimension::Color, Dimension::Style, Dimension::Branding],
        }
    }
}

/// Named threshold preset.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Tier {
    #[default]
    Standard,
    Premium,
    Ultra,
}

impl Tier {
    /// Resolve a tier by name. Unknown names fall back to `Standard`.
    pub fn from_name(name: &str) -> Self {
        name.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(tier = %name, "Unknown quality tier, falling back to standard");
            Self::Standard
        })
    }
}

/// Minimum scores for one tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TierThresholds {
    pub overall: f64,
    pub face: f64,
    pub pose: f64,
    pub color: f64,
    pub style: f64,
    pub branding: f64,
}

impl TierThresholds {
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Face => self.face,
            Dimension::Pose => self.pose,
            Dimension::Color => self.color,
            Dimension::Style => self.style,
            Dimension::Branding => self.branding,
        }
    }

    pub fn set(&mut self, dimension: Dimension, value: f64) {
        match dimension {
            Dimension::Face => self.face = value,
            Dimension::Pose => self.pose = value,
            Dimension::Color => self.color = value,
            Dimension::Style => self.style = value,
            Dimension::Branding => self.branding = value,
        }
    }
}

/// Active quality gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityConfig {
    pub tier: Tier,
    pub thresholds: TierThresholds,
    pub consistency_weight: f64,
    pub accuracy_weight: f64,
    pub strict_mode: bool,
    pub enable_detailed_feedback: bool,
    pub enable_retry_recommendations: bool,
}

/// Partial update applied by `QualityGate::update_configuration`.
///
/// A `tier` loads that preset first; explicit `thresholds` then override
/// individual values on top of it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct QualityConfigPatch {
    #[garde(length(min = 1, max = 32))]
    pub tier: Option<String>,

    #[garde(dive)]
    pub thresholds: Option<ThresholdPatch>,

    #[garde(range(min = 0.0, max = 1.0))]
    pub consistency_weight: Option<f64>,

    #[garde(range(min = 0.0, max = 1.0))]
    pub accuracy_weight: Option<f64>,

    #[garde(skip)]
    pub strict_mode: Option<bool>,

    #[garde(skip)]
    pub enable_detailed_feedback: Option<bool>,

    #[garde(skip)]
    pub enable_retry_recommendations: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ThresholdPatch {
    #[garde(range(min = 0.0, max = 1.0))]
    pub overall: Option<f64>,
    #[garde(range(min = 0.0, max = 1.0))]
    pub face: Option<f64>,
    #[garde(range(min = 0.0, max = 1.0))]
    pub pose: Option<f64>,
    #[garde(range(min = 0.0, max = 1.0))]
    pub color: Option<f64>,
    #[garde(range(min = 0.0, max = 1.0))]
    pub style: Option<f64>,
    #[garde(range(min = 0.0, max = 1.0))]
    pub branding: Option<f64>,
}

/// Output of one scorer sub-validator.
///
/// `passes` is the sub-validator's own verdict (the AND of its dimension
/// checks against its own thresholds); the gate trusts it in standard mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupScores {
    pub dimensions: BTreeMap<Dimension, f64>,
    pub overall: f64,
    pub passes: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl GroupScores {
    pub fn new(
        dimensions: impl IntoIterator<Item = (Dimension, f64)>,
        overall: f64,
        passes: bool,
    ) -> Self {
        Self {
            dimensions: dimensions
                .into_iter()
                .map(|(d, s)| (d, s.clamp(0.0, 1.0)))
                .collect(),
            overall: overall.clamp(0.0, 1.0),
            passes,
            error: None,
        }
    }

    /// Build a group from raw dimension scores, deriving the overall score as
    /// the mean over the group's dimensions and the verdict against
    /// `thresholds`. Dimensions the scorer omitted count as 0.
    pub fn from_scores(
        group: ScoreGroup,
        scores: impl IntoIterator<Item = (Dimension, f64)>,
        thresholds: &TierThresholds,
    ) -> Self {
        let dimensions: BTreeMap<Dimension, f64> = scores
            .into_iter()
            .filter(|(d, _)| d.group() == group)
            .map(|(d, s)| (d, s.clamp(0.0, 1.0)))
            .collect();

        let expected = group.dimensions();
        let sum: f64 = expected
            .iter()
            .map(|d| dimensions.get(d).copied().unwrap_or(0.0))
            .sum();
        let passes = expected
            .iter()
            .all(|d| dimensions.get(d).copied().unwrap_or(0.0) >= thresholds.get(*d));

        Self {
            dimensions,
            overall: sum / expected.len() as f64,
            passes,
            error: None,
        }
    }

    /// A group whose scorer failed: zero overall, failing verdict.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            dimensions: BTreeMap::new(),
            overall: 0.0,
            passes: false,
            error: Some(message.into()),
        }
    }

    /// Score for `dimension`, 0 when missing or when the group errored.
    pub fn score(&self, dimension: Dimension) -> f64 {
        if self.error.is_some() {
            return 0.0;
        }
        self.dimensions.get(&dimension).copied().unwrap_or(0.0)
    }
}

/// Everything the scorer produced for one artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreReport {
    pub consistency: GroupScores,
    pub accuracy: GroupScores,
}

/// Per-dimension pass matrix plus the group and overall gates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PassDetail {
    pub dimensions: BTreeMap<Dimension, bool>,
    pub consistency: bool,
    pub accuracy: bool,
    pub overall_score: bool,
}

impl PassDetail {
    pub fn failing(&self) -> impl Iterator<Item = Dimension> + '_ {
        self.dimensions
            .iter()
            .filter(|(_, passed)| !**passed)
            .map(|(d, _)| *d)
    }

    pub fn is_failing(&self, dimension: Dimension) -> bool {
        !self.dimensions.get(&dimension).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    pub summary: String,
    pub detailed: Vec<String>,
    pub actionable: Vec<String>,
}

/// Which scorer group a retry should concentrate on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RetryPriority {
    Consistency,
    Accuracy,
    Balanced,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RetryStrategy {
    CompleteRegeneration,
    ModelFocusedRetry,
    ProductFocusedRetry,
    TargetedRetry,
}

/// Generation knob named by a retry recommendation.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GenerationParameter {
    ReferenceStrength,
    FaceRestoration,
    PoseGuidance,
    ColorGuidance,
    StyleStrength,
    ProductReferenceWeight,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Directive {
    Increase,
    Enable,
}

pub type ParameterAdjustments = BTreeMap<Dimension, BTreeMap<GenerationParameter, Directive>>;

/// Structured retry guidance attached to a failed validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryRecommendation {
    pub should_retry: bool,
    pub priority: RetryPriority,
    pub strategy: RetryStrategy,
    pub parameter_adjustments: ParameterAdjustments,
    pub max_retries: u32,
    pub estimated_improvement: f64,
}

/// Verdict for one generated artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub tier: Tier,
    pub strict_mode: bool,
    pub consistency: GroupScores,
    pub accuracy: GroupScores,
    pub overall_score: f64,
    pub passes: bool,
    pub pass_detail: PassDetail,
    pub feedback: Feedback,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_recommendation: Option<RetryRecommendation>,
}
