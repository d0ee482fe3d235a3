//! Quality tier presets.
//!
//! Each preset is strictly stricter than the one before it on every
//! threshold, so an image passing `ultra` passes `premium` and `standard`.

use crate::models::quality::{QualityConfig, Tier, TierThresholds};

/// Default weight of the consistency group in the overall score.
pub const DEFAULT_CONSISTENCY_WEIGHT: f64 = 0.5;

/// Default weight of the accuracy group in the overall score.
pub const DEFAULT_ACCURACY_WEIGHT: f64 = 0.5;

pub const STANDARD: TierThresholds = TierThresholds {
    overall: 0.65,
    face: 0.65,
    pose: 0.55,
    color: 0.65,
    style: 0.55,
    branding: 0.75,
};

pub const PREMIUM: TierThresholds = TierThresholds {
    overall: 0.75,
    face: 0.75,
    pose: 0.65,
    color: 0.75,
    style: 0.65,
    branding: 0.85,
};

pub const ULTRA: TierThresholds = TierThresholds {
    overall: 0.85,
    face: 0.85,
    pose: 0.75,
    color: 0.85,
    style: 0.75,
    branding: 0.90,
};

pub fn preset(tier: Tier) -> TierThresholds {
    match tier {
        Tier::Standard => STANDARD,
        Tier::Premium => PREMIUM,
        Tier::Ultra => ULTRA,
    }
}

/// Gate configuration for `tier` with default weights and flags.
pub fn default_config(tier: Tier) -> QualityConfig {
    QualityConfig {
        tier,
        thresholds: preset(tier),
        consistency_weight: DEFAULT_CONSISTENCY_WEIGHT,
        accuracy_weight: DEFAULT_ACCURACY_WEIGHT,
        strict_mode: false,
        enable_detailed_feedback: true,
        enable_retry_recommendations: true,
    }
}
