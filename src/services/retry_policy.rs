//! Retry recommendation synthesis for failed validations.

use std::collections::BTreeMap;

use crate::models::quality::{
    Dimension, Directive, GenerationParameter, GroupScores, ParameterAdjustments, PassDetail,
    QualityConfig, RetryPriority, RetryRecommendation, RetryStrategy, ScoreGroup,
};
use crate::services::quality_gate::weighted_overall;

/// Gap difference between groups needed to focus a retry on one of them.
const PRIORITY_GAP_MARGIN: f64 = 0.1;

/// Share of the remaining distance to the overall threshold a retry is
/// expected to recover.
const IMPROVEMENT_FACTOR: f64 = 0.7;

const MAX_ESTIMATED_IMPROVEMENT: f64 = 0.3;

/// Failing-dimension count at which the whole image is regenerated.
const COMPLETE_REGENERATION_FAILURES: usize = 4;

/// Build retry guidance for a failed validation.
pub fn recommend(
    config: &QualityConfig,
    consistency: &GroupScores,
    accuracy: &GroupScores,
    pass_detail: &PassDetail,
) -> RetryRecommendation {
    let overall = weighted_overall(config, consistency, accuracy);
    let failing: Vec<Dimension> = pass_detail.failing().collect();

    RetryRecommendation {
        should_retry: true,
        priority: retry_priority(config, consistency, accuracy, pass_detail),
        strategy: retry_strategy(pass_detail),
        parameter_adjustments: parameter_adjustments(&failing),
        max_retries: retry_budget(overall),
        estimated_improvement: estimated_improvement(config.thresholds.overall, overall),
    }
}

/// Guidance used when the scorer itself failed: regenerate once from
/// scratch rather than trusting a partial diagnosis.
pub fn conservative(
    config: &QualityConfig,
    consistency: &GroupScores,
    accuracy: &GroupScores,
    pass_detail: &PassDetail,
) -> RetryRecommendation {
    RetryRecommendation {
        should_retry: true,
        strategy: RetryStrategy::CompleteRegeneration,
        max_retries: 1,
        ..recommend(config, consistency, accuracy, pass_detail)
    }
}

/// Compare the worst unmet gap of each group.
pub fn retry_priority(
    config: &QualityConfig,
    consistency: &GroupScores,
    accuracy: &GroupScores,
    pass_detail: &PassDetail,
) -> RetryPriority {
    let worst_gap = |group: ScoreGroup, scores: &GroupScores| {
        group
            .dimensions()
            .iter()
            .filter(|d| pass_detail.is_failing(**d))
            .map(|d| config.thresholds.get(*d) - scores.score(*d))
            .fold(0.0_f64, f64::max)
    };
    let consistency_gap = worst_gap(ScoreGroup::Consistency, consistency);
    let accuracy_gap = worst_gap(ScoreGroup::Accuracy, accuracy);

    if consistency_gap - accuracy_gap > PRIORITY_GAP_MARGIN {
        RetryPriority::Consistency
    } else if accuracy_gap - consistency_gap > PRIORITY_GAP_MARGIN {
        RetryPriority::Accuracy
    } else {
        RetryPriority::Balanced
    }
}

pub fn retry_strategy(pass_detail: &PassDetail) -> RetryStrategy {
    let failing = pass_detail.failing().count();
    let fails = |d| pass_detail.is_failing(d);

    if failing >= COMPLETE_REGENERATION_FAILURES {
        RetryStrategy::CompleteRegeneration
    } else if fails(Dimension::Face) && fails(Dimension::Pose) {
        RetryStrategy::ModelFocusedRetry
    } else if fails(Dimension::Color) && fails(Dimension::Style) {
        RetryStrategy::ProductFocusedRetry
    } else {
        RetryStrategy::TargetedRetry
    }
}

/// Advisory knob changes for each failing dimension.
pub fn parameter_adjustments(failing: &[Dimension]) -> ParameterAdjustments {
    failing
        .iter()
        .map(|dim| {
            let directives: BTreeMap<GenerationParameter, Directive> = match dim {
                Dimension::Face => BTreeMap::from([
                    (GenerationParameter::ReferenceStrength, Directive::Increase),
                    (GenerationParameter::FaceRestoration, Directive::Enable),
                ]),
                Dimension::Pose => {
                    BTreeMap::from([(GenerationParameter::PoseGuidance, Directive::Increase)])
                }
                Dimension::Color => {
                    BTreeMap::from([(GenerationParameter::ColorGuidance, Directive::Increase)])
                }
                Dimension::Style => {
                    BTreeMap::from([(GenerationParameter::StyleStrength, Directive::Increase)])
                }
                Dimension::Branding => BTreeMap::from([(
                    GenerationParameter::ProductReferenceWeight,
                    Directive::Increase,
                )]),
            };
            (*dim, directives)
        })
        .collect()
}

/// Retries granted for a failed image. Worse images get more attempts.
pub fn retry_budget(overall_score: f64) -> u32 {
    if overall_score >= 0.6 {
        2
    } else if overall_score >= 0.4 {
        3
    } else {
        5
    }
}

/// `min((threshold - score) * 0.7, 0.3)`, floored at 0. The floor only
/// matters when the overall score already clears its threshold but a group
/// or dimension failed; a negative improvement estimate is reported as 0.
pub fn estimated_improvement(overall_threshold: f64, overall_score: f64) -> f64 {
    ((overall_threshold - overall_score) * IMPROVEMENT_FACTOR)
        .min(MAX_ESTIMATED_IMPROVEMENT)
        .max(0.0)
}
