use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use strum::IntoEnumIterator;
use tracing::{debug, info};

use crate::models::quality::{
    Dimension, Feedback, GroupScores, PassDetail, QualityConfig, QualityConfigPatch,
    RetryRecommendation, ScoreGroup, Tier, ValidationResult,
};
use crate::services::{retry_policy, thresholds};

/// Overall score at or above which a failing image is "close".
const CLOSE_BAND: f64 = 0.6;

/// Overall score at or above which a failing image needs significant work
/// rather than full regeneration.
const SIGNIFICANT_BAND: f64 = 0.4;

/// Decides whether a generated image is released and how to retry if not.
///
/// Evaluation is pure over its inputs plus a snapshot of the active
/// configuration; concurrent evaluations only contend with
/// `update_configuration` / `select_tier` writers.
#[derive(Debug)]
pub struct QualityGate {
    config: RwLock<QualityConfig>,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(thresholds::default_config(Tier::Standard))
    }
}

impl QualityGate {
    pub fn new(config: QualityConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    /// Snapshot of the active configuration.
    pub fn config(&self) -> QualityConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Load a tier preset into the active configuration. Unknown names load
    /// `standard`. Weights and mode flags are kept.
    pub fn select_tier(&self, name: &str) -> Tier {
        let tier = Tier::from_name(name);
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        config.tier = tier;
        config.thresholds = thresholds::preset(tier);
        info!(tier = %tier, "Quality tier selected");
        tier
    }

    /// Merge `patch` into the active configuration. Takes effect for the
    /// next evaluation.
    pub fn update_configuration(&self, patch: QualityConfigPatch) -> QualityConfig {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(name) = patch.tier.as_deref() {
            let tier = Tier::from_name(name);
            config.tier = tier;
            config.thresholds = thresholds::preset(tier);
        }
        if let Some(t) = patch.thresholds {
            let overrides = [
                (Some(Dimension::Face), t.face),
                (Some(Dimension::Pose), t.pose),
                (Some(Dimension::Color), t.color),
                (Some(Dimension::Style), t.style),
                (Some(Dimension::Branding), t.branding),
                (None, t.overall),
            ];
            for (dimension, value) in overrides {
                let Some(value) = value else { continue };
                match dimension {
                    Some(d) => config.thresholds.set(d, value),
                    None => config.thresholds.overall = value,
                }
            }
        }
        if let Some(w) = patch.consistency_weight {
            config.consistency_weight = w;
        }
        if let Some(w) = patch.accuracy_weight {
            config.accuracy_weight = w;
        }
        if let Some(strict) = patch.strict_mode {
            config.strict_mode = strict;
        }
        if let Some(enabled) = patch.enable_detailed_feedback {
            config.enable_detailed_feedback = enabled;
        }
        if let Some(enabled) = patch.enable_retry_recommendations {
            config.enable_retry_recommendations = enabled;
        }

        info!(
            tier = %config.tier,
            strict_mode = config.strict_mode,
            overall_threshold = config.thresholds.overall,
            "Quality configuration updated"
        );
        config.clone()
    }

    /// Evaluate scorer output against the active configuration.
    pub fn evaluate(&self, consistency: &GroupScores, accuracy: &GroupScores) -> ValidationResult {
        evaluate_with(&self.config(), consistency, accuracy)
    }

    /// Evaluate against `tier` without changing the active tier. When `tier`
    /// is the active one its threshold overrides are honoured.
    pub fn evaluate_for_tier(
        &self,
        tier: Tier,
        consistency: &GroupScores,
        accuracy: &GroupScores,
    ) -> ValidationResult {
        let mut config = self.config();
        if config.tier != tier {
            config.tier = tier;
            config.thresholds = thresholds::preset(tier);
        }
        evaluate_with(&config, consistency, accuracy)
    }

    pub fn recommend_retry(
        &self,
        consistency: &GroupScores,
        accuracy: &GroupScores,
        pass_detail: &PassDetail,
    ) -> RetryRecommendation {
        retry_policy::recommend(&self.config(), consistency, accuracy, pass_detail)
    }
}

/// `clamp(consistency·Wc + accuracy·Wa, 0, 1)`. An errored group counts as 0.
pub fn weighted_overall(
    config: &QualityConfig,
    consistency: &GroupScores,
    accuracy: &GroupScores,
) -> f64 {
    let group_overall = |g: &GroupScores| if g.error.is_some() { 0.0 } else { g.overall };
    (group_overall(consistency) * config.consistency_weight
        + group_overall(accuracy) * config.accuracy_weight)
        .clamp(0.0, 1.0)
}

/// Build the verdict for one artifact under `config`.
pub fn evaluate_with(
    config: &QualityConfig,
    consistency: &GroupScores,
    accuracy: &GroupScores,
) -> ValidationResult {
    let overall_score = weighted_overall(config, consistency, accuracy);

    let dimensions: BTreeMap<Dimension, bool> = Dimension::iter()
        .map(|d| {
            let score = dimension_score(d, consistency, accuracy);
            (d, score >= config.thresholds.get(d))
        })
        .collect();

    let pass_detail = PassDetail {
        consistency: consistency.error.is_none() && consistency.passes,
        accuracy: accuracy.error.is_none() && accuracy.passes,
        overall_score: overall_score >= config.thresholds.overall,
        dimensions,
    };

    let passes = if config.strict_mode {
        pass_detail.dimensions.values().all(|p| *p) && pass_detail.overall_score
    } else {
        pass_detail.consistency && pass_detail.accuracy && pass_detail.overall_score
    };

    let scorer_errors: Vec<String> = [
        (ScoreGroup::Consistency, consistency),
        (ScoreGroup::Accuracy, accuracy),
    ]
    .into_iter()
    .filter_map(|(group, scores)| {
        scores
            .error
            .as_ref()
            .map(|e| format!("{group} scoring failed: {e}"))
    })
    .collect();

    let feedback = build_feedback(
        config,
        overall_score,
        passes,
        &pass_detail,
        (consistency, accuracy),
        &scorer_errors,
    );

    let retry_recommendation = if passes {
        None
    } else if !scorer_errors.is_empty() {
        Some(retry_policy::conservative(
            config,
            consistency,
            accuracy,
            &pass_detail,
        ))
    } else if config.enable_retry_recommendations {
        Some(retry_policy::recommend(
            config,
            consistency,
            accuracy,
            &pass_detail,
        ))
    } else {
        None
    };

    let verdict = if passes { "pass" } else { "fail" };
    metrics::counter!("quality_evaluations_total", "result" => verdict, "tier" => config.tier.to_string())
        .increment(1);
    metrics::histogram!("quality_overall_score").record(overall_score);
    debug!(
        tier = %config.tier,
        strict_mode = config.strict_mode,
        overall_score,
        passes,
        failing = pass_detail.failing().count(),
        "Quality evaluation complete"
    );

    ValidationResult {
        tier: config.tier,
        strict_mode: config.strict_mode,
        consistency: consistency.clone(),
        accuracy: accuracy.clone(),
        overall_score,
        passes,
        pass_detail,
        feedback,
        retry_recommendation,
    }
}

fn dimension_score(dimension: Dimension, consistency: &GroupScores, accuracy: &GroupScores) -> f64 {
    match dimension.group() {
        ScoreGroup::Consistency => consistency.score(dimension),
        ScoreGroup::Accuracy => accuracy.score(dimension),
    }
}

fn build_feedback(
    config: &QualityConfig,
    overall_score: f64,
    passes: bool,
    pass_detail: &PassDetail,
    (consistency, accuracy): (&GroupScores, &GroupScores),
    scorer_errors: &[String],
) -> Feedback {
    let pct = overall_score * 100.0;
    let threshold = config.thresholds.overall;

    let summary = if passes {
        format!("Quality check passed with an overall score of {pct:.1}%.")
    } else if overall_score >= CLOSE_BAND {
        format!(
            "Close to the quality bar, needs improvement (overall score {pct:.1}%, threshold {:.1}%).",
            threshold * 100.0
        )
    } else if overall_score >= SIGNIFICANT_BAND {
        format!("Significant improvements needed (overall score {pct:.1}%).")
    } else {
        format!("Major issues detected, regeneration required (overall score {pct:.1}%).")
    };

    let mut detailed = Vec::new();
    if config.enable_detailed_feedback {
        for dim in pass_detail.failing() {
            let score = dimension_score(dim, consistency, accuracy);
            detailed.push(format!(
                "{dim} score: {:.1}% (threshold: {:.1}%)",
                score * 100.0,
                config.thresholds.get(dim) * 100.0
            ));
        }
    }
    detailed.extend(scorer_errors.iter().cloned());

    let mut actionable: Vec<String> = pass_detail
        .failing()
        .map(|d| remediation(d).to_string())
        .collect();
    if actionable.is_empty() {
        actionable.push(
            "No improvements needed; the image meets every dimension threshold.".to_string(),
        );
    }

    Feedback {
        summary,
        detailed,
        actionable,
    }
}

/// Fixed remediation advice for a failing dimension.
pub fn remediation(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Face => {
            "Strengthen reference conditioning so the face matches the model photo."
        }
        Dimension::Pose => "Add pose guidance to keep the body position of the model photo.",
        Dimension::Color => "Tighten color guidance so garment colors match the product photo.",
        Dimension::Style => {
            "Reinforce style descriptors in the prompt to preserve cut and design details."
        }
        Dimension::Branding => {
            "Raise the product reference weight so logos and brand marks are reproduced exactly."
        }
    }
}
