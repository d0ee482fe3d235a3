//! Score and image fixtures shared by the integration tests.

#![allow(dead_code)]

use tryon_gate::models::generation::{ReferenceImage, ReferenceRole};
use tryon_gate::models::quality::{Dimension, GroupScores, ScoreGroup, ScoreReport};
use tryon_gate::services::thresholds;

/// PNG signature followed by filler; enough for `image::guess_format`.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDRfixture";

/// JPEG SOI marker followed by filler.
pub const JPEG_BYTES: &[u8] = b"\xff\xd8\xff\xe0\0\x10JFIFfixture";

/// Per-dimension scores for one generated image.
#[derive(Debug, Clone, Copy)]
pub struct Scores {
    pub face: f64,
    pub pose: f64,
    pub color: f64,
    pub style: f64,
    pub branding: f64,
}

impl Scores {
    pub const fn uniform(score: f64) -> Self {
        Self {
            face: score,
            pose: score,
            color: score,
            style: score,
            branding: score,
        }
    }

    /// Group verdicts are derived against the standard preset, matching what
    /// the HTTP scorer does.
    pub fn report(self) -> ScoreReport {
        let all = [
            (Dimension::Face, self.face),
            (Dimension::Pose, self.pose),
            (Dimension::Color, self.color),
            (Dimension::Style, self.style),
            (Dimension::Branding, self.branding),
        ];
        ScoreReport {
            consistency: GroupScores::from_scores(
                ScoreGroup::Consistency,
                all,
                &thresholds::STANDARD,
            ),
            accuracy: GroupScores::from_scores(ScoreGroup::Accuracy, all, &thresholds::STANDARD),
        }
    }
}

/// Clears every standard threshold.
pub const GOOD: Scores = Scores::uniform(0.9);

/// Face below the standard bar; everything else comfortably above.
/// Overall 0.74, so a retry budget of 2.
pub const WEAK_FACE: Scores = Scores {
    face: 0.5,
    pose: 0.8,
    color: 0.8,
    style: 0.8,
    branding: 0.9,
};

/// Passes every standard threshold but falls short of ultra (overall 0.8).
pub const STANDARD_ONLY: Scores = Scores::uniform(0.8);

pub fn references() -> Vec<ReferenceImage> {
    vec![
        ReferenceImage {
            role: ReferenceRole::Model,
            content_type: "image/png".to_string(),
            bytes: PNG_BYTES.to_vec(),
        },
        ReferenceImage {
            role: ReferenceRole::Product,
            content_type: "image/jpeg".to_string(),
            bytes: JPEG_BYTES.to_vec(),
        },
    ]
}
