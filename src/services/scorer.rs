use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::models::generation::{Artifact, ReferenceImage, ReferenceRole};
use crate::models::quality::{Dimension, GroupScores, ScoreGroup, ScoreReport, TierThresholds};
use crate::services::thresholds;

/// Produces normalized per-dimension scores for a generated image.
///
/// Implementations should report a recoverable failure of one sub-validator
/// as an errored group (`GroupScores::failed`) rather than an `Err`; an `Err`
/// means nothing could be scored at all.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(
        &self,
        artifact: &Artifact,
        references: &[ReferenceImage],
    ) -> Result<ScoreReport, ScorerError>;
}

/// Client for a remote image scoring service.
pub struct HttpScorer {
    http: Client,
    endpoint: String,
    api_token: Option<String>,
    /// Thresholds the sub-validators use for their own group verdicts.
    baseline: TierThresholds,
}

#[derive(Serialize)]
pub(crate) struct EncodedImage<'a> {
    pub role: &'a str,
    pub content_type: &'a str,
    pub image: String,
}

impl<'a> EncodedImage<'a> {
    pub(crate) fn reference(reference: &'a ReferenceImage, role: &'a str) -> Self {
        Self {
            role,
            content_type: &reference.content_type,
            image: base64::engine::general_purpose::STANDARD.encode(&reference.bytes),
        }
    }
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    artifact: EncodedImage<'a>,
    references: Vec<EncodedImage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    face: Option<f64>,
    pose: Option<f64>,
    color: Option<f64>,
    style: Option<f64>,
    branding: Option<f64>,
    #[serde(default)]
    consistency_error: Option<String>,
    #[serde(default)]
    accuracy_error: Option<String>,
}

impl HttpScorer {
    pub fn new(
        endpoint: impl Into<String>,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ScorerError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ScorerError::Http)?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_token,
            baseline: thresholds::STANDARD,
        })
    }

    pub fn with_baseline(mut self, baseline: TierThresholds) -> Self {
        self.baseline = baseline;
        self
    }

    fn group(
        &self,
        group: ScoreGroup,
        response: &ScoreResponse,
        error: Option<&String>,
    ) -> GroupScores {
        if let Some(message) = error {
            return GroupScores::failed(message.clone());
        }
        let mut scores: Vec<(Dimension, f64)> = Vec::with_capacity(group.dimensions().len());
        for dimension in group.dimensions() {
            match response.get(*dimension) {
                Some(score) => scores.push((*dimension, score)),
                // Partial data fails the whole group.
                None => {
                    return GroupScores::failed(format!("scorer returned no {dimension} score"));
                }
            }
        }
        GroupScores::from_scores(group, scores, &self.baseline)
    }
}

impl ScoreResponse {
    fn get(&self, dimension: Dimension) -> Option<f64> {
        match dimension {
            Dimension::Face => self.face,
            Dimension::Pose => self.pose,
            Dimension::Color => self.color,
            Dimension::Style => self.style,
            Dimension::Branding => self.branding,
        }
    }
}

#[async_trait]
impl Scorer for HttpScorer {
    async fn score(
        &self,
        artifact: &Artifact,
        references: &[ReferenceImage],
    ) -> Result<ScoreReport, ScorerError> {
        let request = ScoreRequest {
            artifact: EncodedImage {
                role: "artifact",
                content_type: &artifact.content_type,
                image: base64::engine::general_purpose::STANDARD.encode(&artifact.bytes),
            },
            references: references
                .iter()
                .map(|r| EncodedImage::reference(r, role_name(r)))
                .collect(),
        };

        let mut builder = self.http.post(&self.endpoint).json(&request);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await.map_err(ScorerError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ScorerError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: ScoreResponse = response.json().await.map_err(ScorerError::Http)?;
        tracing::debug!(
            face = ?body.face,
            pose = ?body.pose,
            color = ?body.color,
            style = ?body.style,
            branding = ?body.branding,
            "Scoring service responded"
        );

        Ok(ScoreReport {
            consistency: self.group(
                ScoreGroup::Consistency,
                &body,
                body.consistency_error.as_ref(),
            ),
            accuracy: self.group(ScoreGroup::Accuracy, &body, body.accuracy_error.as_ref()),
        })
    }
}

pub(crate) fn role_name(reference: &ReferenceImage) -> &'static str {
    match reference.role {
        ReferenceRole::Model => "model",
        ReferenceRole::Product => "product",
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScorerError {
    #[error("Scoring request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Scoring service returned {status}: {message}")]
    Status { status: u16, message: String },
}
