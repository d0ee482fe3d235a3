use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::models::generation::{Artifact, GenerationParams, ReferenceImage};
use crate::services::scorer::{role_name, EncodedImage};

/// Produces a try-on image from generation parameters and references.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(
        &self,
        params: &GenerationParams,
        references: &[ReferenceImage],
    ) -> Result<Artifact, ProviderError>;
}

/// Client for a remote image generation endpoint.
pub struct HttpGenerationProvider {
    http: Client,
    endpoint: String,
    api_token: Option<String>,
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    #[serde(flatten)]
    params: &'a GenerationParams,
    references: Vec<EncodedImage<'a>>,
}

#[derive(Deserialize)]
struct GenerateResult {
    image: String,
}

impl HttpGenerationProvider {
    pub fn new(
        endpoint: impl Into<String>,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProviderError::Http)?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_token,
        })
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn generate(
        &self,
        params: &GenerationParams,
        references: &[ReferenceImage],
    ) -> Result<Artifact, ProviderError> {
        let body = GenerateBody {
            params,
            references: references
                .iter()
                .map(|r| EncodedImage::reference(r, role_name(r)))
                .collect(),
        };

        let mut builder = self.http.post(&self.endpoint).json(&body);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await.map_err(ProviderError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let result: GenerateResult = response.json().await.map_err(ProviderError::Http)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(result.image.as_bytes())
            .map_err(ProviderError::Decode)?;

        // Reject payloads that are not a recognizable image before scoring.
        let format = image::guess_format(&bytes).map_err(ProviderError::InvalidImage)?;

        Ok(Artifact {
            content_type: format.to_mime_type().to_string(),
            bytes,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Generation provider returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Generated image is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Generated payload is not a supported image: {0}")]
    InvalidImage(#[from] image::ImageError),
}
