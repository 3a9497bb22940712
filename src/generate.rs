//! Image generation client for the Vertex AI Imagen predict endpoint.
//!
//! [`ImageGenerator`] is the seam the pipeline drives; [`VertexImagen`] is
//! the production implementation. One logical generation walks an ordered
//! model-id chain (newer models are not available in every project) and
//! returns the first successful prediction. There is no retry of a model
//! that already answered.

use crate::error::PipelineError;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Model ids tried in order until one accepts the request.
pub const MODEL_CHAIN: &[&str] = &[
    "imagen-3.0-generate-002",
    "imagen-3.0-generate-001",
    "imagen-3.0-fast-generate-001",
    "imagegeneration@006",
    "imagegeneration@002",
];

pub const DEFAULT_LOCATION: &str = "us-central1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Produce raw image bytes for the prompt. Exactly one logical
    /// generation per call; failures propagate, nothing is retried.
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, PipelineError>;
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: Vec<Instance<'a>>,
    parameters: Parameters,
}

#[derive(Debug, Serialize)]
struct Instance<'a> {
    prompt: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Parameters {
    sample_count: u32,
    aspect_ratio: &'static str,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
}

/// Vertex AI Imagen client. Credentials are a project id plus a short-lived
/// OAuth bearer token (`gcloud auth print-access-token`).
pub struct VertexImagen {
    client: reqwest::Client,
    project: String,
    location: String,
    token: String,
    models: Vec<String>,
}

impl VertexImagen {
    pub fn new(
        project: impl Into<String>,
        token: impl Into<String>,
        location: impl Into<String>,
        model_override: Option<String>,
    ) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::generation(format!("failed to build http client: {e}")))?;

        let models = match model_override {
            Some(model) => vec![model],
            None => MODEL_CHAIN.iter().map(|m| (*m).to_string()).collect(),
        };

        Ok(Self {
            client,
            project: project.into(),
            location: location.into(),
            token: token.into(),
            models,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "https://{loc}-aiplatform.googleapis.com/v1/projects/{proj}/locations/{loc}/publishers/google/models/{model}:predict",
            loc = self.location,
            proj = self.project,
        )
    }

    async fn predict(&self, model: &str, prompt: &str) -> Result<Vec<u8>, PipelineError> {
        let body = PredictRequest {
            instances: vec![Instance { prompt }],
            parameters: Parameters {
                sample_count: 1,
                aspect_ratio: "16:9",
            },
        };

        let response = self
            .client
            .post(self.endpoint(model))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let detail = if e.is_timeout() {
                    "request timed out".to_string()
                } else if e.is_connect() {
                    "unable to reach the endpoint".to_string()
                } else {
                    format!("transport error: {e}")
                };
                PipelineError::Generation {
                    model: Some(model.to_string()),
                    status: None,
                    detail,
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = match status.as_u16() {
                401 => "authentication failed, refresh the access token".to_string(),
                403 => "access forbidden, check project permissions and quota project".to_string(),
                429 => "quota exceeded".to_string(),
                code => format!("endpoint returned {code}: {text}"),
            };
            return Err(PipelineError::Generation {
                model: Some(model.to_string()),
                status: Some(status.as_u16()),
                detail,
            });
        }

        let parsed: PredictResponse = response.json().await.map_err(|e| {
            PipelineError::Generation {
                model: Some(model.to_string()),
                status: Some(status.as_u16()),
                detail: format!("unreadable response body: {e}"),
            }
        })?;

        let encoded = parsed
            .predictions
            .into_iter()
            .find_map(|p| p.bytes_base64_encoded)
            .ok_or_else(|| PipelineError::Generation {
                model: Some(model.to_string()),
                status: Some(status.as_u16()),
                detail: "response contained no image prediction".to_string(),
            })?;

        BASE64.decode(encoded.as_bytes()).map_err(|e| {
            PipelineError::Generation {
                model: Some(model.to_string()),
                status: Some(status.as_u16()),
                detail: format!("prediction was not valid base64: {e}"),
            }
        })
    }
}

#[async_trait]
impl ImageGenerator for VertexImagen {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, PipelineError> {
        let mut last_error = None;
        for model in &self.models {
            match self.predict(model, prompt).await {
                Ok(bytes) => {
                    tracing::debug!(model = %model, size = bytes.len(), "prediction accepted");
                    return Ok(bytes);
                }
                Err(error) => {
                    tracing::warn!(
                        model = %model,
                        error_category = error.category(),
                        %error,
                        "model rejected request, trying next in chain"
                    );
                    last_error = Some(error);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| PipelineError::generation("no models configured")))
    }
}

/// Stand-in used when credentials are absent. Scanning and dry runs still
/// work; any placeholder that actually needs generation fails with guidance.
pub struct UnconfiguredGenerator;

#[async_trait]
impl ImageGenerator for UnconfiguredGenerator {
    async fn generate(&self, _prompt: &str) -> Result<Vec<u8>, PipelineError> {
        Err(PipelineError::generation(
            "generation requires GOOGLE_CLOUD_PROJECT and GOOGLE_CLOUD_ACCESS_TOKEN \
             (see `gcloud auth print-access-token`)",
        ))
    }
}
