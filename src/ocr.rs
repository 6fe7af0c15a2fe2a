use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;

use crate::error::{Result, TrackerError};

/// Turns image bytes into recognised text lines, in reading order. Line
/// boundaries are significant: pattern matching and locale correction are
/// scoped per physical line.
#[async_trait]
pub trait OcrClient: Send + Sync {
    async fn detect_text(&self, image: &[u8]) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    responses: Vec<AnnotateResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResult {
    text_annotations: Option<Vec<TextAnnotation>>,
    error: Option<VisionError>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    description: String,
}

#[derive(Debug, Deserialize)]
struct VisionError {
    message: String,
}

/// Google Vision text detection over the REST endpoint.
pub struct GoogleVisionOcr {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GoogleVisionOcr {
    pub fn new(endpoint: String, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TrackerError::ProviderUnavailable(err.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl OcrClient for GoogleVisionOcr {
    async fn detect_text(&self, image: &[u8]) -> Result<Vec<String>> {
        let content = base64::engine::general_purpose::STANDARD.encode(image);
        let body = json!({
            "requests": [{
                "image": { "content": content },
                "features": [{ "type": "TEXT_DETECTION" }]
            }]
        });

        let res = self
            .client
            .post(format!("{}/v1/images:annotate", self.endpoint))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                tracing::error!("Error occurred in request to Vision API: {:#?}", err);
                TrackerError::ProviderUnavailable(err.to_string())
            })?;

        let status = res.status();
        if !status.is_success() {
            return Err(TrackerError::ProviderUnavailable(format!(
                "Vision API returned status {}",
                status
            )));
        }

        let annotated = res.json::<AnnotateResponse>().await.map_err(|err| {
            tracing::error!("Error occurred while deserialising Vision response: {:#?}", err);
            TrackerError::ProviderUnavailable(err.to_string())
        })?;

        let Some(result) = annotated.responses.into_iter().next() else {
            return Ok(vec![]);
        };

        if let Some(err) = result.error {
            return Err(TrackerError::ProviderUnavailable(err.message));
        }

        // The first annotation is the whole recognised block; its description
        // carries the text with original line breaks.
        let lines = result
            .text_annotations
            .and_then(|mut annotations| {
                if annotations.is_empty() {
                    None
                } else {
                    Some(annotations.remove(0))
                }
            })
            .map(|annotation| {
                annotation
                    .description
                    .split('\n')
                    .map(|line| line.to_string())
                    .collect()
            })
            .unwrap_or_default();

        Ok(lines)
    }
}
