//! Google Cloud Vision engine implementation
//!
//! Reads printed Chinese reliably, which OCR.space does not. Every call is
//! billed against a monthly quota, so callers gate it through the key pool.

use crate::config::Config;
use crate::engine::{OcrEngine, PassportImage};
use crate::error::OcrError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

const PROVIDER: &str = "google_vision";

/// Google Vision TEXT_DETECTION engine
pub struct GoogleVisionEngine {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    full_text_annotation: Option<TextAnnotation>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

impl GoogleVisionEngine {
    pub fn new(config: &Config, client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: config.cjk_endpoint.clone(),
        }
    }
}

#[async_trait]
impl OcrEngine for GoogleVisionEngine {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn description(&self) -> &'static str {
        "Google Cloud Vision - Chinese name recognition (quota limited)"
    }

    async fn recognize(&self, image: &PassportImage, api_key: &str) -> Result<String, OcrError> {
        let request = json!({
            "requests": [{
                "image": { "content": image.to_base64() },
                "features": [{ "type": "TEXT_DETECTION", "maxResults": 1 }],
            }]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| OcrError::provider_call(PROVIDER, e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| OcrError::provider_call(PROVIDER, e.to_string()))?;

        parse_response(&body)
    }

    fn supported_languages(&self) -> Vec<String> {
        vec!["chi_tra".to_string(), "eng".to_string()]
    }
}

/// Extract the full-page transcript from an `images:annotate` response body
fn parse_response(body: &str) -> Result<String, OcrError> {
    let response: AnnotateResponse = serde_json::from_str(body)
        .map_err(|e| OcrError::provider_call(PROVIDER, format!("Invalid response: {}", e)))?;

    if let Some(error) = response.error {
        return Err(OcrError::provider_call(PROVIDER, error.message));
    }

    let Some(first) = response.responses.into_iter().next() else {
        return Ok(String::new());
    };

    if let Some(error) = first.error {
        return Err(OcrError::provider_call(PROVIDER, error.message));
    }

    Ok(first
        .full_text_annotation
        .map(|annotation| annotation.text)
        .unwrap_or_default())
}
