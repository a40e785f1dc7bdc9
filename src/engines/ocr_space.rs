//! OCR.space engine implementation
//!
//! Hosted OCR tuned for Latin text. Used for the machine-readable zone and
//! the printed Latin fields of the data page.

use crate::config::Config;
use crate::engine::{OcrEngine, PassportImage};
use crate::error::OcrError;
use async_trait::async_trait;
use reqwest::multipart::Form;
use serde::Deserialize;

const PROVIDER: &str = "ocr_space";

/// OCR.space engine; OCREngine 2 handles the MRZ font best
pub struct OcrSpaceEngine {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OcrSpaceResponse {
    #[serde(default)]
    parsed_results: Vec<ParsedResult>,
    #[serde(default)]
    is_errored_on_processing: bool,
    /// A string or an array of strings depending on the failure
    #[serde(default)]
    error_message: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParsedResult {
    #[serde(default)]
    parsed_text: String,
}

impl OcrSpaceEngine {
    pub fn new(config: &Config, client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: config.mrz_endpoint.clone(),
        }
    }
}

#[async_trait]
impl OcrEngine for OcrSpaceEngine {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn description(&self) -> &'static str {
        "OCR.space hosted OCR - machine-readable zone and Latin fields"
    }

    async fn recognize(&self, image: &PassportImage, api_key: &str) -> Result<String, OcrError> {
        let form = Form::new()
            .text("base64Image", image.to_data_url())
            .text("language", "eng")
            .text("isOverlayRequired", "false")
            .text("detectOrientation", "true")
            .text("scale", "true")
            .text("OCREngine", "2");

        let response = self
            .client
            .post(&self.endpoint)
            .header("apikey", api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| OcrError::provider_call(PROVIDER, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OcrError::provider_call(PROVIDER, e.to_string()))?;

        if !status.is_success() {
            return Err(OcrError::provider_call(
                PROVIDER,
                format!("HTTP {}", status),
            ));
        }

        parse_response(&body)
    }

    fn supported_languages(&self) -> Vec<String> {
        vec!["eng".to_string()]
    }
}

/// Extract the transcript from an OCR.space response body
fn parse_response(body: &str) -> Result<String, OcrError> {
    let response: OcrSpaceResponse = serde_json::from_str(body)
        .map_err(|e| OcrError::provider_call(PROVIDER, format!("Invalid response: {}", e)))?;

    if response.is_errored_on_processing {
        let message = match response.error_message {
            Some(serde_json::Value::Array(messages)) => messages
                .first()
                .and_then(|m| m.as_str())
                .map(str::to_string),
            Some(serde_json::Value::String(message)) => Some(message),
            _ => None,
        };
        return Err(OcrError::provider_call(
            PROVIDER,
            message.unwrap_or_else(|| "recognition failed".to_string()),
        ));
    }

    Ok(response
        .parsed_results
        .into_iter()
        .next()
        .map(|result| result.parsed_text)
        .unwrap_or_default())
}
