use crate::error::OcrError;
use async_trait::async_trait;
use axum::body::Bytes;
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// An uploaded passport image
#[derive(Debug, Clone)]
pub struct PassportImage {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl PassportImage {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Image bytes as plain base64
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    /// Image bytes as a `data:` URL
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.content_type, self.to_base64())
    }
}

/// Trait that all OCR providers must implement
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Returns the engine identifier (e.g., "ocr_space", "google_vision")
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of the engine
    fn description(&self) -> &'static str;

    /// Transcribe an image to plain text using the given API key.
    ///
    /// An image without text yields an empty string, not an error.
    async fn recognize(&self, image: &PassportImage, api_key: &str) -> Result<String, OcrError>;

    /// Get supported languages
    fn supported_languages(&self) -> Vec<String>;
}
