//! OCR engine implementations
//!
//! Two hosted providers fill the two roles of the recognition pipeline: the
//! MRZ engine reads the machine-readable zone, the CJK engine reads the
//! Chinese name. Both implement the `OcrEngine` trait so tests can swap in
//! stubs.

pub mod google_vision;
pub mod ocr_space;

use crate::config::Config;
use crate::engine::OcrEngine;
use crate::error::OcrError;
use serde::Serialize;
use std::sync::Arc;

/// Information about an available engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub name: &'static str,
    pub role: &'static str,
    pub description: &'static str,
    pub supported_languages: Vec<String>,
}

/// The engines used for each recognition role
#[derive(Clone)]
pub struct EngineRegistry {
    mrz: Arc<dyn OcrEngine>,
    cjk: Arc<dyn OcrEngine>,
}

impl EngineRegistry {
    /// Create the registry with the hosted providers
    pub fn new(config: &Config) -> Result<Self, OcrError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("passport-ocr-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OcrError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        tracing::info!("Initializing OCR.space engine at {}", config.mrz_endpoint);
        let mrz = ocr_space::OcrSpaceEngine::new(config, client.clone());

        tracing::info!("Initializing Google Vision engine at {}", config.cjk_endpoint);
        let cjk = google_vision::GoogleVisionEngine::new(config, client);

        Ok(Self::with_engines(Arc::new(mrz), Arc::new(cjk)))
    }

    /// Create a registry from explicit engines
    pub fn with_engines(mrz: Arc<dyn OcrEngine>, cjk: Arc<dyn OcrEngine>) -> Self {
        Self { mrz, cjk }
    }

    /// Engine for the machine-readable zone
    pub fn mrz(&self) -> Arc<dyn OcrEngine> {
        Arc::clone(&self.mrz)
    }

    /// Engine for Chinese text
    pub fn cjk(&self) -> Arc<dyn OcrEngine> {
        Arc::clone(&self.cjk)
    }

    /// Get info about all engines
    pub fn info(&self) -> Vec<EngineInfo> {
        [("mrz", &self.mrz), ("cjk", &self.cjk)]
            .into_iter()
            .map(|(role, e)| EngineInfo {
                name: e.name(),
                role,
                description: e.description(),
                supported_languages: e.supported_languages(),
            })
            .collect()
    }
}
