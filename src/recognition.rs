//! Batch recognition of passport images
//!
//! Each image gets one call to the MRZ engine and, when the key pool admits
//! the batch, one call to the CJK engine. The two calls run concurrently, as
//! do the images of a batch. A failed call affects only its own image.

use crate::engine::{OcrEngine, PassportImage};
use crate::engines::EngineRegistry;
use crate::error::OcrError;
use crate::passport::{parse_passport_text, CustomerRecord};
use crate::quota::{KeyGrant, PoolUsage, QuotaLimitedKeyPool};
use futures::future::join_all;
use serde::Serialize;
use std::time::Instant;

/// Result of recognizing one image
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageOutcome {
    pub file_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerRecord>,
    /// MRZ transcript the record was parsed from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageOutcome {
    fn failed(file_name: &str, error: &OcrError) -> Self {
        Self {
            file_name: file_name.to_string(),
            success: false,
            customer: None,
            raw_text: None,
            error: Some(error.to_string()),
        }
    }
}

/// Per-image outcomes plus the batch summary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub success: bool,
    pub results: Vec<ImageOutcome>,
    pub total: usize,
    pub successful: usize,
    pub usage_warning: Option<String>,
    pub key_pool_usage: PoolUsage,
}

/// Runs both OCR engines over a batch and reconciles their transcripts
#[derive(Clone)]
pub struct RecognitionOrchestrator {
    engines: EngineRegistry,
    mrz_api_key: Option<String>,
    key_pool: QuotaLimitedKeyPool,
}

impl RecognitionOrchestrator {
    pub fn new(
        engines: EngineRegistry,
        mrz_api_key: Option<String>,
        key_pool: QuotaLimitedKeyPool,
    ) -> Self {
        Self {
            engines,
            mrz_api_key,
            key_pool,
        }
    }

    pub fn engines(&self) -> &EngineRegistry {
        &self.engines
    }

    pub fn key_pool(&self) -> &QuotaLimitedKeyPool {
        &self.key_pool
    }

    /// Recognize every image of a batch.
    ///
    /// Fails as a whole only when there is nothing to recognize or the MRZ
    /// engine has no API key. Provider failures are reported per image.
    pub async fn recognize_passports(
        &self,
        images: Vec<PassportImage>,
    ) -> Result<BatchReport, OcrError> {
        if images.is_empty() {
            return Err(OcrError::MissingFile);
        }
        let mrz_api_key = self
            .mrz_api_key
            .as_deref()
            .ok_or_else(|| OcrError::ProviderConfig("OCR.space API key is not set".to_string()))?;

        let start = Instant::now();
        let total = images.len();
        let admission = self.key_pool.select_key(total as u32).await;
        let grant = admission.grant.as_ref();

        match grant {
            Some(grant) => tracing::info!(
                "Recognizing {} image(s) with CJK key {} ({} used this month)",
                total,
                grant.index,
                grant.usage
            ),
            None => tracing::info!("Recognizing {} image(s) without CJK recognition", total),
        }

        let mrz = self.engines.mrz();
        let cjk = self.engines.cjk();
        let results = join_all(
            images
                .iter()
                .map(|image| recognize_one(mrz.as_ref(), cjk.as_ref(), image, mrz_api_key, grant)),
        )
        .await;

        if let Some(grant) = grant {
            if let Err(e) = self
                .key_pool
                .record_usage_in(&grant.month, grant.index, total as u32)
                .await
            {
                tracing::warn!("Failed to record CJK usage for key {}: {}", grant.index, e);
            }
        }

        let successful = results.iter().filter(|r| r.success).count();
        tracing::info!(
            "Batch completed in {}ms: {}/{} recognized",
            start.elapsed().as_millis(),
            successful,
            total
        );

        Ok(BatchReport {
            success: true,
            results,
            total,
            successful,
            usage_warning: admission.warning,
            key_pool_usage: admission.usage,
        })
    }
}

async fn recognize_one(
    mrz: &dyn OcrEngine,
    cjk: &dyn OcrEngine,
    image: &PassportImage,
    mrz_api_key: &str,
    grant: Option<&KeyGrant>,
) -> ImageOutcome {
    let cjk_call = async {
        match grant {
            Some(grant) => Some(cjk.recognize(image, &grant.key).await),
            None => None,
        }
    };
    let (mrz_result, cjk_result) = tokio::join!(mrz.recognize(image, mrz_api_key), cjk_call);

    let primary = match mrz_result {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("MRZ recognition failed for {}: {}", image.file_name, e);
            return ImageOutcome::failed(&image.file_name, &e);
        }
    };

    let secondary = match cjk_result {
        Some(Ok(text)) => Some(text),
        Some(Err(e)) => {
            tracing::warn!("CJK recognition failed for {}: {}", image.file_name, e);
            None
        }
        None => None,
    };

    tracing::debug!("MRZ transcript for {}:\n{}", image.file_name, primary);
    if let Some(text) = &secondary {
        tracing::debug!("CJK transcript for {}:\n{}", image.file_name, text);
    }

    let customer = parse_passport_text(&primary, secondary.as_deref(), &image.file_name);
    tracing::debug!(
        "Parsed {}: name {:?} ({:?}, {:?})",
        image.file_name,
        customer.name,
        customer.name_source,
        customer.name_confidence
    );

    ImageOutcome {
        file_name: image.file_name.clone(),
        success: true,
        customer: Some(customer),
        raw_text: Some(primary),
        error: None,
    }
}
