use crate::config::Config;
use crate::engine::PassportImage;
use crate::engines::{EngineInfo, EngineRegistry};
use crate::error::OcrError;
use crate::quota::{JsonFileUsageStore, PoolUsage, QuotaLimitedKeyPool};
use crate::recognition::{BatchReport, RecognitionOrchestrator};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// File name given to images posted as JSON
const JSON_IMAGE_NAME: &str = "passport.jpg";

/// Multipart field carrying passport images
const FILES_FIELD: &str = "files";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RecognitionOrchestrator>,
    pub config: Arc<Config>,
}

/// JSON request body with a single image
#[derive(Deserialize)]
pub struct JsonImageRequest {
    /// Base64 image, optionally as a `data:` URL
    pub image: String,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub engines: Vec<EngineInfo>,
    pub max_file_size_bytes: usize,
    pub mrz_configured: bool,
    pub cjk_keys: usize,
    pub key_pool_usage: PoolUsage,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    // Several images fit in one multipart request
    let body_limit = state.config.max_file_size.saturating_mul(4);

    Router::new()
        .route("/ocr/passport", post(handle_passport))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let engines = EngineRegistry::new(&config)?;
    let store = Arc::new(JsonFileUsageStore::new(&config.usage_store_path));
    let key_pool = QuotaLimitedKeyPool::new(
        "google_vision",
        config.cjk_api_keys.clone(),
        config.cjk_key_limit,
        store,
    );

    if config.mrz_api_key.is_none() {
        tracing::warn!("OCR_SPACE_API_KEY is not set, passport recognition will fail");
    }
    if key_pool.key_count() == 0 {
        tracing::warn!("No Google Vision keys configured, Chinese names will not be recognized");
    }
    tracing::info!(
        "CJK key pool: {} key(s), {} calls/month each, usage stored in {}",
        key_pool.key_count(),
        config.cjk_key_limit,
        config.usage_store_path.display()
    );

    let addr = format!("{}:{}", config.host, config.port);
    let orchestrator = RecognitionOrchestrator::new(engines, config.mrz_api_key.clone(), key_pool);
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Handle passport recognition requests
async fn handle_passport(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<BatchReport>, OcrError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let images = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| OcrError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?;
        read_multipart(multipart, state.config.max_file_size).await?
    } else if content_type.starts_with("application/json") {
        let Json(body) = Json::<JsonImageRequest>::from_request(request, &state)
            .await
            .map_err(|e| OcrError::InvalidRequest(format!("Invalid JSON body: {}", e)))?;
        vec![decode_json_image(&body.image, state.config.max_file_size)?]
    } else {
        return Err(OcrError::InvalidRequest(format!(
            "Unsupported content type: {}",
            if content_type.is_empty() { "none" } else { content_type.as_str() }
        )));
    };

    let report = state.orchestrator.recognize_passports(images).await?;
    Ok(Json(report))
}

async fn read_multipart(
    mut multipart: Multipart,
    max_file_size: usize,
) -> Result<Vec<PassportImage>, OcrError> {
    let mut images = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| OcrError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
    {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("image_{}.jpg", images.len() + 1));
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "image/jpeg".to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| OcrError::InvalidRequest(format!("Failed to read file data: {}", e)))?;

        check_size(&data, max_file_size)?;
        if !content_type.starts_with("image/") {
            tracing::warn!("Received {} with content type: {}", file_name, content_type);
        }

        images.push(PassportImage::new(file_name, content_type, data));
    }

    Ok(images)
}

/// Decode a base64 image, with or without a `data:` URL prefix
fn decode_json_image(image: &str, max_file_size: usize) -> Result<PassportImage, OcrError> {
    let (content_type, payload) = match image.strip_prefix("data:") {
        Some(rest) => {
            let (meta, payload) = rest
                .split_once(',')
                .ok_or_else(|| OcrError::InvalidRequest("Malformed data URL".to_string()))?;
            let mime = meta.split(';').next().filter(|m| !m.is_empty());
            (mime.unwrap_or("image/jpeg").to_string(), payload)
        }
        None => ("image/jpeg".to_string(), image),
    };

    if payload.trim().is_empty() {
        return Err(OcrError::MissingFile);
    }

    let data = STANDARD
        .decode(payload.trim())
        .map_err(|e| OcrError::InvalidRequest(format!("Invalid base64 image: {}", e)))?;
    let data = Bytes::from(data);
    check_size(&data, max_file_size)?;

    Ok(PassportImage::new(JSON_IMAGE_NAME, content_type, data))
}

fn check_size(data: &Bytes, max_file_size: usize) -> Result<(), OcrError> {
    if data.len() > max_file_size {
        return Err(OcrError::ImageTooLarge {
            size: data.len(),
            max: max_file_size,
        });
    }
    Ok(())
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator = &state.orchestrator;
    let key_pool = orchestrator.key_pool();
    let usage = key_pool.usage().await;

    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        engines: orchestrator.engines().info(),
        max_file_size_bytes: state.config.max_file_size,
        mrz_configured: state.config.mrz_api_key.is_some(),
        cjk_keys: key_pool.key_count(),
        key_pool_usage: usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_data_url() {
        let image = decode_json_image("data:image/png;base64,AQID", 10).unwrap();
        assert_eq!(image.file_name, "passport.jpg");
        assert_eq!(image.content_type, "image/png");
        assert_eq!(&image.data[..], &[1, 2, 3]);
    }

    #[test]
    fn test_decode_bare_base64() {
        let image = decode_json_image("AQID", 10).unwrap();
        assert_eq!(image.content_type, "image/jpeg");
        assert_eq!(image.data.len(), 3);
    }

    #[test]
    fn test_decode_invalid_base64() {
        assert!(matches!(
            decode_json_image("not base64!", 10),
            Err(OcrError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_decode_empty_payload() {
        assert!(matches!(
            decode_json_image("data:image/png;base64,", 10),
            Err(OcrError::MissingFile)
        ));
    }

    #[test]
    fn test_decode_too_large() {
        assert!(matches!(
            decode_json_image("AQID", 2),
            Err(OcrError::ImageTooLarge { size: 3, max: 2 })
        ));
    }
}
