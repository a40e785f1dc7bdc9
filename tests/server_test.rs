use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use passport_ocr::config::Config;
use passport_ocr::engine::{OcrEngine, PassportImage};
use passport_ocr::engines::EngineRegistry;
use passport_ocr::error::OcrError;
use passport_ocr::quota::{InMemoryUsageStore, QuotaLimitedKeyPool};
use passport_ocr::recognition::RecognitionOrchestrator;
use passport_ocr::server::{router, AppState};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const MRZ_TEXT: &str = "P<TWNLIN<<LI<HUI<<<<<<<<<<<<<<<<<<<<<<<<<<<<\n\
                        3141148363TWN6012111F2610254G220796971<<<32";

const JPEG: &[u8] = b"\xff\xd8\xff";

struct FixedText(&'static str);

#[async_trait]
impl OcrEngine for FixedText {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn description(&self) -> &'static str {
        "returns a fixed transcript"
    }

    async fn recognize(&self, _image: &PassportImage, _api_key: &str) -> Result<String, OcrError> {
        Ok(self.0.to_string())
    }

    fn supported_languages(&self) -> Vec<String> {
        Vec::new()
    }
}

fn app(mrz_api_key: Option<&str>) -> axum::Router {
    let config = Config {
        mrz_api_key: mrz_api_key.map(str::to_string),
        max_file_size: 1024,
        ..Config::default()
    };
    let registry = EngineRegistry::with_engines(
        Arc::new(FixedText(MRZ_TEXT)),
        Arc::new(FixedText("姓名\n林麗惠\n")),
    );
    let pool = QuotaLimitedKeyPool::new(
        "google_vision",
        vec!["vision-key".to_string()],
        980,
        Arc::new(InMemoryUsageStore::new()),
    );
    let orchestrator = RecognitionOrchestrator::new(registry, config.mrz_api_key.clone(), pool);

    router(AppState {
        orchestrator: Arc::new(orchestrator),
        config: Arc::new(config),
    })
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn multipart_request(files: &[(&str, &[u8])]) -> Request<Body> {
    let boundary = "passport-test-boundary";
    let mut body = Vec::new();
    for (name, data) in files {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\n",
                name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/ocr/passport")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/ocr/passport")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = app(None)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn test_info_reports_engines_and_pool() {
    let response = app(Some("mrz-key"))
        .oneshot(Request::get("/info").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["engines"].as_array().unwrap().len(), 2);
    assert_eq!(body["engines"][0]["role"], "mrz");
    assert_eq!(body["max_file_size_bytes"], 1024);
    assert_eq!(body["cjk_keys"], 1);
    assert_eq!(body["key_pool_usage"]["limit"], 980);
    assert_eq!(body["key_pool_usage"]["enabled"], true);
}

#[tokio::test]
async fn test_multipart_batch() {
    let request = multipart_request(&[("lin.jpg", JPEG), ("copy.jpg", JPEG)]);
    let response = app(Some("mrz-key")).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["total"], 2);
    assert_eq!(body["successful"], 2);
    assert_eq!(body["keyPoolUsage"]["current"], 2);

    let first = &body["results"][0];
    assert_eq!(first["fileName"], "lin.jpg");
    assert_eq!(first["customer"]["name"], "林麗惠");
    assert_eq!(first["customer"]["englishName"], "LIN LIHUI");
    assert_eq!(first["customer"]["passportNumber"], "314114836");
    assert_eq!(first["customer"]["dateOfBirth"], "1960-12-11");
    assert_eq!(first["customer"]["passportExpiryDate"], "2026-10-25");
    assert_eq!(first["customer"]["sex"], "女");
    assert_eq!(first["customer"]["nameSource"], "cjk");
    assert_eq!(first["customer"]["nameConfidence"], "high");
}

#[tokio::test]
async fn test_json_data_url() {
    let request = json_request(r#"{"image": "data:image/jpeg;base64,/9j/"}"#);
    let response = app(Some("mrz-key")).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["results"][0]["fileName"], "passport.jpg");
}

#[tokio::test]
async fn test_invalid_base64_rejected() {
    let response = app(Some("mrz-key"))
        .oneshot(json_request(r#"{"image": "%%%"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_unsupported_content_type() {
    let request = Request::builder()
        .method("POST")
        .uri("/ocr/passport")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("hello"))
        .unwrap();
    let response = app(Some("mrz-key")).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_multipart_without_files() {
    let response = app(Some("mrz-key"))
        .oneshot(multipart_request(&[]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "MISSING_FILE");
}

#[tokio::test]
async fn test_oversized_image() {
    let large = vec![0u8; 2048];
    let response = app(Some("mrz-key"))
        .oneshot(multipart_request(&[("big.jpg", &large[..])]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(response).await["code"], "IMAGE_TOO_LARGE");
}

#[tokio::test]
async fn test_missing_mrz_key() {
    let response = app(None)
        .oneshot(multipart_request(&[("lin.jpg", JPEG)]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["code"], "PROVIDER_CONFIG");
}
