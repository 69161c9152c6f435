//! Router assembly.

use crate::api::handlers;
use crate::config::ServerConfig;
use crate::process::DocumentProcessor;
use crate::sheets::SheetAppender;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Handles shared by every request. Built once at start-up.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<DocumentProcessor>,
    /// `None` when no spreadsheet is configured; `/save-in-sheets` then fails.
    pub appender: Option<Arc<SheetAppender>>,
}

impl AppState {
    pub fn new(processor: DocumentProcessor, appender: Option<SheetAppender>) -> Self {
        Self {
            processor: Arc::new(processor),
            appender: appender.map(Arc::new),
        }
    }
}

/// Build the application router.
///
/// Layers, outermost first: CORS (any origin, method and header), request
/// tracing, upload body limit.
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/detect-text", post(handlers::detect_text))
        .route("/save-in-sheets", post(handlers::save_in_sheets))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessingConfig;
    use crate::error::{InvoiceError, ServiceError};
    use crate::output::FieldMap;
    use crate::pipeline::input::{Document, Page};
    use crate::pipeline::render::PageRenderer;
    use crate::services::{
        AnalysisService, AnalyzeRequest, AnalyzeResponse, AppendResponse, Block, SheetService,
    };
    use async_trait::async_trait;
    use axum::body::{Body, Bytes};
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Splits the upload on `|`, one page per piece.
    struct SplitRenderer;

    impl PageRenderer for SplitRenderer {
        fn render(&self, document: &Document) -> Result<Vec<Page>, InvoiceError> {
            Ok(document
                .content
                .split(|b| *b == b'|')
                .enumerate()
                .map(|(index, image)| Page {
                    index,
                    image: image.to_vec(),
                })
                .collect())
        }
    }

    /// Answers every query with the page text; pages reading `fail` error out.
    struct EchoService;

    #[async_trait]
    impl AnalysisService for EchoService {
        fn name(&self) -> &str {
            "echo"
        }

        async fn analyze(
            &self,
            request: AnalyzeRequest<'_>,
        ) -> Result<AnalyzeResponse, ServiceError> {
            let page = String::from_utf8_lossy(request.page_bytes).to_string();
            if page == "fail" {
                return Err(ServiceError::Status {
                    service: "echo",
                    status: 500,
                    message: "boom".into(),
                });
            }
            let mut blocks: Vec<Block> = request
                .queries
                .iter()
                .map(|q| Block::query(&q.alias, &q.text, &q.alias, &[]))
                .collect();
            blocks.extend(
                request
                    .queries
                    .iter()
                    .map(|q| Block::query_result(&format!("r-{}", q.alias), Some(&page))),
            );
            Ok(AnalyzeResponse { blocks })
        }
    }

    #[derive(Default)]
    struct MemorySheet {
        rows: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl SheetService for MemorySheet {
        fn name(&self) -> &str {
            "memory"
        }

        async fn append_values(
            &self,
            _spreadsheet_id: &str,
            _range: &str,
            values: Vec<Vec<String>>,
        ) -> Result<AppendResponse, ServiceError> {
            let cells = values.iter().map(|r| r.len() as u64).sum();
            let rows = values.len() as u64;
            self.rows.lock().unwrap().extend(values);
            Ok(AppendResponse {
                updated_range: None,
                updated_rows: rows,
                updated_cells: cells,
            })
        }
    }

    fn app_with(sheet: Option<Arc<MemorySheet>>, config: &ServerConfig) -> Router {
        let processor = DocumentProcessor::new(Arc::new(EchoService), &ProcessingConfig::default())
            .with_renderer(Arc::new(SplitRenderer));
        let appender =
            sheet.map(|s| SheetAppender::new(s as Arc<dyn SheetService>, "sheet-id", "Sheet1!A1"));
        router(AppState::new(processor, appender), config)
    }

    fn app() -> Router {
        app_with(Some(Arc::new(MemorySheet::default())), &ServerConfig::default())
    }

    const BOUNDARY: &str = "invoice-test-boundary";

    fn upload(field: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"invoice\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        Request::post("/detect-text")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_post(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send_raw(app: Router, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = send_raw(app, request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn health_reports_version() {
        let (status, body) = send(
            app(),
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn single_image_returns_one_mapping() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, b'x'];
        let (status, body) = send_raw(app(), upload("file", "image/png", &png)).await;
        assert_eq!(status, StatusCode::OK);
        // Parsed into ordered maps to check the key order on the wire.
        let pages: Vec<FieldMap> = serde_json::from_slice(&body).unwrap();
        assert_eq!(pages.len(), 1);
        let keys: Vec<&str> = pages[0].keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["CNPJ", "price", "company", "date", "invoice_number", "invoice_series"]
        );
    }

    #[tokio::test]
    async fn pages_come_back_in_order() {
        let (status, body) = send(app(), upload("file", "application/pdf", b"one|two|three")).await;
        assert_eq!(status, StatusCode::OK);
        let prices: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["price"].as_str().unwrap())
            .collect();
        assert_eq!(prices, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn failing_page_returns_single_error() {
        let (status, body) = send(app(), upload("file", "application/pdf", b"one|fail|three")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("page 2"), "{message}");
        assert!(body.get(0).is_none());
    }

    #[tokio::test]
    async fn missing_file_field_is_bad_request() {
        let (status, body) = send(app(), upload("other", "image/png", b"data")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("file"));
    }

    #[tokio::test]
    async fn empty_upload_is_bad_request() {
        let (status, body) = send(app(), upload("file", "image/png", b"")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn non_multipart_upload_is_bad_request() {
        let (status, body) = send(app(), json_post("/detect-text", "{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let config = ServerConfig {
            max_upload_bytes: 64,
            ..ServerConfig::default()
        };
        let app = app_with(None, &config);
        let (status, body) = send(app, upload("file", "image/png", &[7u8; 4096])).await;
        assert!(!status.is_success());
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn save_in_sheets_appends_rows() {
        let sheet = Arc::new(MemorySheet::default());
        let app = app_with(Some(Arc::clone(&sheet)), &ServerConfig::default());
        let (status, body) = send(
            app,
            json_post(
                "/save-in-sheets",
                r#"[{"price":"10,00","date":"01/01/2024"},{"price":"20,00","date":"02/01/2024"}]"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"status": "success", "updatedCells": 4}));
        assert_eq!(
            *sheet.rows.lock().unwrap(),
            vec![
                vec!["10,00".to_string(), "01/01/2024".to_string()],
                vec!["20,00".to_string(), "02/01/2024".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn save_in_sheets_rejects_bad_payloads() {
        for payload in ["", "[]", "{}", r#"[{"price": 10}]"#, "not json"] {
            let sheet = Arc::new(MemorySheet::default());
            let app = app_with(Some(Arc::clone(&sheet)), &ServerConfig::default());
            let (status, body) = send(app, json_post("/save-in-sheets", payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "payload {payload:?}");
            assert_eq!(body["error"], "Missing or invalid data");
            assert!(sheet.rows.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn save_in_sheets_without_target_is_server_error() {
        let app = app_with(None, &ServerConfig::default());
        let (status, body) = send(app, json_post("/save-in-sheets", r#"[{"a":"b"}]"#)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Spreadsheet export is not configured");
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let request = Request::get("/health")
            .header(header::ORIGIN, "http://localhost:8501")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }
}
