//! HTTP surface of the daemon.
//!
//! `POST /api/fotos/validar` takes multipart form fields `usuarioId` and
//! `fotos` (1..N file parts) and always answers with the report shape
//! `{"fotosValidas": [...], "errores": [...]}`: 200 for every enumerated
//! validation outcome, 400 for an unusable request body, 500 only for
//! unexpected internal failure.

use crate::engine::EngineHandle;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use facegate_core::{Photo, ValidationReport};
use tower_http::trace::TraceLayer;

/// Batches of up to 8 photos; phone camera JPEGs run a few MB each.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    engine: EngineHandle,
}

pub fn router(engine: EngineHandle) -> Router {
    Router::new()
        .route("/api/fotos/validar", post(validate_photos))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { engine })
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "facegated",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn validate_photos(
    State(state): State<AppState>,
    multipart: Multipart,
) -> (StatusCode, Json<ValidationReport>) {
    let (subject, photos) = match read_request(multipart).await {
        Ok(parts) => parts,
        Err(message) => {
            return (StatusCode::BAD_REQUEST, Json(ValidationReport::fatal(message)));
        }
    };

    tracing::debug!(subject, photos = photos.len(), "enrollment request received");

    match state.engine.enroll(subject, photos).await {
        Ok(report) => (StatusCode::OK, Json(report)),
        Err(e) => {
            tracing::error!(error = %e, "enrollment request failed internally");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ValidationReport::fatal(format!("server error: {e}"))),
            )
        }
    }
}

/// Pull `usuarioId` and the `fotos` file parts out of the multipart body,
/// preserving part order.
async fn read_request(mut multipart: Multipart) -> Result<(String, Vec<Photo>), String> {
    let mut subject: Option<String> = None;
    let mut photos = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("malformed multipart body: {e}"))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "usuarioId" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| format!("unreadable field usuarioId: {e}"))?;
                subject = Some(value);
            }
            "fotos" => {
                let file_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| format!("unreadable photo part: {e}"))?;
                photos.push(Photo::new(file_name, bytes.to_vec()));
            }
            // Unknown fields are skipped, matching lenient form handling.
            _ => {}
        }
    }

    let subject = subject
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "missing form field: usuarioId".to_string())?;

    Ok((subject, photos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::spawn_engine;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use std::path::PathBuf;
    use tower::ServiceExt;

    const BOUNDARY: &str = "facegate-test-boundary";

    fn test_router(root: &std::path::Path) -> Router {
        let config = Config {
            listen_addr: "127.0.0.1:0".into(),
            images_dir: root.join("images"),
            models_dir: root.join("models"),
            detector_model: Some(PathBuf::from("/nonexistent/det_10g.onnx")),
            embedder_model: Some(PathBuf::from("/nonexistent/w600k_r50.onnx")),
            min_photos: 5,
            max_photos: 8,
            similarity_threshold: 100.0,
            compare_size: 100,
        };
        router(spawn_engine(&config))
    }

    fn multipart_body(subject: Option<&str>, photos: &[(&str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(s) = subject {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"usuarioId\"\r\n\r\n{s}\r\n"
                )
                .as_bytes(),
            );
        }
        for (name, bytes) in photos {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"fotos\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn post_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/fotos/validar")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_count_gate_returns_200_with_error() {
        let root = tempfile::tempdir().unwrap();
        let app = test_router(root.path());

        let body = multipart_body(
            Some("user1"),
            &[("a.jpg", b"junk".as_slice()), ("b.jpg", b"junk".as_slice())],
        );
        let response = app.oneshot(post_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["fotosValidas"].as_array().unwrap().len(), 0);
        let errores = json["errores"].as_array().unwrap();
        assert_eq!(errores.len(), 1);
        assert!(errores[0].as_str().unwrap().contains("at least 5"));
    }

    #[tokio::test]
    async fn test_missing_subject_is_bad_request() {
        let root = tempfile::tempdir().unwrap();
        let app = test_router(root.path());

        let body = multipart_body(None, &[("a.jpg", b"junk".as_slice())]);
        let response = app.oneshot(post_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["fotosValidas"].as_array().unwrap().len(), 0);
        assert!(json["errores"][0].as_str().unwrap().contains("usuarioId"));
    }

    #[tokio::test]
    async fn test_detector_unavailable_still_200() {
        let root = tempfile::tempdir().unwrap();
        let app = test_router(root.path());

        let parts: Vec<(String, Vec<u8>)> = (0..5)
            .map(|i| (format!("{i}.jpg"), b"junk".to_vec()))
            .collect();
        let refs: Vec<(&str, &[u8])> = parts
            .iter()
            .map(|(n, b)| (n.as_str(), b.as_slice()))
            .collect();
        let response = app
            .oneshot(post_request(multipart_body(Some("user1"), &refs)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert!(json["errores"][0]
            .as_str()
            .unwrap()
            .contains("face detector unavailable"));
    }

    #[tokio::test]
    async fn test_health() {
        let root = tempfile::tempdir().unwrap();
        let app = test_router(root.path());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["service"], "facegated");
        assert!(json["version"].is_string());
    }
}
