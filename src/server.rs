use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::extract::{self, ContentExtractor, ReadabilityExtractor};
use crate::fetch::FetchPolicy;
use crate::image::{self, ImageRequest};
use crate::models::{ExtractQuery, ImageQuery};

/// Per-process handler configuration. Holds no mutable state; every request
/// gets its own outbound client.
#[derive(Clone)]
pub struct AppState {
    pub image_policy: FetchPolicy,
    pub article_policy: FetchPolicy,
    pub extractor: Arc<dyn ContentExtractor>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            image_policy: FetchPolicy::image(),
            article_policy: FetchPolicy::article(),
            extractor: Arc::new(ReadabilityExtractor::default()),
        }
    }
}

impl AppState {
    pub fn with_extractor(mut self, extractor: impl ContentExtractor + 'static) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/get_single_arxiv_image", get(get_single_arxiv_image))
        .route("/extract_article_content", get(extract_article_content))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl+C.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn get_single_arxiv_image(
    State(state): State<AppState>,
    query: Result<Query<ImageQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::InvalidInput(e.body_text()))?;
    tracing::info!(
        "Received request for URL: {}, Index: {}",
        query.url.as_deref().unwrap_or("<missing>"),
        query.index.as_deref().unwrap_or("<missing>")
    );

    let request = ImageRequest::try_from(query)?;
    let png = image::fetch_image(&state.image_policy, &request).await?;
    Ok(png_response(png))
}

fn png_response(png: Bytes) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, "image/png")], png).into_response()
}

async fn extract_article_content(
    State(state): State<AppState>,
    query: Result<Query<ExtractQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::InvalidInput(e.body_text()))?;
    let url = query
        .url
        .ok_or_else(|| ApiError::InvalidInput("Missing required query parameter 'url'.".into()))?;
    tracing::info!("Received extraction request for URL: {}", url);

    let article =
        extract::extract_article(&state.article_policy, state.extractor.clone(), &url).await?;
    Ok((StatusCode::OK, Json(article)).into_response())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;

    async fn send(uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router(AppState::default())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_png_response_headers_and_body() {
        let png = Bytes::from_static(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
        let response = png_response(png.clone());

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes, png);
    }

    #[tokio::test]
    async fn test_image_validation_errors_are_json() {
        for uri in [
            "/get_single_arxiv_image?url=https://arxiv.org/html/2504.07491v1&index=7",
            "/get_single_arxiv_image?url=https://arxiv.org/html/2504.07491v1&index=abc",
            "/get_single_arxiv_image?url=https://example.com/html/2504.07491v1&index=1",
            "/get_single_arxiv_image?index=1",
            "/get_single_arxiv_image",
        ] {
            let (status, body) = send(uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert!(body["detail"].is_string(), "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_extract_validation_errors_are_json() {
        for uri in [
            "/extract_article_content",
            "/extract_article_content?url=example.com/story",
            "/extract_article_content?url=ftp://example.com/story",
            "/extract_article_content?url=http://",
        ] {
            let (status, body) = send(uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert!(body["detail"].is_string(), "{}", uri);
        }
    }
}
