use axum::body::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use url::Url;

use crate::error::ApiError;
use crate::fetch::{self, FetchPolicy, TransportFailure};
use crate::models::ImageQuery;

// ── Constants ────────────────────────────────────────────────────────────────

const MIN_URL_LEN: usize = 15;
const MIN_INDEX: u8 = 1;
const MAX_INDEX: u8 = 4;
const PNG_MEDIA_TYPE: &str = "image/png";

static ARXIV_HTML_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://arxiv\.org/html/.*").unwrap());

// ── Validated request ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub url: String,
    pub index: u8,
}

impl TryFrom<ImageQuery> for ImageRequest {
    type Error = ApiError;

    fn try_from(query: ImageQuery) -> Result<Self, Self::Error> {
        let url = query
            .url
            .ok_or_else(|| ApiError::InvalidInput("Missing required query parameter 'url'.".into()))?;
        let index = query.index.ok_or_else(|| {
            ApiError::InvalidInput("Missing required query parameter 'index'.".into())
        })?;

        validate_url(&url)?;
        let index = parse_index(&index)?;
        Ok(Self { url, index })
    }
}

impl ImageRequest {
    /// The upstream location of the requested figure.
    pub fn image_url(&self) -> String {
        image_url(&self.url, self.index)
    }
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Base URL with trailing slashes removed, followed by `/x{index}.png`.
pub fn image_url(base_url: &str, index: u8) -> String {
    format!("{}/x{}.png", base_url.trim_end_matches('/'), index)
}

pub async fn fetch_image(policy: &FetchPolicy, request: &ImageRequest) -> Result<Bytes, ApiError> {
    let target = request.image_url();
    tracing::info!("Attempting to fetch image: {}", target);
    fetch_png(policy, &target, request.index).await
}

/// Fetch `target` and interpret the outcome as figure `index`.
pub async fn fetch_png(policy: &FetchPolicy, target: &str, index: u8) -> Result<Bytes, ApiError> {
    let response = policy
        .get(target)
        .await
        .map_err(|e| transport_error(target, e))?;

    match response.status() {
        StatusCode::OK => {
            let content_type = fetch::content_type(&response);
            if !content_type.contains(PNG_MEDIA_TYPE) {
                tracing::warn!(
                    "URL {} returned 200 OK but Content-Type is '{}', not 'image/png'.",
                    target,
                    content_type
                );
                return Err(ApiError::WrongContentType(format!(
                    "Resource found at index {}, but it's not a PNG image (Content-Type: {}).",
                    index, content_type
                )));
            }
            let body = response
                .bytes()
                .await
                .map_err(|e| transport_error(target, e.into()))?;
            tracing::info!(
                "Successfully fetched x{}.png ({} bytes). Content-Type: {}",
                index,
                body.len(),
                content_type
            );
            Ok(body)
        }
        StatusCode::NOT_FOUND => {
            tracing::info!("Image x{}.png not found (404) at {}.", index, target);
            Err(ApiError::NotFound(format!(
                "Image index {} not found for this URL.",
                index
            )))
        }
        status => {
            tracing::warn!(
                "Failed to fetch x{}.png. Status code: {}. URL: {}",
                index,
                status.as_u16(),
                target
            );
            Err(ApiError::UpstreamStatus(format!(
                "Failed to fetch image from arXiv. Status code: {}",
                status.as_u16()
            )))
        }
    }
}

// ── Validation ───────────────────────────────────────────────────────────────

fn validate_url(url: &str) -> Result<(), ApiError> {
    if url.len() < MIN_URL_LEN || !ARXIV_HTML_RE.is_match(url) {
        return Err(ApiError::InvalidInput(
            "URL must be an arXiv HTML page (http(s)://arxiv.org/html/...).".into(),
        ));
    }

    // Stricter check is advisory only: mismatches are logged, not rejected.
    let parsed = Url::parse(url).map_err(|_| {
        tracing::error!("Could not parse URL: {}", url);
        ApiError::InvalidInput("Invalid URL format.".into())
    })?;
    let strict_ok = matches!(parsed.scheme(), "http" | "https")
        && parsed.host_str() == Some("arxiv.org")
        && parsed.port().is_none()
        && parsed.path().starts_with("/html/");
    if !strict_ok {
        tracing::warn!(
            "URL '{}' passed pattern check but failed detailed parse check. Proceeding cautiously.",
            url
        );
    }
    Ok(())
}

fn parse_index(raw: &str) -> Result<u8, ApiError> {
    let index: i64 = raw.parse().map_err(|_| {
        ApiError::InvalidInput(format!(
            "Index must be an integer between {} and {}, got '{}'.",
            MIN_INDEX, MAX_INDEX, raw
        ))
    })?;
    match u8::try_from(index) {
        Ok(i) if (MIN_INDEX..=MAX_INDEX).contains(&i) => Ok(i),
        _ => Err(ApiError::InvalidInput(format!(
            "Index must be between {} and {}, got {}.",
            MIN_INDEX, MAX_INDEX, index
        ))),
    }
}

fn transport_error(target: &str, failure: TransportFailure) -> ApiError {
    match failure {
        TransportFailure::Timeout(_) => {
            tracing::error!("Timeout occurred while fetching {}", target);
            ApiError::Timeout("Gateway Timeout while fetching image from arXiv.".into())
        }
        TransportFailure::Connect(msg) => {
            tracing::error!("Connection error while fetching {}: {}", target, msg);
            ApiError::Unreachable(
                "Service Unavailable. Could not connect to arXiv server to fetch image.".into(),
            )
        }
        TransportFailure::Other(msg) => {
            tracing::error!("An unexpected error occurred fetching {}: {}", target, msg);
            ApiError::Internal(format!("An internal error occurred: {}", msg))
        }
    }
}
