use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};

// ── Constants ────────────────────────────────────────────────────────────────

pub const IMAGE_TIMEOUT: Duration = Duration::from_secs(15);
pub const ARTICLE_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REDIRECTS: usize = 10;

const RELAY_USER_AGENT: &str = "arxiv-relay-api/1.0";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

// ── Transport failures ───────────────────────────────────────────────────────

/// Outbound failures that happen before an HTTP status is available, or
/// while the body is being read.
#[derive(Debug, thiserror::Error)]
pub enum TransportFailure {
    #[error("TimeoutError: {0}")]
    Timeout(String),
    #[error("ConnectError: {0}")]
    Connect(String),
    #[error("RequestError: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportFailure::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportFailure::Connect(e.to_string())
        } else {
            TransportFailure::Other(e.to_string())
        }
    }
}

// ── Fetch policy ─────────────────────────────────────────────────────────────

/// How a single outbound GET is performed. A fresh client is built per
/// request so nothing is shared between concurrent requests.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: &'static str,
    pub browser_headers: bool,
}

impl FetchPolicy {
    /// Policy for arXiv figure downloads.
    pub fn image() -> Self {
        Self {
            timeout: IMAGE_TIMEOUT,
            connect_timeout: CONNECT_TIMEOUT,
            max_redirects: MAX_REDIRECTS,
            user_agent: RELAY_USER_AGENT,
            browser_headers: false,
        }
    }

    /// Policy for arbitrary article pages: browser identification so that
    /// servers rejecting non-browser clients still answer.
    pub fn article() -> Self {
        Self {
            timeout: ARTICLE_TIMEOUT,
            connect_timeout: CONNECT_TIMEOUT,
            max_redirects: MAX_REDIRECTS,
            user_agent: BROWSER_USER_AGENT,
            browser_headers: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.connect_timeout = self.connect_timeout.min(timeout);
        self
    }

    fn client(&self) -> Result<reqwest::Client, reqwest::Error> {
        let mut headers = HeaderMap::new();
        if self.browser_headers {
            headers.insert(
                ACCEPT,
                HeaderValue::from_static(
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                ),
            );
            headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        }

        reqwest::ClientBuilder::new()
            .connect_timeout(self.connect_timeout)
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::limited(self.max_redirects))
            .user_agent(self.user_agent)
            .default_headers(headers)
            .build()
    }

    /// Perform one GET. Non-2xx statuses are returned as responses; only
    /// transport problems become errors.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, TransportFailure> {
        let client = self.client()?;
        Ok(client.get(url).send().await?)
    }
}

/// Lower-cased `Content-Type` of a response, empty when absent.
pub fn content_type(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_timeout_caps_connect_timeout() {
        let policy = FetchPolicy::article().with_timeout(Duration::from_millis(200));
        assert_eq!(policy.timeout, Duration::from_millis(200));
        assert_eq!(policy.connect_timeout, Duration::from_millis(200));

        let policy = FetchPolicy::image().with_timeout(Duration::from_secs(30));
        assert_eq!(policy.connect_timeout, CONNECT_TIMEOUT);
    }

    #[test]
    fn test_policies() {
        assert_eq!(FetchPolicy::image().timeout, IMAGE_TIMEOUT);
        assert!(!FetchPolicy::image().browser_headers);
        assert!(FetchPolicy::article().user_agent.starts_with("Mozilla/5.0"));
    }

    #[tokio::test]
    async fn test_browser_headers_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/page")
            .match_header("user-agent", mockito::Matcher::Regex("^Mozilla/5.0".into()))
            .match_header("accept-language", "en-US,en;q=0.9")
            .with_status(200)
            .create_async()
            .await;

        let response = FetchPolicy::article()
            .get(&format!("{}/page", server.url()))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_redirects_followed() {
        let mut server = mockito::Server::new_async().await;
        let _moved = server
            .mock("GET", "/old")
            .with_status(301)
            .with_header("location", "/new")
            .create_async()
            .await;
        let _target = server
            .mock("GET", "/new")
            .with_status(200)
            .with_body("here")
            .create_async()
            .await;

        let response = FetchPolicy::image()
            .get(&format!("{}/old", server.url()))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "here");
    }

    #[tokio::test]
    async fn test_connection_refused_is_connect_failure() {
        // Bind then drop to obtain a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = FetchPolicy::image()
            .get(&format!("http://{}/x1.png", addr))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportFailure::Connect(_)), "{:?}", err);
    }
}
