use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use scraper::{node::Node, ElementRef, Html, Selector};
use url::Url;

use crate::error::ApiError;
use crate::fetch::{FetchPolicy, TransportFailure};
use crate::models::ExtractResponse;

// ── Constants ────────────────────────────────────────────────────────────────

const MIN_CONTAINER_TEXT_LEN: usize = 200;
const MIN_ARTICLE_LEN: usize = 50;
const MAX_LINK_DENSITY: f64 = 0.5;

/// Subtrees that never carry article text.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "svg", "template", "form", "button", "select", "input",
    "textarea", "iframe", "nav", "footer", "aside", "audio", "video",
];

const TABLE_TAGS: &[&str] = &["table", "thead", "tbody", "tfoot", "tr", "td", "th", "caption"];

/// Elements emitted as a single text block.
const BLOCK_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote", "pre", "dt", "dd", "figcaption",
];

/// Elements that hold further blocks; a `div` containing none of these (or
/// any block tag) is treated as a block itself.
const CONTAINER_TAGS: &[&str] = &[
    "div", "section", "article", "main", "header", "ul", "ol", "dl", "table", "figure",
];

// ── Lazy static regexes ──────────────────────────────────────────────────────

static KEYWORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(article|content|post|entry|story|body|text)").unwrap());

static COMMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(comments?|commentlist|disqus(_thread)?|respond|repl(y|ies))\b").unwrap()
});

// ── Lazy static selectors ────────────────────────────────────────────────────

static SEMANTIC_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("article, main").unwrap());
static DIV_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("div").unwrap());
static BODY_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());
static ROW_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static CELL_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("td, th").unwrap());
static LINK_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());

// ── Extraction capability ────────────────────────────────────────────────────

/// Boilerplate removal: turn a full HTML page into the plain text of its main
/// content, or `None` when no article could be recognised.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, html: &str) -> Option<String>;
}

/// Default extractor built on `scraper`. Picks the most article-like
/// container and keeps paragraph-level text blocks that are not dominated by
/// links.
#[derive(Debug, Clone, Default)]
pub struct ReadabilityExtractor {
    pub include_comments: bool,
    pub include_tables: bool,
}

impl ContentExtractor for ReadabilityExtractor {
    fn extract(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let container = find_container(&document)?;

        let mut blocks = Vec::new();
        self.walk(container, container.value().name() != "body", &mut blocks);

        let text = blocks.join("\n\n");
        if text.chars().count() < MIN_ARTICLE_LEN {
            return None;
        }
        Some(text)
    }
}

impl ReadabilityExtractor {
    /// Depth-first walk with an explicit stack; fetched pages can nest
    /// arbitrarily deep.
    fn walk(&self, root: ElementRef<'_>, in_article_or_main: bool, blocks: &mut Vec<String>) {
        let mut stack = vec![(root, in_article_or_main)];

        while let Some((el, in_article_or_main)) = stack.pop() {
            let name = el.value().name();

            if SKIP_TAGS.contains(&name) {
                continue;
            }
            if name == "header" && !in_article_or_main {
                continue;
            }
            if !self.include_tables && TABLE_TAGS.contains(&name) {
                continue;
            }
            if !self.include_comments && COMMENT_RE.is_match(&class_id(el)) {
                continue;
            }

            if name == "table" {
                self.push_table(el, blocks);
                continue;
            }

            if BLOCK_TAGS.contains(&name) || (name == "div" && !has_structural_descendant(el)) {
                let text = normalize_text(self.visible_text(el));
                if text.is_empty() || link_density(el, &text) > MAX_LINK_DENSITY {
                    continue;
                }
                if name == "li" {
                    blocks.push(format!("- {}", text));
                } else {
                    blocks.push(text);
                }
                continue;
            }

            let child_in_article = in_article_or_main || matches!(name, "article" | "main");
            stack.extend(
                el.children()
                    .rev()
                    .filter_map(ElementRef::wrap)
                    .map(|child| (child, child_in_article)),
            );
        }
    }

    fn push_table(&self, table: ElementRef<'_>, blocks: &mut Vec<String>) {
        let rows: Vec<String> = table
            .select(&ROW_SEL)
            .map(|row| {
                row.select(&CELL_SEL)
                    .map(|cell| normalize_text(self.visible_text(cell)))
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .filter(|s| !s.is_empty())
            .collect();
        if !rows.is_empty() {
            blocks.push(rows.join("\n"));
        }
    }

    /// Text of an element, skipping hidden subtrees. Comment nodes are never
    /// included.
    fn visible_text(&self, el: ElementRef<'_>) -> String {
        let mut out = String::new();
        let mut stack: Vec<_> = el.children().rev().collect();

        while let Some(node) = stack.pop() {
            match node.value() {
                Node::Text(text) => out.push_str(&*text.text),
                Node::Element(element) => {
                    let name = element.name();
                    if SKIP_TAGS.contains(&name)
                        || (!self.include_tables && TABLE_TAGS.contains(&name))
                    {
                        continue;
                    }
                    if name == "br" {
                        out.push(' ');
                    }
                    stack.extend(node.children().rev());
                }
                _ => {}
            }
        }
        out
    }
}

// ── Endpoint pipeline ────────────────────────────────────────────────────────

pub async fn extract_article(
    policy: &FetchPolicy,
    extractor: Arc<dyn ContentExtractor>,
    url: &str,
) -> Result<ExtractResponse, ApiError> {
    validate_url(url)?;
    let html = fetch_html(policy, url).await?;

    // Extraction is CPU-bound and may panic on hostile markup; a panic comes
    // back as a JoinError instead of unwinding through the handler.
    let extracted = tokio::task::spawn_blocking(move || extractor.extract(&html))
        .await
        .map_err(|e| {
            tracing::error!("Content extraction failed for {}: {}", url, e);
            ApiError::Internal(format!("Content extraction failed: {}", e))
        })?;

    match extracted {
        Some(content) if !content.trim().is_empty() => {
            tracing::info!("Extracted {} characters from {}", content.len(), url);
            Ok(ExtractResponse {
                url: url.to_string(),
                content,
            })
        }
        _ => {
            tracing::info!("No article content recognised at {}", url);
            Err(ApiError::Unprocessable(
                "Could not extract main content; the page was not recognised as an article."
                    .into(),
            ))
        }
    }
}

// ── URL validation ───────────────────────────────────────────────────────────

fn validate_url(url: &str) -> Result<Url, ApiError> {
    let parsed = Url::parse(url).map_err(|_| {
        ApiError::InvalidInput("Invalid URL: expected an http(s) URL with a host.".into())
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::InvalidInput(
            "Only http and https URLs are allowed.".into(),
        ));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ApiError::InvalidInput("URL must include a host.".into()));
    }
    Ok(parsed)
}

// ── HTTP fetch ───────────────────────────────────────────────────────────────

async fn fetch_html(policy: &FetchPolicy, url: &str) -> Result<String, ApiError> {
    tracing::info!("Fetching article page: {}", url);
    let response = policy.get(url).await.map_err(|e| transport_error(url, e))?;

    match response.status() {
        StatusCode::OK => response
            .text()
            .await
            .map_err(|e| transport_error(url, e.into())),
        StatusCode::NOT_FOUND => {
            tracing::info!("Target page not found (404): {}", url);
            Err(ApiError::NotFound("Target URL returned 404 Not Found.".into()))
        }
        status => {
            tracing::warn!("Failed to fetch {}. Status code: {}", url, status.as_u16());
            Err(ApiError::UpstreamStatus(format!(
                "Failed to fetch URL. Status code: {}",
                status.as_u16()
            )))
        }
    }
}

fn transport_error(url: &str, failure: TransportFailure) -> ApiError {
    match failure {
        TransportFailure::Timeout(_) => {
            tracing::error!("Timeout occurred while fetching {}", url);
            ApiError::Timeout("Gateway Timeout while fetching the target URL.".into())
        }
        TransportFailure::Connect(msg) => {
            tracing::error!("Connection error while fetching {}: {}", url, msg);
            ApiError::Unreachable(
                "Service Unavailable. Could not connect to the target server.".into(),
            )
        }
        TransportFailure::Other(msg) => {
            tracing::error!("An unexpected error occurred fetching {}: {}", url, msg);
            ApiError::Internal(format!("An internal error occurred: {}", msg))
        }
    }
}

// ── Container selection ──────────────────────────────────────────────────────

fn find_container(document: &Html) -> Option<ElementRef<'_>> {
    // 1. The <article>/<main> with the most text, if it holds enough.
    if let Some(el) = richest(document.select(&SEMANTIC_SEL)) {
        return Some(el);
    }

    // 2. Best <div> with a content-like class/id and sufficient text.
    let divs = document
        .select(&DIV_SEL)
        .filter(|div| KEYWORD_RE.is_match(&class_id(*div)));
    if let Some(el) = richest(divs) {
        return Some(el);
    }

    document.select(&BODY_SEL).next()
}

fn richest<'a>(candidates: impl Iterator<Item = ElementRef<'a>>) -> Option<ElementRef<'a>> {
    candidates
        .map(|el| (normalize_text(el.text().collect()).len(), el))
        .max_by_key(|(len, _)| *len)
        .filter(|(len, _)| *len >= MIN_CONTAINER_TEXT_LEN)
        .map(|(_, el)| el)
}

// ── DOM utility helpers ──────────────────────────────────────────────────────

fn class_id(el: ElementRef<'_>) -> String {
    let id = el.value().id().unwrap_or("");
    let classes = el.value().classes().collect::<Vec<_>>().join(" ");
    format!("{} {}", id, classes)
}

fn has_structural_descendant(el: ElementRef<'_>) -> bool {
    el.descendants().skip(1).any(|node| match node.value() {
        Node::Element(e) => BLOCK_TAGS.contains(&e.name()) || CONTAINER_TAGS.contains(&e.name()),
        _ => false,
    })
}

/// Share of `text` that sits inside links.
fn link_density(el: ElementRef<'_>, text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let linked: usize = el
        .select(&LINK_SEL)
        .map(|a| normalize_text(a.text().collect()).chars().count())
        .sum();
    linked as f64 / total as f64
}

/// Collapse whitespace and trim.
fn normalize_text(text: String) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
