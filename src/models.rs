use serde::{Deserialize, Serialize};

/// Raw query for `/get_single_arxiv_image`. Fields stay as strings so that
/// missing or non-integer values can be reported with a JSON detail.
#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub url: Option<String>,
    pub index: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractQuery {
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub url: String,
    pub content: String,
}
