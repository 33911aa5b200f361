use crate::error::ExtractionError;
use rand::seq::SliceRandom;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Upper bound on text handed to the summarizer, in characters.
pub const MAX_EXTRACTED_CHARS: usize = 4000;
pub const PAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// User agents for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// Readable page text, at most [`MAX_EXTRACTED_CHARS`] characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText(String);

impl ExtractedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }
}

/// Fetches pages for summarization.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    pub fn new() -> Result<Self, ExtractionError> {
        Self::with_timeout(PAGE_FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ExtractionError::Other(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn random_user_agent(&self) -> &'static str {
        USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0])
    }

    /// Fetch `url` and pull readable text out of it.
    pub async fn extract_text(&self, url: &str) -> Result<ExtractedText, ExtractionError> {
        info!("Extracting text from: {}", url);

        let parsed = Url::parse(url).map_err(|e| ExtractionError::Other(format!("invalid URL '{}': {}", url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ExtractionError::Other("URL must use HTTP or HTTPS protocol".into()));
        }

        let response = self
            .client
            .get(parsed)
            .header("User-Agent", self.random_user_agent())
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await
            .map_err(|e| ExtractionError::Other(format!("failed to fetch URL: {}", e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            warn!("Fetching {} returned {}", url, status);
            return Err(ExtractionError::FetchFailed { status: status.as_u16() });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.contains("text/html") {
            debug!("Skipping {} with content type '{}'", url, content_type);
            return Err(ExtractionError::NotHtml { content_type });
        }

        let html = response
            .text()
            .await
            .map_err(|e| ExtractionError::Other(format!("failed to read response body: {}", e)))?;

        let text = extract_from_html(&html)?;
        info!("Extracted {} characters from {}", text.char_count(), url);
        Ok(text)
    }
}

/// Paragraph text first, then every `<div>` if the paragraphs are blank.
pub fn extract_from_html(html: &str) -> Result<ExtractedText, ExtractionError> {
    let document = Html::parse_document(html);

    for tag in ["p", "div"] {
        let text = joined_text(&document, tag);
        if !text.trim().is_empty() {
            return Ok(ExtractedText(text));
        }
        debug!("No text in <{}> elements", tag);
    }
    Err(ExtractionError::NoContent)
}

/// Full text of every `tag` element, space-joined and truncated.
fn joined_text(document: &Html, tag: &str) -> String {
    let Ok(selector) = Selector::parse(tag) else {
        return String::new();
    };
    let joined = document
        .select(&selector)
        .map(|el| el.text().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ");
    truncate_chars(joined, MAX_EXTRACTED_CHARS)
}

fn truncate_chars(mut text: String, max: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(max) {
        text.truncate(idx);
    }
    text
}
