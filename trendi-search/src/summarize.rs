use crate::config::AppConfig;
use crate::error::{ExtractionError, SummarizerError};
use crate::scrape::PageFetcher;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, info, warn};

pub const MODEL_NOT_LOADED: &str = "Summarizer model is not loaded.";
pub const NO_SUMMARY: &str = "No summary available";

/// Decoding settings. Greedy decoding keeps output reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SummaryParams {
    pub min_length: u32,
    pub max_length: u32,
    pub do_sample: bool,
}

impl Default for SummaryParams {
    fn default() -> Self {
        Self { min_length: 30, max_length: 130, do_sample: false }
    }
}

pub trait SummaryModel: Send + Sync {
    /// Candidate summaries, best first. May be empty.
    fn summarize(
        &self,
        text: &str,
        params: &SummaryParams,
    ) -> impl Future<Output = Result<Vec<String>, SummarizerError>> + Send;
}

#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub endpoint: String,
    pub model_id: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl From<&AppConfig> for SummarizerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            endpoint: config.summarizer_endpoint.clone(),
            model_id: config.summarizer_model.clone(),
            token: config.summarizer_token.clone(),
            timeout: config.summarizer_timeout,
        }
    }
}

/// `facebook/bart-base` (by default) behind an inference API.
#[derive(Debug, Clone)]
pub struct HostedSummarizer {
    client: reqwest::Client,
    model_url: url::Url,
    token: Option<String>,
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: &'a SummaryParams,
    options: InferenceOptions,
}

#[derive(Serialize)]
struct InferenceOptions {
    wait_for_model: bool,
}

#[derive(Deserialize)]
struct InferenceOutput {
    #[serde(default)]
    summary_text: Option<String>,
}

impl HostedSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self, SummarizerError> {
        if config.model_id.trim().is_empty() {
            return Err(SummarizerError::Endpoint("model id is empty".into()));
        }
        let base = url::Url::parse(&format!("{}/", config.endpoint.trim_end_matches('/')))
            .map_err(|e| SummarizerError::Endpoint(format!("{}: {}", config.endpoint, e)))?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(SummarizerError::Endpoint(format!("{}: not an http(s) URL", config.endpoint)));
        }
        let model_url = base
            .join(&format!("models/{}", config.model_id.trim()))
            .map_err(|e| SummarizerError::Endpoint(e.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SummarizerError::Client(e.to_string()))?;

        Ok(Self { client, model_url, token: config.token.clone() })
    }

    pub fn model_url(&self) -> &str {
        self.model_url.as_str()
    }
}

impl SummaryModel for HostedSummarizer {
    async fn summarize(&self, text: &str, params: &SummaryParams) -> Result<Vec<String>, SummarizerError> {
        let body = InferenceRequest {
            inputs: text,
            parameters: params,
            options: InferenceOptions { wait_for_model: true },
        };
        let mut request = self.client.post(self.model_url.clone()).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await.map_err(|e| SummarizerError::Request(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SummarizerError::Status { status: status.as_u16(), body });
        }
        let outputs: Vec<InferenceOutput> = resp
            .json()
            .await
            .map_err(|e| SummarizerError::Request(format!("unreadable model output: {}", e)))?;
        Ok(outputs.into_iter().filter_map(|o| o.summary_text).collect())
    }
}

/// One-time model construction. A failed build is remembered as `None`.
#[derive(Debug, Default)]
pub struct ModelCell {
    cell: OnceLock<Option<HostedSummarizer>>,
}

impl ModelCell {
    pub const fn new() -> Self {
        Self { cell: OnceLock::new() }
    }

    /// `config` is only consulted by the first call.
    pub fn get_or_load(&self, config: &SummarizerConfig) -> Option<&HostedSummarizer> {
        self.cell
            .get_or_init(|| {
                info!("Loading summarization model {}", config.model_id);
                match HostedSummarizer::new(config) {
                    Ok(model) => Some(model),
                    Err(e) => {
                        error!("Error loading summarization model: {}", e);
                        None
                    }
                }
            })
            .as_ref()
    }
}

static MODEL: ModelCell = ModelCell::new();

/// The process-wide summarizer.
pub fn load_model(config: &SummarizerConfig) -> Option<&'static HostedSummarizer> {
    MODEL.get_or_load(config)
}

/// Summarize `text`, degrading to a fixed message instead of failing.
pub async fn summarize<M: SummaryModel>(model: Option<&M>, text: &str) -> String {
    let Some(model) = model else {
        return MODEL_NOT_LOADED.to_string();
    };
    match model.summarize(text, &SummaryParams::default()).await {
        Ok(summaries) => summaries
            .into_iter()
            .find(|s| !s.trim().is_empty())
            .unwrap_or_else(|| NO_SUMMARY.to_string()),
        Err(e) => {
            warn!("Summarization failed: {}", e);
            format!("Error during summarization: {}", e)
        }
    }
}

/// Fetch the page behind `link` and summarize it. Always yields a message
/// fit for display.
pub async fn summarize_link<M: SummaryModel>(model: Option<&M>, fetcher: &PageFetcher, link: &str) -> String {
    if model.is_none() {
        return MODEL_NOT_LOADED.to_string();
    }
    match fetcher.extract_text(link).await {
        Ok(text) => summarize(model, text.as_str()).await,
        Err(e @ ExtractionError::Other(_)) => {
            warn!("Extraction failed for {}: {}", link, e);
            e.to_string()
        }
        Err(e) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Leading words of the input; stands in for a greedy decoder.
    struct LeadModel;

    impl SummaryModel for LeadModel {
        async fn summarize(&self, text: &str, params: &SummaryParams) -> Result<Vec<String>, SummarizerError> {
            let words: Vec<&str> = text.split_whitespace().take(params.max_length as usize).collect();
            Ok(vec![words.join(" ")])
        }
    }

    struct SilentModel;

    impl SummaryModel for SilentModel {
        async fn summarize(&self, _text: &str, _params: &SummaryParams) -> Result<Vec<String>, SummarizerError> {
            Ok(vec![])
        }
    }

    fn config_for(endpoint: String) -> SummarizerConfig {
        SummarizerConfig {
            endpoint,
            model_id: "facebook/bart-base".into(),
            token: Some("hf_test".into()),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn missing_model_yields_placeholder() {
        let out = summarize::<HostedSummarizer>(None, "anything at all").await;
        assert_eq!(out, MODEL_NOT_LOADED);
    }

    #[tokio::test]
    async fn empty_model_output_yields_no_summary() {
        assert_eq!(summarize(Some(&SilentModel), "text").await, NO_SUMMARY);
    }

    #[tokio::test]
    async fn same_text_same_summary() {
        let text = "Rust is a systems language. It has ownership. It has no GC.";
        let a = summarize(Some(&LeadModel), text).await;
        let b = summarize(Some(&LeadModel), text).await;
        assert_eq!(a, b);
    }

    #[test]
    fn default_params_disable_sampling() {
        let p = SummaryParams::default();
        assert_eq!((p.min_length, p.max_length, p.do_sample), (30, 130, false));
    }

    #[test]
    fn failed_load_is_cached() {
        let cell = ModelCell::new();
        let bad = SummarizerConfig { endpoint: "not a url".into(), ..config_for(String::new()) };
        assert!(cell.get_or_load(&bad).is_none());

        let good = config_for("https://api-inference.huggingface.co".into());
        assert!(cell.get_or_load(&good).is_none());
    }

    #[test]
    fn model_url_includes_model_id() {
        let cell = ModelCell::new();
        let model = cell.get_or_load(&config_for("https://api-inference.huggingface.co/".into())).unwrap();
        assert_eq!(model.model_url(), "https://api-inference.huggingface.co/models/facebook/bart-base");
    }

    #[tokio::test]
    async fn hosted_model_sends_greedy_params() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/facebook/bart-base"))
            .and(header("authorization", "Bearer hf_test"))
            .and(body_partial_json(json!({
                "inputs": "long article text",
                "parameters": { "min_length": 30, "max_length": 130, "do_sample": false }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "summary_text": "short" }])))
            .expect(2)
            .mount(&server)
            .await;

        let model = HostedSummarizer::new(&config_for(server.uri())).unwrap();
        let first = summarize(Some(&model), "long article text").await;
        let second = summarize(Some(&model), "long article text").await;
        assert_eq!(first, "short");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn hosted_model_error_is_reported_softly() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("model is loading"))
            .mount(&server)
            .await;

        let model = HostedSummarizer::new(&config_for(server.uri())).unwrap();
        let out = summarize(Some(&model), "text").await;
        assert!(out.starts_with("Error during summarization:"));
        assert!(out.contains("503"));
    }

    #[tokio::test]
    async fn link_pipeline_maps_extraction_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/image.png"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 4], "image/png"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/story"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<p>alpha beta gamma</p>", "text/html"))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new().unwrap();
        let model = Some(&LeadModel);
        assert_eq!(
            summarize_link(model, &fetcher, &format!("{}/image.png", server.uri())).await,
            "The linked content is not HTML and cannot be summarized."
        );
        assert_eq!(
            summarize_link(model, &fetcher, &format!("{}/gone", server.uri())).await,
            "Failed to fetch the content."
        );
        assert_eq!(
            summarize_link(model, &fetcher, &format!("{}/story", server.uri())).await,
            "alpha beta gamma"
        );
    }

    #[tokio::test]
    async fn link_pipeline_skips_fetch_without_model() {
        let fetcher = PageFetcher::new().unwrap();
        let out = summarize_link::<HostedSummarizer>(None, &fetcher, "http://127.0.0.1:1/").await;
        assert_eq!(out, MODEL_NOT_LOADED);
    }
}
