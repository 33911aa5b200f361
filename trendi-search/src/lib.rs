pub mod actions;
pub mod config;
pub mod error;
pub mod proxy;
pub mod retry;
pub mod scrape;
pub mod search;
pub mod session;
pub mod stdio_service;
pub mod summarize;
pub mod trends;
pub mod types;

use config::AppConfig;
use proxy::PublicProxyPool;
use scrape::PageFetcher;
use session::SessionStore;
use summarize::{HostedSummarizer, SummarizerConfig};
use trends::GoogleTrends;

pub use types::*;

/// Everything a request needs. The type parameters exist so the provider,
/// proxy source and model can be swapped in tests.
pub struct AppState<B = GoogleTrends, P = PublicProxyPool, M: 'static = HostedSummarizer> {
    pub config: AppConfig,
    pub trends: B,
    pub proxies: P,
    pub summarizer: Option<&'static M>,
    pub fetcher: PageFetcher,
    pub http_client: reqwest::Client,
    pub sessions: SessionStore,
    // Concurrency control for page fetches
    pub outbound_limit: std::sync::Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let trends = GoogleTrends::new(config.trends_url.clone(), config.trends_timeout);
        let proxies = PublicProxyPool::default().with_speed_threshold(config.proxy_speed_threshold);
        let summarizer = summarize::load_model(&SummarizerConfig::from(&config));
        Self::with_parts(config, trends, proxies, summarizer)
    }
}

impl<B, P, M: 'static> AppState<B, P, M> {
    pub fn with_parts(
        config: AppConfig,
        trends: B,
        proxies: P,
        summarizer: Option<&'static M>,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.search_timeout)
            .build()?;
        Ok(Self {
            fetcher: PageFetcher::new()?,
            http_client,
            sessions: SessionStore::new(config.session_ttl),
            outbound_limit: std::sync::Arc::new(tokio::sync::Semaphore::new(32)),
            config,
            trends,
            proxies,
            summarizer,
        })
    }
}
