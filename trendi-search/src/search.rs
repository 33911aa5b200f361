use crate::types::*;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

pub const MAX_RESULTS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRestrict {
    AllTime,
    LastDay,
    LastWeek,
    LastMonth,
    LastThreeMonths,
    LastYear,
    #[default]
    LastFiveYears,
}

impl DateRestrict {
    /// `dateRestrict` value, `None` for no restriction.
    pub fn code(self) -> Option<&'static str> {
        match self {
            Self::AllTime => None,
            Self::LastDay => Some("d1"),
            Self::LastWeek => Some("w1"),
            Self::LastMonth => Some("m1"),
            Self::LastThreeMonths => Some("m3"),
            Self::LastYear => Some("y1"),
            Self::LastFiveYears => Some("y5"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    #[default]
    Web,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    #[serde(default = "default_num_results")]
    pub num_results: u32,
    #[serde(default)]
    pub date_restrict: DateRestrict,
    #[serde(default)]
    pub search_type: SearchType,
    #[serde(default)]
    pub domain_filter: Option<String>,
}

fn default_num_results() -> u32 {
    MAX_RESULTS
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            num_results: MAX_RESULTS,
            date_restrict: DateRestrict::default(),
            search_type: SearchType::Web,
            domain_filter: None,
        }
    }
}

/// A fully resolved request against the search endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequestSpec {
    pub endpoint: String,
    pub params: Vec<(String, String)>,
}

impl SearchRequestSpec {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

/// Build the Custom Search request. The domain filter is appended to the
/// query text verbatim so operators like `site:` and `-site:` pass through.
pub fn build_search_request(
    endpoint: &str,
    query: &SearchQuery,
    api_key: &str,
    cse_id: &str,
) -> SearchRequestSpec {
    let mut q = query.text.clone();
    if let Some(filter) = query.domain_filter.as_deref().filter(|f| !f.trim().is_empty()) {
        q.push(' ');
        q.push_str(filter);
    }

    let mut params = vec![
        ("key".to_string(), api_key.to_string()),
        ("cx".to_string(), cse_id.to_string()),
        ("q".to_string(), q),
        ("num".to_string(), query.num_results.clamp(1, MAX_RESULTS).to_string()),
    ];
    if let Some(code) = query.date_restrict.code() {
        params.push(("dateRestrict".into(), code.into()));
    }
    if query.search_type == SearchType::Image {
        params.push(("searchType".into(), "image".into()));
    }

    SearchRequestSpec { endpoint: endpoint.to_string(), params }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Results(Vec<SearchResultItem>),
    NoResults,
    /// Already phrased for display.
    Failed(String),
}

/// Run a search. Server errors are retried briefly; every other failure is
/// reported as [`SearchOutcome::Failed`].
pub async fn google_search(
    client: &reqwest::Client,
    spec: &SearchRequestSpec,
) -> SearchOutcome {
    info!("Searching for: {}", spec.param("q").unwrap_or_default());
    debug!("Search URL: {}", spec.endpoint);

    let result: Result<CseResponse, String> = retry(
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_max_interval(Duration::from_secs(2))
            .with_max_elapsed_time(Some(Duration::from_secs(4)))
            .build(),
        || async {
            let resp = client
                .get(&spec.endpoint)
                .query(&spec.params)
                .header("Accept", "application/json")
                .send()
                .await
                .map_err(|e| backoff::Error::permanent(format!("An error occurred: {}", e)))?;
            let status = resp.status();
            if !status.is_success() {
                let err = format!("HTTP error occurred: {}", status);
                // 5xx transient, others permanent
                return if status.is_server_error() {
                    Err(backoff::Error::transient(err))
                } else {
                    Err(backoff::Error::permanent(err))
                };
            }
            resp.json::<CseResponse>()
                .await
                .map_err(|e| backoff::Error::permanent(format!("An error occurred: {}", e)))
        },
    )
    .await;

    match result {
        Ok(CseResponse { items: Some(items) }) if !items.is_empty() => {
            info!("Search returned {} results", items.len());
            SearchOutcome::Results(items)
        }
        Ok(_) => SearchOutcome::NoResults,
        Err(message) => {
            error!("Search error: {}", message);
            SearchOutcome::Failed(message)
        }
    }
}
