use crate::search::{DateRestrict, SearchType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// A message the dashboard shows next to (or instead of) the data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrendsRequest {
    pub keywords: Vec<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegionsRequest {
    pub keyword: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSeries {
    pub keyword: String,
    pub points: Vec<SeriesPoint>,
}

/// Line chart data for the trends explorer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrendsView {
    pub title: String,
    pub series: Vec<KeywordSeries>,
    pub notices: Vec<Notice>,
    /// Set when the request was stopped outright; nothing else follows.
    pub halted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionInterest {
    pub region: String,
    pub interest: u8,
}

/// Choropleth data for the trending-regions view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionView {
    pub title: String,
    pub keyword: String,
    pub regions: Vec<RegionInterest>,
    pub notices: Vec<Notice>,
    pub halted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultItem {
    #[serde(default)]
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: Option<String>,
}

/// Custom Search JSON API response. Only `items` matters.
#[derive(Debug, Deserialize)]
pub struct CseResponse {
    #[serde(default)]
    pub items: Option<Vec<SearchResultItem>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub date_range: DateRestrict,
    #[serde(default)]
    pub content_type: SearchType,
    #[serde(default)]
    pub domain_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultCard {
    pub index: usize,
    pub title: String,
    pub link: String,
    /// Omitted for image results.
    pub snippet: Option<String>,
    pub summarizable: bool,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchView {
    pub search_id: u64,
    pub search_type: SearchType,
    pub results: Vec<ResultCard>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummarizeRequest {
    pub search_id: u64,
    pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryView {
    pub search_id: u64,
    pub index: usize,
    pub summary: Option<String>,
    pub notices: Vec<Notice>,
}

/// A summary produced earlier, with the current cards for re-rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSummaryView {
    pub search_id: u64,
    pub index: usize,
    pub summary: Option<String>,
    pub results: Vec<ResultCard>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_request_defaults() {
        let req: SearchRequest = serde_json::from_value(json!({ "query": "cats" })).unwrap();
        assert_eq!(req.date_range, DateRestrict::LastFiveYears);
        assert_eq!(req.content_type, SearchType::Web);
        assert!(req.domain_filter.is_none());
    }

    #[test]
    fn notice_level_is_lowercase() {
        let v = serde_json::to_value(Notice::warning("careful")).unwrap();
        assert_eq!(v, json!({ "level": "warning", "message": "careful" }));
    }

    #[test]
    fn cse_item_without_snippet() {
        let resp: CseResponse = serde_json::from_value(json!({
            "items": [{ "title": "t", "link": "https://x.test" }]
        }))
        .unwrap();
        let items = resp.items.unwrap();
        assert_eq!(items[0].snippet, None);
    }
}
