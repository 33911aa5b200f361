use chrono::NaiveDate;
use serde_json::json;
use trendi_search::config::AppConfig;
use trendi_search::error::SummarizerError;
use trendi_search::proxy::{ProxyEndpoint, ProxyPool};
use trendi_search::search::{DateRestrict, SearchType};
use trendi_search::session::Session;
use trendi_search::summarize::{SummaryModel, SummaryParams};
use trendi_search::trends::GoogleTrends;
use trendi_search::{AppState, NoticeLevel, SearchRequest};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Echoes the first sentence back.
struct FirstSentence;

impl SummaryModel for FirstSentence {
    async fn summarize(&self, text: &str, _params: &SummaryParams) -> Result<Vec<String>, SummarizerError> {
        Ok(vec![text.split('.').next().unwrap_or_default().to_string()])
    }
}

struct NoProxies;

impl ProxyPool for NoProxies {
    async fn candidates(&self) -> Vec<ProxyEndpoint> {
        Vec::new()
    }

    async fn probe(&self, _endpoint: &ProxyEndpoint) -> bool {
        false
    }
}

fn app(server: &MockServer) -> AppState<GoogleTrends, NoProxies, FirstSentence> {
    let mut config = AppConfig::with_credentials("test-key", "test-cx");
    config.search_endpoint = format!("{}/customsearch/v1", server.uri());
    config.trends_url = server.uri();
    let trends = GoogleTrends::new(server.uri(), config.trends_timeout);
    let model: &'static FirstSentence = Box::leak(Box::new(FirstSentence));
    AppState::with_parts(config, trends, NoProxies, Some(model)).unwrap()
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn search_then_summarize() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/customsearch/v1"))
        .and(query_param("q", "persian gulf site:wikipedia.org"))
        .and(query_param("dateRestrict", "y1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "title": "Gulf", "link": format!("{}/article", server.uri()), "snippet": "A sea" },
                { "title": "Report", "link": format!("{}/report.pdf", server.uri()), "snippet": "PDF" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><body><p>The gulf is a sea. It is shallow.</p></body></html>",
            "text/html; charset=utf-8",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x25, 0x50, 0x44, 0x46], "application/pdf"))
        .mount(&server)
        .await;

    let app = app(&server);
    let mut session = Session::new();
    let view = app
        .search(
            &mut session,
            SearchRequest {
                query: "persian gulf".into(),
                date_range: DateRestrict::LastYear,
                content_type: SearchType::Web,
                domain_filter: Some("site:wikipedia.org".into()),
            },
        )
        .await;
    assert_eq!(view.notices[0].level, NoticeLevel::Success);
    assert_eq!(view.results.len(), 2);
    assert!(view.results.iter().all(|c| c.summarizable));

    let summary = app.summarize_item(&mut session, view.search_id, 0).await;
    assert_eq!(summary.summary.as_deref(), Some("The gulf is a sea"));

    let summary = app.summarize_item(&mut session, view.search_id, 1).await;
    assert_eq!(
        summary.summary.as_deref(),
        Some("The linked content is not HTML and cannot be summarized.")
    );

    let cards = trendi_search::actions::result_cards(&session);
    assert_eq!(cards[0].summary.as_deref(), Some("The gulf is a sea"));
}

#[tokio::test]
async fn new_search_hides_old_summaries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/customsearch/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "title": "A", "link": format!("{}/a", server.uri()), "snippet": "a" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<p>Alpha text. More.</p>", "text/html"))
        .mount(&server)
        .await;

    let app = app(&server);
    let mut session = Session::new();
    let first = app.search(&mut session, serde_json::from_value(json!({ "query": "a" })).unwrap()).await;
    app.summarize_item(&mut session, first.search_id, 0).await;

    let second = app.search(&mut session, serde_json::from_value(json!({ "query": "a" })).unwrap()).await;
    assert!(second.search_id > first.search_id);
    assert_eq!(second.results[0].summary, None);

    let stale = app.summarize_item(&mut session, first.search_id, 0).await;
    assert!(stale.summary.is_none());
    assert_eq!(stale.notices[0].level, NoticeLevel::Warning);
}

#[tokio::test]
async fn future_end_date_never_reaches_the_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = app(&server);
    let view = app
        .show_trends(&["rust"], day(2024, 1, 1), day(2024, 6, 2), day(2024, 6, 1))
        .await;
    assert!(view.series.is_empty());
    assert_eq!(view.notices.len(), 1);
    assert_eq!(view.notices[0].message, "End Date cannot be in the future.");
}

#[tokio::test]
async fn rate_limit_without_proxies_halts_with_one_notice() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let app = app(&server);
    let view = app
        .show_trends(&["rust", "go"], day(2024, 1, 1), day(2024, 2, 1), day(2024, 6, 1))
        .await;
    assert!(view.halted);
    assert!(view.series.is_empty());
    assert_eq!(view.notices.len(), 1);
    assert_eq!(view.notices[0].level, NoticeLevel::Error);

    let regions = app
        .show_trending_regions("rust", day(2024, 1, 1), day(2024, 2, 1), day(2024, 6, 1))
        .await;
    assert!(regions.halted);
    assert_eq!(regions.notices.len(), 1);
}
