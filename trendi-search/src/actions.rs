use crate::error::{QueryError, TrendsError};
use crate::proxy::ProxyPool;
use crate::retry::query_trends;
use crate::search::{build_search_request, google_search, SearchOutcome, SearchQuery, SearchType};
use crate::session::{SearchExecution, Session, SummaryKey};
use crate::summarize::{summarize_link, SummaryModel};
use crate::trends::{TrendsBackend, TrendsMode, TrendsQuery};
use crate::types::*;
use crate::AppState;
use chrono::{Duration, NaiveDate};
use tracing::{error, info, warn};

pub const RATE_LIMITED_MESSAGE: &str = "⚠️ Too many requests have been made by this server to Google 'free API' today. \
Free proxies were also tried to get around the limit, but none of them worked. Please try again later.";

/// Four years back, as the date pickers default to.
pub fn default_timeframe(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (today - Duration::days(4 * 365), today)
}

fn query_notice(err: &QueryError) -> Notice {
    match err {
        QueryError::NoKeywords => Notice::warning(err.to_string()),
        _ => Notice::error(err.to_string()),
    }
}

impl<B, P, M> AppState<B, P, M>
where
    B: TrendsBackend + Clone,
    P: ProxyPool,
    M: SummaryModel + 'static,
{
    /// Interest over time for every keyword.
    pub async fn show_trends<S: AsRef<str>>(
        &self,
        keywords: &[S],
        start: NaiveDate,
        end: NaiveDate,
        today: NaiveDate,
    ) -> TrendsView {
        let mut view = TrendsView::default();
        let query = match TrendsQuery::new(keywords, start, end, today) {
            Ok(q) => q,
            Err(e) => {
                view.notices.push(query_notice(&e));
                return view;
            }
        };
        view.title = format!("Google Trends for: {}", query.keywords().join(", "));
        info!("Showing trends for {:?} over {}", query.keywords(), query.timeframe());

        let keywords = query.keywords().to_vec();
        let data = match query_trends(self.trends.clone(), &self.proxies, query, TrendsMode::OverTime).await {
            Ok(mut session) => session.interest_over_time().await,
            Err(e) => Err(e),
        };
        let data = match data {
            Ok(d) => d,
            Err(e) => {
                (view.notices, view.halted) = failure_notices(std::mem::take(&mut view.notices), e, "trends");
                return view;
            }
        };

        if data.is_empty() {
            view.notices.push(Notice::warning(
                "No trends data available for the given keywords and timeframe.",
            ));
            return view;
        }

        for keyword in keywords {
            match data.series(&keyword) {
                Some(series) => view.series.push(KeywordSeries {
                    points: series.into_iter().map(|(date, value)| SeriesPoint { date, value }).collect(),
                    keyword,
                }),
                None => view.notices.push(Notice::warning(format!("No data found for keyword: {}", keyword))),
            }
        }
        view
    }

    /// Interest by country for one keyword.
    pub async fn show_trending_regions(
        &self,
        keyword: &str,
        start: NaiveDate,
        end: NaiveDate,
        today: NaiveDate,
    ) -> RegionView {
        let mut view = RegionView { keyword: keyword.trim().to_string(), ..Default::default() };
        let query = match TrendsQuery::new(&[keyword], start, end, today) {
            Ok(q) => q,
            Err(e) => {
                view.notices.push(query_notice(&e));
                return view;
            }
        };
        view.title = format!("Regional Interest for \"{}\"", view.keyword);

        let data = match query_trends(self.trends.clone(), &self.proxies, query, TrendsMode::ByRegion).await {
            Ok(mut session) => session.interest_by_region().await,
            Err(e) => Err(e),
        };
        let data = match data {
            Ok(d) => d,
            Err(e) => {
                (view.notices, view.halted) = failure_notices(std::mem::take(&mut view.notices), e, "regional trends");
                return view;
            }
        };

        match data.by_region(&view.keyword) {
            Some(regions) if !regions.is_empty() => {
                view.regions = regions
                    .into_iter()
                    .map(|(region, interest)| RegionInterest { region, interest })
                    .collect();
            }
            _ => view.notices.push(Notice::warning(
                "No regional data available for the given keyword and timeframe.",
            )),
        }
        view
    }

    /// Run a search and make it the session's current one.
    pub async fn search(&self, session: &mut Session, request: SearchRequest) -> SearchView {
        let search_id = session.begin_search();
        let query = SearchQuery {
            text: request.query,
            num_results: crate::search::MAX_RESULTS,
            date_restrict: request.date_range,
            search_type: request.content_type,
            domain_filter: request.domain_filter,
        };
        let spec = build_search_request(&self.config.search_endpoint, &query, &self.config.api_key, &self.config.cse_id);

        let mut notices = Vec::new();
        let items = match google_search(&self.http_client, &spec).await {
            SearchOutcome::Results(items) => {
                notices.push(Notice::success("Found the results."));
                items
            }
            SearchOutcome::NoResults => {
                notices.push(Notice::warning("No results found for the given search query."));
                Vec::new()
            }
            SearchOutcome::Failed(message) => {
                notices.push(Notice::error(message));
                Vec::new()
            }
        };

        session.record_search(SearchExecution { id: search_id, search_type: query.search_type, items });
        SearchView {
            search_id,
            search_type: query.search_type,
            results: result_cards(session),
            notices,
        }
    }

    /// Summarize one result of the current search and remember the summary.
    pub async fn summarize_item(&self, session: &mut Session, search_id: u64, index: usize) -> SummaryView {
        let mut view = SummaryView { search_id, index, summary: None, notices: Vec::new() };

        let Some(search) = session.current_search() else {
            view.notices.push(Notice::warning("Run a search first."));
            return view;
        };
        if search.id != search_id {
            view.notices.push(Notice::warning("These results are from an earlier search; search again."));
            return view;
        }
        if search.search_type == SearchType::Image {
            view.notices.push(Notice::warning("Summaries are not available for images."));
            return view;
        }
        let Some(item) = session.item(search_id, index) else {
            view.notices.push(Notice::warning(format!("No result at position {}.", index)));
            return view;
        };
        let link = item.link.clone();

        let _permit = self.outbound_limit.acquire().await.ok();
        let summary = summarize_link(self.summarizer, &self.fetcher, &link).await;
        session.store_summary(SummaryKey::new(search_id, index), summary.clone());
        view.summary = Some(summary);
        view
    }
}

/// What the search view shows for the session's current search.
pub fn result_cards(session: &Session) -> Vec<ResultCard> {
    let Some(search) = session.current_search() else {
        return Vec::new();
    };
    let images = search.search_type == SearchType::Image;
    search
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| ResultCard {
            index,
            title: item.title.clone(),
            link: item.link.clone(),
            snippet: if images { None } else { item.snippet.clone() },
            summarizable: !images,
            summary: session.summary(SummaryKey::new(search.id, index)).map(str::to_string),
        })
        .collect()
}

pub fn stored_summary(session: &Session, search_id: u64, index: usize) -> StoredSummaryView {
    StoredSummaryView {
        search_id,
        index,
        summary: session.summary(SummaryKey::new(search_id, index)).map(str::to_string),
        results: result_cards(session),
    }
}

/// A terminal failure replaces every notice with the single rate-limit one
/// and halts the request.
fn failure_notices(mut notices: Vec<Notice>, err: TrendsError, what: &str) -> (Vec<Notice>, bool) {
    if err.is_terminal() {
        error!("Halting trends request: {}", err);
        return (vec![Notice::error(RATE_LIMITED_MESSAGE)], true);
    }
    warn!("Trends request failed: {}", err);
    notices.push(Notice::error(format!("An error occurred while fetching {} data: {}", what, err)));
    (notices, false)
}
