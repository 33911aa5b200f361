use crate::error::{QueryError, TrendsError};
use crate::proxy::ProxyEndpoint;
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

pub const MAX_KEYWORDS: usize = 10;
const HOST_LANGUAGE: &str = "en-US";
const TZ_OFFSET: &str = "360";

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }
}

/// A validated trends request. Only constructible through [`TrendsQuery::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendsQuery {
    keywords: Vec<String>,
    timeframe: Timeframe,
}

impl TrendsQuery {
    /// Blank keywords are dropped before counting.
    pub fn new<S: AsRef<str>>(
        keywords: &[S],
        start: NaiveDate,
        end: NaiveDate,
        today: NaiveDate,
    ) -> Result<Self, QueryError> {
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| k.as_ref().trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();

        if keywords.is_empty() {
            return Err(QueryError::NoKeywords);
        }
        if keywords.len() > MAX_KEYWORDS {
            return Err(QueryError::TooManyKeywords { max: MAX_KEYWORDS, got: keywords.len() });
        }
        if end > today {
            return Err(QueryError::FutureEndDate { end, today });
        }
        if start > end {
            return Err(QueryError::InvertedRange { start, end });
        }

        Ok(Self { keywords, timeframe: Timeframe { start, end } })
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// The `req` payload of the explore call.
    fn explore_payload(&self) -> Value {
        let time = self.timeframe.to_string();
        let items: Vec<Value> = self
            .keywords
            .iter()
            .map(|k| json!({ "keyword": k, "time": time, "geo": "" }))
            .collect();
        json!({ "comparisonItem": items, "category": 0, "property": "" })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendsMode {
    OverTime,
    ByRegion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub date: NaiveDate,
    /// One value per keyword, in keyword order.
    pub values: Vec<u8>,
    pub is_partial: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestOverTime {
    pub keywords: Vec<String>,
    pub points: Vec<TimelinePoint>,
}

impl InterestOverTime {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// `date -> interest` for one keyword, or `None` if the provider sent no
    /// column for it.
    pub fn series(&self, keyword: &str) -> Option<BTreeMap<NaiveDate, u8>> {
        let col = self.keywords.iter().position(|k| k == keyword)?;
        let series: BTreeMap<_, _> = self
            .points
            .iter()
            .filter_map(|p| p.values.get(col).map(|v| (p.date, *v)))
            .collect();
        if series.is_empty() && !self.points.is_empty() {
            return None;
        }
        Some(series)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRow {
    pub region: String,
    pub values: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestByRegion {
    pub keywords: Vec<String>,
    pub rows: Vec<RegionRow>,
}

impl InterestByRegion {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn by_region(&self, keyword: &str) -> Option<BTreeMap<String, u8>> {
        let col = self.keywords.iter().position(|k| k == keyword)?;
        Some(
            self.rows
                .iter()
                .filter_map(|r| r.values.get(col).map(|v| (r.region.clone(), *v)))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrendsData {
    OverTime(InterestOverTime),
    ByRegion(InterestByRegion),
}

/// One attempt against the provider, direct or through a relay.
pub trait TrendsBackend: Send + Sync {
    fn fetch(
        &self,
        query: &TrendsQuery,
        mode: TrendsMode,
        proxy: Option<&ProxyEndpoint>,
    ) -> impl Future<Output = Result<TrendsData, TrendsError>> + Send;
}

#[derive(Debug, Clone)]
pub struct GoogleTrends {
    pub base_url: String,
    pub timeout: Duration,
}

impl GoogleTrends {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self { base_url: base_url.into().trim_end_matches('/').to_string(), timeout }
    }

    /// A fresh client per attempt: new cookie jar, optional relay.
    fn client(&self, proxy: Option<&ProxyEndpoint>) -> Result<reqwest::Client, TrendsError> {
        let builder = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(self.timeout)
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36");
        let builder = match proxy {
            Some(p) => builder.proxy(
                reqwest::Proxy::all(p.proxy_url()).map_err(|e| TrendsError::Transport(e.to_string()))?,
            ),
            None => builder.no_proxy(),
        };
        builder.build().map_err(|e| TrendsError::Transport(e.to_string()))
    }

    async fn get_json(
        &self,
        client: &reqwest::Client,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value, TrendsError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Trends GET {}", url);
        let resp = client.get(&url).query(params).send().await?;
        check_status(resp.status())?;
        let body = resp.text().await?;
        parse_guarded_json(&body)
    }

    async fn widgets(&self, client: &reqwest::Client, query: &TrendsQuery) -> Result<Vec<Widget>, TrendsError> {
        // Cookie bootstrap; only the status matters.
        let resp = client
            .get(format!("{}/", self.base_url))
            .query(&[("geo", "US")])
            .send()
            .await?;
        check_status(resp.status())?;

        let explore = self
            .get_json(
                client,
                "/trends/api/explore",
                &[
                    ("hl", HOST_LANGUAGE.to_string()),
                    ("tz", TZ_OFFSET.to_string()),
                    ("req", query.explore_payload().to_string()),
                ],
            )
            .await?;
        let parsed: ExploreResponse =
            serde_json::from_value(explore).map_err(|e| TrendsError::Parse(e.to_string()))?;
        Ok(parsed.widgets)
    }

    async fn interest_over_time(
        &self,
        client: &reqwest::Client,
        query: &TrendsQuery,
        widgets: &[Widget],
    ) -> Result<InterestOverTime, TrendsError> {
        let widget = widgets
            .iter()
            .find(|w| w.id == "TIMESERIES")
            .ok_or_else(|| TrendsError::Parse("no TIMESERIES widget".into()))?;
        let data = self
            .get_json(
                client,
                "/trends/api/widgetdata/multiline",
                &[
                    ("req", widget.request.to_string()),
                    ("token", widget.token.clone()),
                    ("tz", TZ_OFFSET.to_string()),
                ],
            )
            .await?;
        let parsed: MultilineResponse =
            serde_json::from_value(data).map_err(|e| TrendsError::Parse(e.to_string()))?;

        let mut points = Vec::with_capacity(parsed.default.timeline_data.len());
        for row in parsed.default.timeline_data {
            let secs: i64 = row
                .time
                .parse()
                .map_err(|_| TrendsError::Parse(format!("bad timestamp '{}'", row.time)))?;
            let date = DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| TrendsError::Parse(format!("timestamp out of range: {}", secs)))?
                .date_naive();
            points.push(TimelinePoint { date, values: row.value, is_partial: row.is_partial });
        }
        Ok(InterestOverTime { keywords: query.keywords().to_vec(), points })
    }

    async fn interest_by_region(
        &self,
        client: &reqwest::Client,
        query: &TrendsQuery,
        widgets: &[Widget],
    ) -> Result<InterestByRegion, TrendsError> {
        let widget = widgets
            .iter()
            .find(|w| w.id.starts_with("GEO_MAP"))
            .ok_or_else(|| TrendsError::Parse("no GEO_MAP widget".into()))?;

        let mut request = widget.request.clone();
        if let Value::Object(ref mut map) = request {
            map.insert("resolution".into(), json!("COUNTRY"));
            map.insert("includeLowSearchVolumeGeos".into(), json!(true));
        }

        let data = self
            .get_json(
                client,
                "/trends/api/widgetdata/comparedgeo",
                &[
                    ("req", request.to_string()),
                    ("token", widget.token.clone()),
                    ("tz", TZ_OFFSET.to_string()),
                ],
            )
            .await?;
        let parsed: ComparedGeoResponse =
            serde_json::from_value(data).map_err(|e| TrendsError::Parse(e.to_string()))?;

        let rows = parsed
            .default
            .geo_map_data
            .into_iter()
            .map(|g| RegionRow { region: g.geo_name, values: g.value })
            .collect();
        Ok(InterestByRegion { keywords: query.keywords().to_vec(), rows })
    }
}

impl TrendsBackend for GoogleTrends {
    async fn fetch(
        &self,
        query: &TrendsQuery,
        mode: TrendsMode,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<TrendsData, TrendsError> {
        info!(
            "Fetching trends {:?} for {:?} ({}){}",
            mode,
            query.keywords(),
            query.timeframe(),
            proxy.map(|p| format!(" via {}", p)).unwrap_or_default()
        );
        let client = self.client(proxy)?;
        let widgets = self.widgets(&client, query).await?;
        match mode {
            TrendsMode::OverTime => self
                .interest_over_time(&client, query, &widgets)
                .await
                .map(TrendsData::OverTime),
            TrendsMode::ByRegion => self
                .interest_by_region(&client, query, &widgets)
                .await
                .map(TrendsData::ByRegion),
        }
    }
}

fn check_status(status: reqwest::StatusCode) -> Result<(), TrendsError> {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(TrendsError::RateLimited);
    }
    if !status.is_success() {
        return Err(TrendsError::Status(status.as_u16()));
    }
    Ok(())
}

/// Trends bodies start with an anti-JSON-hijacking prefix like `)]}'`.
fn parse_guarded_json(body: &str) -> Result<Value, TrendsError> {
    let start = body
        .find(['{', '['])
        .ok_or_else(|| TrendsError::Parse("response has no JSON payload".into()))?;
    serde_json::from_str(&body[start..]).map_err(|e| TrendsError::Parse(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct ExploreResponse {
    #[serde(default)]
    widgets: Vec<Widget>,
}

#[derive(Debug, Clone, Deserialize)]
struct Widget {
    id: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    request: Value,
}

#[derive(Debug, Deserialize)]
struct MultilineResponse {
    default: MultilineData,
}

#[derive(Debug, Deserialize)]
struct MultilineData {
    #[serde(rename = "timelineData", default)]
    timeline_data: Vec<TimelineRow>,
}

#[derive(Debug, Deserialize)]
struct TimelineRow {
    time: String,
    #[serde(default)]
    value: Vec<u8>,
    #[serde(rename = "isPartial", default)]
    is_partial: bool,
}

#[derive(Debug, Deserialize)]
struct ComparedGeoResponse {
    default: ComparedGeoData,
}

#[derive(Debug, Deserialize)]
struct ComparedGeoData {
    #[serde(rename = "geoMapData", default)]
    geo_map_data: Vec<GeoRow>,
}

#[derive(Debug, Deserialize)]
struct GeoRow {
    #[serde(rename = "geoName")]
    geo_name: String,
    #[serde(default)]
    value: Vec<u8>,
}
