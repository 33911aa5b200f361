use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Public lists, in priority order.
pub const PROXY_SOURCES: &[&str] = &[
    "https://www.proxyscan.io/api/proxy?type=https",
    "https://www.proxy-list.download/api/v1/get?type=https",
    "https://raw.githubusercontent.com/proxifly/free-proxy-list/main/proxies/all/data.txt",
    "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/http.txt",
];

/// Probed through each candidate; must be reachable from anywhere.
pub const REFERENCE_URL: &str = "https://www.google.com";

pub const LIST_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SPEED_THRESHOLD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    Http,
    Https,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    /// `host:port`
    pub address: String,
    pub scheme: ProxyScheme,
}

impl ProxyEndpoint {
    /// Parse one line of a proxy list. Returns `None` for blank, malformed or
    /// non-HTTP (socks) entries.
    pub fn parse_line(line: &str) -> Option<Self> {
        static LINE: OnceLock<Option<Regex>> = OnceLock::new();
        let re = LINE
            .get_or_init(|| {
                Regex::new(r"^(?:(?P<scheme>[A-Za-z0-9]+)://)?(?P<host>[A-Za-z0-9.\-]+):(?P<port>\d{1,5})/?$").ok()
            })
            .as_ref()?;

        let caps = re.captures(line.trim())?;
        let scheme = match caps.name("scheme").map(|m| m.as_str().to_ascii_lowercase()) {
            None => ProxyScheme::Http,
            Some(s) if s == "http" => ProxyScheme::Http,
            Some(s) if s == "https" => ProxyScheme::Https,
            Some(_) => return None,
        };
        let port: u16 = caps["port"].parse().ok()?;
        if port == 0 {
            return None;
        }
        Some(Self {
            address: format!("{}:{}", &caps["host"], port),
            scheme,
        })
    }

    /// URL handed to the HTTP client. Public "https" proxies accept plain
    /// HTTP CONNECT, so the proxy itself is always addressed over http.
    pub fn proxy_url(&self) -> String {
        format!("http://{}", self.address)
    }

    /// One entry of a JSON list, e.g. `{"Ip": "1.2.3.4", "Port": 8080}`.
    /// Field names are matched case-insensitively; the port may be a string.
    pub fn from_json(entry: &serde_json::Value) -> Option<Self> {
        let obj = entry.as_object()?;
        let field = |name: &str| obj.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v);
        let ip = field("ip")?.as_str()?;
        let port = match field("port")? {
            serde_json::Value::Number(n) => n.as_u64()?.to_string(),
            serde_json::Value::String(s) => s.trim().to_string(),
            _ => return None,
        };
        Self::parse_line(&format!("{}:{}", ip.trim(), port))
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
        };
        write!(f, "{}://{}", scheme, self.address)
    }
}

/// Parse a whole list body, keeping source order. JSON arrays of
/// `{ip, port}` objects and newline-delimited `host:port` are both accepted.
pub fn parse_proxy_list(body: &str) -> Vec<ProxyEndpoint> {
    if let Ok(serde_json::Value::Array(entries)) = serde_json::from_str::<serde_json::Value>(body.trim()) {
        return entries.iter().filter_map(ProxyEndpoint::from_json).collect();
    }
    body.lines().filter_map(ProxyEndpoint::parse_line).collect()
}

/// Where relay candidates come from and how they are validated.
pub trait ProxyPool: Send + Sync {
    /// All candidates, in priority order.
    fn candidates(&self) -> impl Future<Output = Vec<ProxyEndpoint>> + Send;

    /// Whether the candidate is alive and fast enough to use.
    fn probe(&self, endpoint: &ProxyEndpoint) -> impl Future<Output = bool> + Send;
}

/// Proxies scraped from the public lists.
#[derive(Debug, Clone)]
pub struct PublicProxyPool {
    pub sources: Vec<String>,
    pub list_timeout: Duration,
    pub speed_threshold: Duration,
    pub reference_url: String,
}

impl Default for PublicProxyPool {
    fn default() -> Self {
        Self {
            sources: PROXY_SOURCES.iter().map(|s| s.to_string()).collect(),
            list_timeout: LIST_FETCH_TIMEOUT,
            speed_threshold: DEFAULT_SPEED_THRESHOLD,
            reference_url: REFERENCE_URL.to_string(),
        }
    }
}

impl PublicProxyPool {
    pub fn with_speed_threshold(mut self, threshold: Duration) -> Self {
        self.speed_threshold = threshold;
        self
    }
}

impl ProxyPool for PublicProxyPool {
    async fn candidates(&self) -> Vec<ProxyEndpoint> {
        fetch_candidate_proxies(&self.sources, self.list_timeout).await
    }

    async fn probe(&self, endpoint: &ProxyEndpoint) -> bool {
        probe_proxy(endpoint, &self.reference_url, self.speed_threshold).await
    }
}

/// Fetch every source and concatenate what parses. A source that cannot be
/// reached is logged and skipped.
pub async fn fetch_candidate_proxies(sources: &[String], timeout: Duration) -> Vec<ProxyEndpoint> {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(c) => c,
        Err(e) => {
            warn!("Could not build proxy list client: {}", e);
            return Vec::new();
        }
    };

    let mut proxies = Vec::new();
    for source in sources {
        match fetch_source(&client, source).await {
            Ok(found) => {
                debug!("{} proxies from {}", found.len(), source);
                proxies.extend(found);
            }
            Err(e) => warn!("Error fetching free proxies from {}: {}", source, e),
        }
    }
    info!("Collected {} candidate proxies", proxies.len());
    proxies
}

async fn fetch_source(client: &reqwest::Client, source: &str) -> anyhow::Result<Vec<ProxyEndpoint>> {
    let resp = client.get(source).send().await?;
    if resp.status() != reqwest::StatusCode::OK {
        anyhow::bail!("status {}", resp.status());
    }
    let body = resp.text().await?;
    Ok(parse_proxy_list(&body))
}

/// One GET through `endpoint`; true iff it succeeds within `threshold`.
pub async fn probe_proxy(endpoint: &ProxyEndpoint, reference_url: &str, threshold: Duration) -> bool {
    let proxy = match reqwest::Proxy::all(endpoint.proxy_url()) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let client = match reqwest::Client::builder().proxy(proxy).timeout(threshold).build() {
        Ok(c) => c,
        Err(_) => return false,
    };

    let started = Instant::now();
    match client.get(reference_url).send().await {
        Ok(resp) => {
            let elapsed = started.elapsed();
            let ok = resp.status().is_success() && elapsed <= threshold;
            debug!("Probe {} -> {} in {:?}", endpoint, resp.status(), elapsed);
            ok
        }
        Err(e) => {
            debug!("Probe {} failed: {}", endpoint, e);
            false
        }
    }
}
