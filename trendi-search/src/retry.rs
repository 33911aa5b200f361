use crate::error::TrendsError;
use crate::proxy::{ProxyEndpoint, ProxyPool};
use crate::trends::{InterestByRegion, InterestOverTime, TrendsBackend, TrendsData, TrendsMode, TrendsQuery};
use std::collections::VecDeque;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
enum RetryState {
    Direct,
    Proxied { candidates: VecDeque<ProxyEndpoint>, tried: usize },
    Failed { tried: usize },
}

/// Handle on a query that the provider has answered once. Further data for
/// the same keywords and timeframe goes over the same route.
#[derive(Debug)]
pub struct TrendsSession<B> {
    backend: B,
    query: TrendsQuery,
    route: Option<ProxyEndpoint>,
    skipped: usize,
    over_time: Option<InterestOverTime>,
    by_region: Option<InterestByRegion>,
}

impl<B: TrendsBackend> TrendsSession<B> {
    fn new(backend: B, query: TrendsQuery, route: Option<ProxyEndpoint>, skipped: usize, data: TrendsData) -> Self {
        let mut session = Self { backend, query, route, skipped, over_time: None, by_region: None };
        match data {
            TrendsData::OverTime(d) => session.over_time = Some(d),
            TrendsData::ByRegion(d) => session.by_region = Some(d),
        }
        session
    }

    pub fn query(&self) -> &TrendsQuery {
        &self.query
    }

    /// The relay that got through, or `None` for a direct success.
    pub fn route(&self) -> Option<&ProxyEndpoint> {
        self.route.as_ref()
    }

    /// Candidates passed over before the working route was found.
    pub fn skipped_proxies(&self) -> usize {
        self.skipped
    }

    pub async fn interest_over_time(&mut self) -> Result<InterestOverTime, TrendsError> {
        if let Some(data) = &self.over_time {
            return Ok(data.clone());
        }
        match self.backend.fetch(&self.query, TrendsMode::OverTime, self.route.as_ref()).await? {
            TrendsData::OverTime(d) => {
                self.over_time = Some(d.clone());
                Ok(d)
            }
            TrendsData::ByRegion(_) => Err(TrendsError::Parse("backend returned region data".into())),
        }
    }

    pub async fn interest_by_region(&mut self) -> Result<InterestByRegion, TrendsError> {
        if let Some(data) = &self.by_region {
            return Ok(data.clone());
        }
        match self.backend.fetch(&self.query, TrendsMode::ByRegion, self.route.as_ref()).await? {
            TrendsData::ByRegion(d) => {
                self.by_region = Some(d.clone());
                Ok(d)
            }
            TrendsData::OverTime(_) => Err(TrendsError::Parse("backend returned time series".into())),
        }
    }
}

/// Run `query` in `mode`, falling back to public proxies on rate limiting.
///
/// Returns [`TrendsError::ProxiesExhausted`] when every candidate failed;
/// callers must treat it as terminal for the request.
pub async fn query_trends<B, P>(
    backend: B,
    pool: &P,
    query: TrendsQuery,
    mode: TrendsMode,
) -> Result<TrendsSession<B>, TrendsError>
where
    B: TrendsBackend,
    P: ProxyPool,
{
    let mut state = RetryState::Direct;
    loop {
        state = match state {
            RetryState::Direct => match backend.fetch(&query, mode, None).await {
                Ok(data) => {
                    debug!("Direct trends request succeeded");
                    return Ok(TrendsSession::new(backend, query, None, 0, data));
                }
                Err(e) if e.is_rate_limited() => {
                    warn!("Trends provider rate limited the direct request, trying proxies");
                    let candidates: VecDeque<_> = pool.candidates().await.into();
                    RetryState::Proxied { candidates, tried: 0 }
                }
                Err(e) => return Err(e),
            },
            RetryState::Proxied { mut candidates, tried } => match candidates.pop_front() {
                None => RetryState::Failed { tried },
                Some(proxy) => {
                    if !pool.probe(&proxy).await {
                        debug!("Proxy {} failed probe", proxy);
                        RetryState::Proxied { candidates, tried: tried + 1 }
                    } else {
                        match backend.fetch(&query, mode, Some(&proxy)).await {
                            Ok(data) => {
                                info!("Trends request succeeded via {} after {} skipped proxies", proxy, tried);
                                return Ok(TrendsSession::new(backend, query, Some(proxy), tried, data));
                            }
                            Err(e) if e.is_rate_limited() => {
                                debug!("Proxy {} is rate limited too", proxy);
                                RetryState::Proxied { candidates, tried: tried + 1 }
                            }
                            Err(e) => {
                                debug!("Proxy {} failed: {}", proxy, e);
                                RetryState::Proxied { candidates, tried: tried + 1 }
                            }
                        }
                    }
                }
            },
            RetryState::Failed { tried } => {
                error!("Trends request failed through all {} candidate proxies", tried);
                return Err(TrendsError::ProxiesExhausted { tried });
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyScheme;
    use crate::trends::TimelinePoint;
    use chrono::NaiveDate;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn endpoint(n: u8) -> ProxyEndpoint {
        ProxyEndpoint { address: format!("10.0.0.{}:8080", n), scheme: ProxyScheme::Http }
    }

    fn query() -> TrendsQuery {
        let d = |m| NaiveDate::from_ymd_opt(2024, m, 1).unwrap();
        TrendsQuery::new(&["rust"], d(1), d(2), d(3)).unwrap()
    }

    #[derive(Debug, Clone, Copy)]
    enum Reply {
        Ok,
        RateLimited,
        Broken,
    }

    /// Replies per route; `None` key is the direct route.
    #[derive(Debug, Clone)]
    struct ScriptedBackend {
        direct: Reply,
        proxied: Arc<Vec<(String, Reply)>>,
        calls: Arc<Mutex<Vec<Option<String>>>>,
    }

    impl ScriptedBackend {
        fn new(direct: Reply, proxied: Vec<(ProxyEndpoint, Reply)>) -> Self {
            Self {
                direct,
                proxied: Arc::new(proxied.into_iter().map(|(p, r)| (p.address, r)).collect()),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn calls(&self) -> Vec<Option<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl TrendsBackend for ScriptedBackend {
        async fn fetch(
            &self,
            query: &TrendsQuery,
            mode: TrendsMode,
            proxy: Option<&ProxyEndpoint>,
        ) -> Result<TrendsData, TrendsError> {
            self.calls.lock().unwrap().push(proxy.map(|p| p.address.clone()));
            let reply = match proxy {
                None => self.direct,
                Some(p) => self
                    .proxied
                    .iter()
                    .find(|(addr, _)| *addr == p.address)
                    .map(|(_, r)| *r)
                    .unwrap_or(Reply::Broken),
            };
            match reply {
                Reply::Ok => Ok(match mode {
                    TrendsMode::OverTime => TrendsData::OverTime(InterestOverTime {
                        keywords: query.keywords().to_vec(),
                        points: vec![TimelinePoint {
                            date: query.timeframe().start,
                            values: vec![50],
                            is_partial: false,
                        }],
                    }),
                    TrendsMode::ByRegion => TrendsData::ByRegion(InterestByRegion {
                        keywords: query.keywords().to_vec(),
                        rows: vec![],
                    }),
                }),
                Reply::RateLimited => Err(TrendsError::RateLimited),
                Reply::Broken => Err(TrendsError::Transport("connection reset".into())),
            }
        }
    }

    struct StaticPool {
        candidates: Vec<ProxyEndpoint>,
        alive: HashSet<String>,
        listings: AtomicUsize,
        probes: AtomicUsize,
    }

    impl StaticPool {
        fn new(candidates: Vec<ProxyEndpoint>, alive: &[&ProxyEndpoint]) -> Self {
            Self {
                candidates,
                alive: alive.iter().map(|p| p.address.clone()).collect(),
                listings: AtomicUsize::new(0),
                probes: AtomicUsize::new(0),
            }
        }
    }

    impl ProxyPool for StaticPool {
        async fn candidates(&self) -> Vec<ProxyEndpoint> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            self.candidates.clone()
        }

        async fn probe(&self, endpoint: &ProxyEndpoint) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.alive.contains(&endpoint.address)
        }
    }

    #[tokio::test]
    async fn direct_success_never_touches_proxies() {
        let backend = ScriptedBackend::new(Reply::Ok, vec![]);
        let pool = StaticPool::new(vec![endpoint(1)], &[]);

        let session = query_trends(backend.clone(), &pool, query(), TrendsMode::OverTime).await.unwrap();
        assert!(session.route().is_none());
        assert_eq!(pool.listings.load(Ordering::SeqCst), 0);
        assert_eq!(backend.calls(), vec![None]);
    }

    #[tokio::test]
    async fn non_rate_limit_error_fails_fast() {
        let backend = ScriptedBackend::new(Reply::Broken, vec![]);
        let pool = StaticPool::new(vec![endpoint(1)], &[&endpoint(1)]);

        let err = query_trends(backend, &pool, query(), TrendsMode::OverTime).await.unwrap_err();
        assert!(matches!(err, TrendsError::Transport(_)));
        assert_eq!(pool.listings.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn skips_dead_proxy_and_uses_next() {
        let (p1, p2) = (endpoint(1), endpoint(2));
        let backend = ScriptedBackend::new(Reply::RateLimited, vec![(p2.clone(), Reply::Ok)]);
        let pool = StaticPool::new(vec![p1.clone(), p2.clone()], &[&p2]);

        let mut session = query_trends(backend.clone(), &pool, query(), TrendsMode::OverTime).await.unwrap();
        assert_eq!(session.route(), Some(&p2));
        assert_eq!(session.skipped_proxies(), 1);
        assert_eq!(pool.probes.load(Ordering::SeqCst), 2);
        // The dead proxy never carried a provider request.
        assert_eq!(backend.calls(), vec![None, Some(p2.address.clone())]);

        // Data from the winning attempt is reused.
        let data = session.interest_over_time().await.unwrap();
        assert_eq!(data.points.len(), 1);
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn rate_limited_and_broken_proxies_are_skipped() {
        let (p1, p2, p3) = (endpoint(1), endpoint(2), endpoint(3));
        let backend = ScriptedBackend::new(
            Reply::RateLimited,
            vec![(p1.clone(), Reply::RateLimited), (p2.clone(), Reply::Broken), (p3.clone(), Reply::Ok)],
        );
        let pool = StaticPool::new(vec![p1.clone(), p2.clone(), p3.clone()], &[&p1, &p2, &p3]);

        let session = query_trends(backend, &pool, query(), TrendsMode::OverTime).await.unwrap();
        assert_eq!(session.route(), Some(&p3));
        assert_eq!(session.skipped_proxies(), 2);
    }

    #[tokio::test]
    async fn exhaustion_is_terminal() {
        let (p1, p2, p3) = (endpoint(1), endpoint(2), endpoint(3));
        let backend = ScriptedBackend::new(
            Reply::RateLimited,
            vec![(p1.clone(), Reply::RateLimited), (p2.clone(), Reply::Broken)],
        );
        let pool = StaticPool::new(vec![p1.clone(), p2.clone(), p3.clone()], &[&p1, &p2]);

        let err = query_trends(backend.clone(), &pool, query(), TrendsMode::OverTime).await.unwrap_err();
        assert!(err.is_terminal());
        assert!(matches!(err, TrendsError::ProxiesExhausted { tried: 3 }));
        assert_eq!(pool.listings.load(Ordering::SeqCst), 1);
        assert_eq!(backend.calls().len(), 3);
    }

    #[tokio::test]
    async fn empty_candidate_list_fails_immediately() {
        let backend = ScriptedBackend::new(Reply::RateLimited, vec![]);
        let pool = StaticPool::new(vec![], &[]);

        let err = query_trends(backend, &pool, query(), TrendsMode::ByRegion).await.unwrap_err();
        assert!(matches!(err, TrendsError::ProxiesExhausted { tried: 0 }));
    }

    #[tokio::test]
    async fn session_fetches_other_mode_over_same_route() {
        let p1 = endpoint(1);
        let backend = ScriptedBackend::new(Reply::RateLimited, vec![(p1.clone(), Reply::Ok)]);
        let pool = StaticPool::new(vec![p1.clone()], &[&p1]);

        let mut session = query_trends(backend.clone(), &pool, query(), TrendsMode::OverTime).await.unwrap();
        let regions = session.interest_by_region().await.unwrap();
        assert!(regions.is_empty());
        assert_eq!(backend.calls().last().cloned().flatten(), Some(p1.address.clone()));
    }
}
