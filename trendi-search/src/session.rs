use crate::search::SearchType;
use crate::types::SearchResultItem;
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SummaryKey {
    pub search_id: u64,
    pub item_index: usize,
}

impl SummaryKey {
    pub fn new(search_id: u64, item_index: usize) -> Self {
        Self { search_id, item_index }
    }
}

#[derive(Debug, Clone)]
pub struct SearchExecution {
    pub id: u64,
    pub search_type: SearchType,
    pub items: Vec<SearchResultItem>,
}

#[derive(Debug, Default)]
pub struct Session {
    search_counter: u64,
    current: Option<SearchExecution>,
    summaries: HashMap<SummaryKey, String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the id for a new search.
    pub fn begin_search(&mut self) -> u64 {
        self.search_counter += 1;
        self.search_counter
    }

    /// Make `execution` the displayed search. Summaries of older searches
    /// can no longer be shown, so they are dropped.
    pub fn record_search(&mut self, execution: SearchExecution) {
        self.summaries.retain(|key, _| key.search_id >= execution.id);
        self.current = Some(execution);
    }

    pub fn current_search(&self) -> Option<&SearchExecution> {
        self.current.as_ref()
    }

    /// The item at `index`, provided `search_id` is still the displayed search.
    pub fn item(&self, search_id: u64, index: usize) -> Option<&SearchResultItem> {
        self.current
            .as_ref()
            .filter(|s| s.id == search_id)
            .and_then(|s| s.items.get(index))
    }

    pub fn store_summary(&mut self, key: SummaryKey, summary: String) {
        self.summaries.insert(key, summary);
    }

    pub fn summary(&self, key: SummaryKey) -> Option<&str> {
        self.summaries.get(&key).map(String::as_str)
    }
}

pub type SharedSession = Arc<Mutex<Session>>;

/// Live sessions, dropped after sitting idle for the TTL.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<Uuid, SharedSession>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Cache::builder()
                .max_capacity(10_000)
                .time_to_idle(ttl)
                .build(),
        }
    }

    pub async fn create(&self) -> (Uuid, SharedSession) {
        let id = Uuid::new_v4();
        let session = Arc::new(Mutex::new(Session::new()));
        self.sessions.insert(id, session.clone()).await;
        (id, session)
    }

    pub async fn get(&self, id: &Uuid) -> Option<SharedSession> {
        self.sessions.get(id).await
    }
}
