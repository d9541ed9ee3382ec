#![allow(clippy::unwrap_used, dead_code)]
// Shared fixtures: an in-memory pool service with call counters and
// switchable failures, plus typed entities and params.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use batchview_core::{
    CoreError, DataCache, Entity, EntityGetter, EntitySource, FetchOptions, ListGetter, ListOptions,
    PageSource, RawPage,
};

// ── Model ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub id: String,
    pub vm_size: String,
    #[serde(default)]
    pub target_nodes: u32,
    #[serde(default)]
    pub state: String,
}

impl Entity for Pool {
    fn cache_key(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolParams {
    pub id: String,
}

impl PoolParams {
    pub fn new(id: &str) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub name: String,
}

impl Account {
    pub fn new(name: &str) -> Self {
        Self { name: name.into() }
    }
}

pub fn pool_id(n: usize) -> String {
    format!("pool-{n:03}")
}

pub fn pool_json(n: usize) -> Value {
    json!({
        "id": pool_id(n),
        "vmSize": "standard_d2",
        // Deliberately not monotonic in n, so sorting visibly reorders.
        "targetNodes": (n * 7) % 13,
        "state": "active",
    })
}

// ── Fake service ────────────────────────────────────────────────────

/// In-memory stand-in for the remote pool API. `next_link` is the offset
/// of the next page.
pub struct Backend {
    pools: Mutex<Vec<Value>>,
    failure: Mutex<Option<CoreError>>,
    delay: Mutex<Option<Duration>>,
    pub entity_calls: AtomicUsize,
    pub page_calls: AtomicUsize,
}

impl Backend {
    pub fn with_pools(count: usize) -> Arc<Self> {
        Arc::new(Self {
            pools: Mutex::new((0..count).map(pool_json).collect()),
            failure: Mutex::new(None),
            delay: Mutex::new(None),
            entity_calls: AtomicUsize::new(0),
            page_calls: AtomicUsize::new(0),
        })
    }

    pub fn entity_calls(&self) -> usize {
        self.entity_calls.load(Ordering::SeqCst)
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    /// Make every request fail with `err` until cleared with `None`.
    pub fn fail_with(&self, err: Option<CoreError>) {
        *self.failure.lock().unwrap() = err;
    }

    /// Delay every response (use with paused time).
    pub fn delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn insert_front(&self, pool: Value) {
        self.pools.lock().unwrap().insert(0, pool);
    }

    pub fn remove(&self, id: &str) {
        self.pools.lock().unwrap().retain(|p| p["id"] != id);
    }

    pub fn update(&self, id: &str, field: &str, value: Value) {
        let mut pools = self.pools.lock().unwrap();
        if let Some(pool) = pools.iter_mut().find(|p| p["id"] == id) {
            pool[field] = value;
        }
    }

    fn check(&self) -> Result<Option<Duration>, CoreError> {
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(*self.delay.lock().unwrap())
    }

    fn get(&self, id: &str) -> Result<Value, CoreError> {
        self.pools
            .lock()
            .unwrap()
            .iter()
            .find(|p| p["id"] == id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("pool {id} not found")))
    }

    fn page(&self, options: &ListOptions, offset: usize) -> RawPage {
        let size = options.page_size.unwrap_or(10) as usize;
        let pools = self.pools.lock().unwrap();
        let matching: Vec<&Value> = pools
            .iter()
            .filter(|p| match options.filter.as_deref().and_then(|f| f.split_once('=')) {
                Some((field, value)) => p[field] == value,
                None => true,
            })
            .collect();
        let items = matching.iter().skip(offset).take(size).map(|p| (*p).clone()).collect();
        let next = offset + size;
        RawPage::new(items, (next < matching.len()).then(|| next.to_string()))
    }

    pub fn entity_source(self: &Arc<Self>) -> impl EntitySource<PoolParams> + use<> {
        let backend = Arc::clone(self);
        move |params: PoolParams, _options: FetchOptions| {
            backend.entity_calls.fetch_add(1, Ordering::SeqCst);
            let backend = Arc::clone(&backend);
            async move {
                if let Some(delay) = backend.check()? {
                    tokio::time::sleep(delay).await;
                }
                backend.get(&params.id)
            }
        }
    }

    pub fn page_source(self: &Arc<Self>) -> impl PageSource<Account> + use<> {
        let backend = Arc::clone(self);
        move |_account: Account, options: ListOptions, next_link: Option<String>| {
            backend.page_calls.fetch_add(1, Ordering::SeqCst);
            let backend = Arc::clone(&backend);
            async move {
                if let Some(delay) = backend.check()? {
                    tokio::time::sleep(delay).await;
                }
                let offset = next_link.map_or(0, |link| link.parse().unwrap());
                Ok::<_, CoreError>(backend.page(&options, offset))
            }
        }
    }
}

// ── Wiring ──────────────────────────────────────────────────────────

pub fn entity_getter(backend: &Arc<Backend>, cache: &Arc<DataCache<Pool>>) -> EntityGetter<PoolParams, Pool> {
    EntityGetter::new(Arc::clone(cache), |p: &PoolParams| p.id.clone(), backend.entity_source())
}

pub fn list_getter(backend: &Arc<Backend>, cache: &Arc<DataCache<Pool>>) -> ListGetter<Account, Pool> {
    ListGetter::new(Arc::clone(cache), backend.page_source())
}

pub fn ids(items: &[Arc<Pool>]) -> Vec<String> {
    items.iter().map(|p| p.id.clone()).collect()
}

pub fn pool(n: usize) -> Pool {
    serde_json::from_value(pool_json(n)).unwrap()
}

/// Await `fut`, failing the test instead of hanging.
pub async fn within<F: std::future::Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}
