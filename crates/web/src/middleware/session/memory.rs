use super::{Session, Store, generate_token};
use crate::error::Error;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::trace;

struct Entry {
    data: Map<String, Value>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[derive(Default)]
struct Shared {
    entries: tokio::sync::Mutex<HashMap<String, Entry>>,
}

impl Shared {
    async fn prune(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }
}

/// Sessions kept in process memory, lost on restart.
///
/// With a time to live every save pushes the expiry forward; expired sessions load as empty
/// and are swept by the task started with [`MemoryStore::start_pruning`].
pub struct MemoryStore {
    shared: Arc<Shared>,
    ttl: Option<Duration>,
    pruner: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::build(Some(ttl))
    }

    fn build(ttl: Option<Duration>) -> Self {
        Self { shared: Arc::default(), ttl, pruner: Mutex::new(None) }
    }

    /// Sweeps expired sessions every `interval` on a background task, replacing a previous
    /// one. The task holds no strong reference to the store and ends with it.
    ///
    /// Must be called within a tokio runtime.
    pub fn start_pruning(&self, interval: Duration) {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                let removed = shared.prune().await;
                trace!(removed, "pruned expired sessions");
            }
        });
        self.replace_pruner(Some(task));
    }

    /// Stops the pruning task, if any.
    pub fn stop_pruning(&self) {
        self.replace_pruner(None);
    }

    pub fn is_pruning(&self) -> bool {
        self.pruner.lock().is_ok_and(|pruner| pruner.as_ref().is_some_and(|task| !task.is_finished()))
    }

    pub async fn len(&self) -> usize {
        self.shared.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn replace_pruner(&self, task: Option<JoinHandle<()>>) {
        let previous = match self.pruner.lock() {
            Ok(mut pruner) => std::mem::replace(&mut *pruner, task),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), task),
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").field("ttl", &self.ttl).field("pruning", &self.is_pruning()).finish_non_exhaustive()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.stop_pruning();
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load(&self, token: &str) -> Result<Session, Error> {
        let mut entries = self.shared.entries.lock().await;
        match entries.get(token) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                entries.remove(token);
                Ok(Session::new())
            }
            Some(entry) => Ok(Session { token: Some(token.to_owned()), data: entry.data.clone() }),
            None => Ok(Session::new()),
        }
    }

    async fn save(&self, session: &mut Session) -> Result<String, Error> {
        let token = match &session.token {
            Some(token) => token.clone(),
            None => generate_token()?,
        };
        session.token = Some(token.clone());

        let entry = Entry { data: session.data.clone(), expires_at: self.ttl.map(|ttl| Instant::now() + ttl) };
        self.shared.entries.lock().await.insert(token.clone(), entry);
        Ok(token)
    }

    async fn purge(&self, token: Option<&str>) -> Result<(), Error> {
        match token {
            Some(token) => {
                self.shared.entries.lock().await.remove(token);
            }
            None => {
                self.shared.prune().await;
            }
        }
        Ok(())
    }

    async fn destroy(&self) {
        self.stop_pruning();
        self.shared.entries.lock().await.clear();
    }
}
