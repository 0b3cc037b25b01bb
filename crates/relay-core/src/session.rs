use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::{Mutex, OnceCell, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::debug;

use crate::engine::Engine;
use crate::errors::ProviderError;
use crate::model::{ClientId, SessionLimits};

/// Handle to one engine-side conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionHandle {
    client_id: ClientId,
    thread_id: String,
}

impl SessionHandle {
    pub fn new(client_id: ClientId, thread_id: impl Into<String>) -> Self {
        Self {
            client_id,
            thread_id: thread_id.into(),
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Engine-side conversation id.
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }
}

#[derive(Default)]
struct SessionSlot {
    handle: OnceCell<SessionHandle>,
    turn_lock: Arc<Mutex<()>>,
    /// Milliseconds since the store's epoch at the last checkout.
    last_used: AtomicU64,
}

/// A session checked out for one stream request.
#[derive(Clone)]
pub struct Session {
    handle: SessionHandle,
    slot: Arc<SessionSlot>,
}

impl Session {
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Waits until no other run is using this conversation.
    ///
    /// Held for a whole turn (user message plus run) so concurrent streams of
    /// the same client never interleave.
    pub(crate) async fn lock_turn(&self) -> OwnedMutexGuard<()> {
        self.slot.turn_lock.clone().lock_owned().await
    }
}

/// Per-client sessions, keyed by `ClientId`.
///
/// Each client gets its own conversation; no state is shared between clients.
pub struct SessionStore {
    slots: DashMap<ClientId, Arc<SessionSlot>>,
    epoch: Instant,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self {
            slots: DashMap::new(),
            epoch: Instant::now(),
        }
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Returns the client's session, creating its conversation on first use.
    ///
    /// Concurrent first requests for the same client create exactly one
    /// conversation. A failed creation leaves the slot empty for a retry.
    pub async fn get_or_create(
        &self,
        client_id: &ClientId,
        engine: &dyn Engine,
    ) -> Result<Session, ProviderError> {
        let slot = self.slots.entry(client_id.clone()).or_default().clone();
        slot.last_used.store(self.now_ms(), Ordering::Relaxed);
        let handle = slot
            .handle
            .get_or_try_init(|| async {
                debug!(client_id = %client_id, engine = %engine.id(), "creating session");
                engine.create_session(client_id).await
            })
            .await?
            .clone();
        Ok(Session { handle, slot })
    }

    /// Returns the client's session handle if one was created.
    pub fn get(&self, client_id: &ClientId) -> Option<SessionHandle> {
        self.slots
            .get(client_id)
            .and_then(|slot| slot.handle.get().cloned())
    }

    /// Forgets a client's session; the next request starts a new conversation.
    pub fn remove(&self, client_id: &ClientId) -> Option<SessionHandle> {
        self.slots
            .remove(client_id)
            .and_then(|(_, slot)| slot.handle.get().cloned())
    }

    /// Forgets sessions that outlived `limits` and returns their handles.
    ///
    /// Sessions idle past the TTL go first, then the least recently used
    /// until the map fits `max_sessions`. A session still checked out by a
    /// request is never evicted.
    pub fn evict(&self, limits: &SessionLimits) -> Vec<SessionHandle> {
        let now = self.now_ms();
        let ttl = u64::try_from(limits.idle_ttl.as_millis()).unwrap_or(u64::MAX);
        let mut candidates: Vec<(ClientId, u64)> = self
            .slots
            .iter()
            .filter(|entry| is_unused(entry.value()))
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().last_used.load(Ordering::Relaxed),
                )
            })
            .collect();
        candidates.sort_by_key(|(_, last_used)| *last_used);

        let mut excess = self.slots.len().saturating_sub(limits.max_sessions);
        let mut evicted = Vec::new();
        for (client_id, last_used) in candidates {
            let expired = now.saturating_sub(last_used) > ttl;
            if !expired && excess == 0 {
                break;
            }
            let Some((_, slot)) = self.slots.remove_if(&client_id, |_, slot| is_unused(slot))
            else {
                continue;
            };
            excess = excess.saturating_sub(1);
            debug!(client_id = %client_id, expired, "session evicted");
            if let Some(handle) = slot.handle.get() {
                evicted.push(handle.clone());
            }
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// True when only the store itself holds the slot.
fn is_unused(slot: &Arc<SessionSlot>) -> bool {
    Arc::strong_count(slot) == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::EventSink;
    use crate::model::{AssistantId, AssistantSpec, EngineId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingEngine {
        created: AtomicUsize,
        fail_first: bool,
    }

    impl CountingEngine {
        fn new(fail_first: bool) -> Self {
            Self {
                created: AtomicUsize::new(0),
                fail_first,
            }
        }
    }

    #[async_trait::async_trait]
    impl Engine for CountingEngine {
        fn id(&self) -> EngineId {
            EngineId::new("counting")
        }

        async fn create_assistant(
            &self,
            _spec: &AssistantSpec,
        ) -> Result<AssistantId, ProviderError> {
            unreachable!("not used in this test")
        }

        async fn create_session(
            &self,
            client_id: &ClientId,
        ) -> Result<SessionHandle, ProviderError> {
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail_first && n == 0 {
                return Err(ProviderError::transport("counting", "offline"));
            }
            Ok(SessionHandle::new(client_id.clone(), format!("thread-{n}")))
        }

        async fn add_user_message(
            &self,
            _session: &SessionHandle,
            _prompt: &str,
        ) -> Result<(), ProviderError> {
            unreachable!("not used in this test")
        }

        async fn stream_run(
            &self,
            _session: &SessionHandle,
            _assistant: &AssistantId,
            _instructions: Option<&str>,
            _sink: &dyn EventSink,
        ) -> Result<(), ProviderError> {
            unreachable!("not used in this test")
        }
    }

    #[tokio::test]
    async fn clients_get_isolated_sessions() {
        let engine = CountingEngine::new(false);
        let store = SessionStore::new();
        let alice = store
            .get_or_create(&ClientId::new("alice"), &engine)
            .await
            .expect("alice");
        let bob = store
            .get_or_create(&ClientId::new("bob"), &engine)
            .await
            .expect("bob");
        assert_ne!(alice.handle().thread_id(), bob.handle().thread_id());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn same_client_reuses_its_session() {
        let engine = CountingEngine::new(false);
        let store = SessionStore::new();
        let client = ClientId::new("alice");
        let first = store.get_or_create(&client, &engine).await.expect("first");
        let second = store.get_or_create(&client, &engine).await.expect("second");
        assert_eq!(first.handle(), second.handle());
        assert_eq!(engine.created.load(Ordering::SeqCst), 1);
        assert_eq!(store.get(&client), Some(first.handle().clone()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_requests_create_one_session() {
        let engine = Arc::new(CountingEngine::new(false));
        let store = Arc::new(SessionStore::new());
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let engine = engine.clone();
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .get_or_create(&ClientId::new("alice"), engine.as_ref())
                    .await
                    .expect("session")
                    .handle()
                    .clone()
            }));
        }
        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.expect("join"));
        }
        assert!(handles.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(engine.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_creation_is_retried_on_next_request() {
        let engine = CountingEngine::new(true);
        let store = SessionStore::new();
        let client = ClientId::new("alice");
        assert!(store.get_or_create(&client, &engine).await.is_err());
        assert_eq!(store.get(&client), None);
        let session = store.get_or_create(&client, &engine).await.expect("retry");
        assert_eq!(session.handle().thread_id(), "thread-1");
    }

    #[tokio::test]
    async fn removed_client_starts_a_new_conversation() {
        let engine = CountingEngine::new(false);
        let store = SessionStore::new();
        let client = ClientId::new("alice");
        let first = store.get_or_create(&client, &engine).await.expect("first");
        assert_eq!(store.remove(&client), Some(first.handle().clone()));
        assert!(store.is_empty());
        let second = store.get_or_create(&client, &engine).await.expect("second");
        assert_ne!(first.handle(), second.handle());
    }

    #[tokio::test]
    async fn turn_lock_serializes_runs_on_one_session() {
        let engine = CountingEngine::new(false);
        let store = SessionStore::new();
        let client = ClientId::new("alice");
        let session = store.get_or_create(&client, &engine).await.expect("session");
        let other = store.get_or_create(&client, &engine).await.expect("session");

        let guard = session.lock_turn().await;
        let waiting = tokio::spawn(async move {
            let _guard = other.lock_turn().await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());
        drop(guard);
        waiting.await.expect("second turn");
    }

    fn client_names(handles: &[SessionHandle]) -> Vec<String> {
        handles
            .iter()
            .map(|handle| handle.client_id().to_string())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn least_recently_used_sessions_go_first_past_capacity() {
        let engine = CountingEngine::new(false);
        let store = SessionStore::new();
        for name in ["a", "b", "c", "d"] {
            store
                .get_or_create(&ClientId::new(name), &engine)
                .await
                .expect("session");
            tokio::time::advance(Duration::from_secs(1)).await;
        }

        let evicted = store.evict(&SessionLimits::new(Duration::from_secs(3600), 2));
        assert_eq!(client_names(&evicted), vec!["a", "b"]);
        assert_eq!(store.len(), 2);
        assert!(store.get(&ClientId::new("c")).is_some());
        assert!(store.get(&ClientId::new("d")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_idle_past_ttl_are_evicted() {
        let engine = CountingEngine::new(false);
        let store = SessionStore::new();
        store
            .get_or_create(&ClientId::new("old"), &engine)
            .await
            .expect("old");
        tokio::time::advance(Duration::from_secs(61)).await;
        store
            .get_or_create(&ClientId::new("fresh"), &engine)
            .await
            .expect("fresh");

        let evicted = store.evict(&SessionLimits::new(Duration::from_secs(60), 100));
        assert_eq!(client_names(&evicted), vec!["old"]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn checked_out_sessions_are_never_evicted() {
        let engine = CountingEngine::new(false);
        let store = SessionStore::new();
        let held = store
            .get_or_create(&ClientId::new("alice"), &engine)
            .await
            .expect("alice");
        store
            .get_or_create(&ClientId::new("bob"), &engine)
            .await
            .expect("bob");

        let evicted = store.evict(&SessionLimits::new(Duration::ZERO, 0));
        assert_eq!(client_names(&evicted), vec!["bob"]);
        assert_eq!(store.get(&ClientId::new("alice")), Some(held.handle().clone()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn failed_creation_slots_are_evicted_without_a_handle() {
        let engine = CountingEngine::new(true);
        let store = SessionStore::new();
        assert!(
            store
                .get_or_create(&ClientId::new("alice"), &engine)
                .await
                .is_err()
        );
        assert_eq!(store.len(), 1);
        assert!(store.evict(&SessionLimits::new(Duration::from_secs(60), 0)).is_empty());
        assert!(store.is_empty());
    }
}
