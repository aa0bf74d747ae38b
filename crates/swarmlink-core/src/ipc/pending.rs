//! Pending-request registry and caller-side request handles.
//!
//! Every outbound request registers a handle keyed by its `command_id`
//! before the request is published, so a reply arriving faster than the
//! caller can reach `fetch()` is never lost. The dispatcher feeds matching
//! responses with an O(1) map lookup and wakes waiting fetches directly
//! through a `Notify` -- the wake latency is one scheduler hop, not a poll
//! interval.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::time::Instant;

use swarmlink_types::envelope::{Envelope, Scope};

/// Default time `fetch()` waits for responders.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Options controlling how many responses a request waits for, and for how
/// long.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// How many responders to wait for. Defaults to the fleet cluster count
    /// for broadcasts and to 1 for `jobserver`-scope calls.
    pub num_clusters_needed: Option<usize>,
    /// Wall-clock bound on `fetch()`.
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            num_clusters_needed: None,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

pub(crate) struct RequestState {
    command_id: String,
    scope: Scope,
    action: String,
    needed: usize,
    timeout: Duration,
    responses: Mutex<HashMap<i64, Envelope>>,
    done: AtomicBool,
    notify: Notify,
}

impl RequestState {
    fn lock_responses(&self) -> MutexGuard<'_, HashMap<i64, Envelope>> {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry of in-flight requests, keyed by `command_id`.
///
/// Inserted by the send path, fed and drained by the dispatch path.
#[derive(Default)]
pub struct PendingRequests {
    inner: DashMap<String, Arc<RequestState>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests currently awaiting responses.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub(crate) fn register(
        self: &Arc<Self>,
        command_id: String,
        scope: Scope,
        action: String,
        needed: usize,
        timeout: Duration,
    ) -> RequestHandle {
        let state = Arc::new(RequestState {
            command_id: command_id.clone(),
            scope,
            action,
            needed,
            timeout,
            responses: Mutex::new(HashMap::new()),
            done: AtomicBool::new(false),
            notify: Notify::new(),
        });
        self.inner.insert(command_id, Arc::clone(&state));
        RequestHandle {
            state,
            registry: Arc::clone(self),
        }
    }

    /// Feed an inbound response to its pending handle.
    ///
    /// Admits the envelope only on an exact `command_id`/`scope`/`action`
    /// match against a registered handle; anything else is dropped with no
    /// effect and `false` is returned. A duplicate reply from the same
    /// responder overwrites the earlier one. Once the handle has collected
    /// the required number of responses it is deregistered.
    pub fn feed(&self, envelope: Envelope) -> bool {
        let Some(command_id) = envelope.command_id.clone() else {
            return false;
        };
        let Some(state) = self.inner.get(&command_id).map(|e| Arc::clone(e.value())) else {
            return false;
        };
        if state.scope != envelope.scope || state.action != envelope.action {
            return false;
        }
        let Some(responder) = envelope.resp_cluster() else {
            return false;
        };

        // `done` transitions under the response lock so a late feed racing
        // a completing one can never push the map past `needed`.
        let completed = {
            let mut responses = state.lock_responses();
            if state.done.load(Ordering::Acquire) {
                return false;
            }
            responses.insert(responder, envelope);
            if responses.len() >= state.needed {
                state.done.store(true, Ordering::Release);
                true
            } else {
                false
            }
        };

        if completed {
            self.inner.remove(&command_id);
        }
        state.notify.notify_waiters();
        true
    }

    fn deregister(&self, command_id: &str) {
        self.inner.remove(command_id);
    }
}

/// Caller-owned correlation object for one outstanding request.
#[derive(Clone)]
pub struct RequestHandle {
    state: Arc<RequestState>,
    registry: Arc<PendingRequests>,
}

impl RequestHandle {
    /// The request's correlation id.
    pub fn command_id(&self) -> &str {
        &self.state.command_id
    }

    /// How many responders this handle waits for.
    pub fn num_clusters_needed(&self) -> usize {
        self.state.needed
    }

    /// Whether the handle is still collecting responses.
    pub fn is_pending(&self) -> bool {
        !self.state.done.load(Ordering::Acquire)
            && self.state.lock_responses().len() < self.state.needed
    }

    /// Mark the handle done and deregister it. Idempotent.
    pub fn stop(&self) {
        self.state.done.store(true, Ordering::Release);
        self.registry.deregister(&self.state.command_id);
        self.state.notify.notify_waiters();
    }

    /// Wait until the required number of responses has arrived or the
    /// timeout elapses, then return whatever accumulated.
    ///
    /// Partial maps are expected under cluster churn, not exceptional;
    /// callers must inspect the map size rather than assume completeness.
    pub async fn fetch(&self) -> HashMap<i64, Envelope> {
        let deadline = Instant::now() + self.state.timeout;
        loop {
            if !self.is_pending() {
                break;
            }
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            // Re-check after registering the waiter: a response that landed
            // between the first check and `enable()` would otherwise be a
            // lost wakeup.
            if !self.is_pending() {
                break;
            }
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }
        self.stop();
        self.state.lock_responses().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use swarmlink_types::envelope::Scope;

    fn response(command_id: &str, scope: Scope, action: &str, responder: i64) -> Envelope {
        let mut env = Envelope::new(scope, action);
        env.command_id = Some(command_id.to_string());
        env.output = Some(json!({"responder": responder}));
        env.data_mut().resp_cluster = Some(responder);
        env
    }

    fn registry() -> Arc<PendingRequests> {
        Arc::new(PendingRequests::new())
    }

    #[tokio::test]
    async fn feed_requires_exact_match() {
        let pending = registry();
        let handle = pending.register(
            "cmd-1".to_string(),
            Scope::Bot,
            "statuses".to_string(),
            2,
            DEFAULT_FETCH_TIMEOUT,
        );

        // Wrong command id
        assert!(!pending.feed(response("cmd-2", Scope::Bot, "statuses", 0)));
        // Wrong scope
        assert!(!pending.feed(response("cmd-1", Scope::Launcher, "statuses", 0)));
        // Wrong action
        assert!(!pending.feed(response("cmd-1", Scope::Bot, "num_processes", 0)));
        // Missing respCluster
        let mut bare = Envelope::new(Scope::Bot, "statuses");
        bare.command_id = Some("cmd-1".to_string());
        assert!(!pending.feed(bare));

        assert!(handle.is_pending());
        assert!(pending.feed(response("cmd-1", Scope::Bot, "statuses", 0)));
    }

    #[tokio::test]
    async fn map_never_exceeds_needed() {
        let pending = registry();
        let handle = pending.register(
            "cmd-1".to_string(),
            Scope::Bot,
            "statuses".to_string(),
            2,
            DEFAULT_FETCH_TIMEOUT,
        );

        assert!(pending.feed(response("cmd-1", Scope::Bot, "statuses", 0)));
        assert!(pending.feed(response("cmd-1", Scope::Bot, "statuses", 1)));
        // Handle is complete and deregistered; a third responder is dropped.
        assert!(!pending.feed(response("cmd-1", Scope::Bot, "statuses", 2)));

        let responses = handle.fetch().await;
        assert_eq!(responses.len(), 2);
        assert!(responses.contains_key(&0));
        assert!(responses.contains_key(&1));
    }

    #[tokio::test]
    async fn duplicate_responder_overwrites() {
        let pending = registry();
        let handle = pending.register(
            "cmd-1".to_string(),
            Scope::Bot,
            "statuses".to_string(),
            2,
            Duration::from_millis(50),
        );

        let mut first = response("cmd-1", Scope::Bot, "statuses", 0);
        first.output = Some(json!("first"));
        let mut second = response("cmd-1", Scope::Bot, "statuses", 0);
        second.output = Some(json!("second"));

        assert!(pending.feed(first));
        assert!(pending.feed(second));

        let responses = handle.fetch().await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[&0].output, Some(json!("second")));
    }

    #[tokio::test]
    async fn fetch_resolves_as_soon_as_needed_is_met() {
        let pending = registry();
        let handle = pending.register(
            "cmd-1".to_string(),
            Scope::Jobserver,
            "get_task".to_string(),
            1,
            Duration::from_secs(30),
        );

        let feeder = Arc::clone(&pending);
        tokio::spawn(async move {
            feeder.feed(response("cmd-1", Scope::Jobserver, "get_task", -1));
        });

        let start = Instant::now();
        let responses = handle.fetch().await;
        assert_eq!(responses.len(), 1);
        assert!(responses.contains_key(&-1));
        // Resolved by the notify, nowhere near the 30s timeout.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn fetch_returns_partial_map_on_timeout() {
        let pending = registry();
        let handle = pending.register(
            "cmd-1".to_string(),
            Scope::Bot,
            "statuses".to_string(),
            3,
            Duration::from_millis(50),
        );

        pending.feed(response("cmd-1", Scope::Bot, "statuses", 1));

        let responses = handle.fetch().await;
        assert_eq!(responses.len(), 1);
        assert!(!handle.is_pending());
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_deregisters() {
        let pending = registry();
        let handle = pending.register(
            "cmd-1".to_string(),
            Scope::Bot,
            "statuses".to_string(),
            1,
            DEFAULT_FETCH_TIMEOUT,
        );
        assert_eq!(pending.len(), 1);

        handle.stop();
        handle.stop();
        assert!(pending.is_empty());
        assert!(!handle.is_pending());

        // Responses after stop are dropped.
        assert!(!pending.feed(response("cmd-1", Scope::Bot, "statuses", 0)));
    }

    #[tokio::test]
    async fn completed_handle_is_reclaimed_from_registry() {
        let pending = registry();
        let _handle = pending.register(
            "cmd-1".to_string(),
            Scope::Jobserver,
            "get_task".to_string(),
            1,
            DEFAULT_FETCH_TIMEOUT,
        );
        assert_eq!(pending.len(), 1);

        pending.feed(response("cmd-1", Scope::Jobserver, "get_task", -1));
        assert!(pending.is_empty());
    }
}
