//! Broadcaster - latest simulation state and viewer fan-out

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::model::SimulationState;

type SharedState = Arc<SimulationState>;

#[derive(Default)]
struct Latest {
    state: Option<SharedState>,
    updated_at: Option<DateTime<Utc>>,
    published: u64,
}

/// Process-wide hub holding the current state and the viewer registry.
///
/// `publish` is called from the connector task only and never waits on a
/// viewer: a lagging subscriber loses its oldest pending states instead.
pub struct Broadcaster {
    latest: RwLock<Latest>,
    tx: broadcast::Sender<SharedState>,
    /// Dropping a session's sender ends its subscription
    sessions: DashMap<Uuid, watch::Sender<()>>,
    snapshot_on_join: bool,
}

impl Broadcaster {
    pub fn new(queue_capacity: usize, snapshot_on_join: bool) -> Self {
        let (tx, _) = broadcast::channel(queue_capacity.max(1));
        Self {
            latest: RwLock::new(Latest::default()),
            tx,
            sessions: DashMap::new(),
            snapshot_on_join,
        }
    }

    /// Replace the current state and send it to every subscriber
    pub fn publish(&self, state: SimulationState) {
        let state = Arc::new(state);
        {
            // Sent under the write lock so `subscribe` sees either the
            // snapshot or the send, never both
            let mut latest = self.latest.write();
            latest.state = Some(state.clone());
            latest.updated_at = Some(Utc::now());
            latest.published += 1;
            let _ = self.tx.send(state);
        }

        self.sessions.retain(|session_id, closer| {
            let open = !closer.is_closed();
            if !open {
                debug!(session_id = %session_id, "Removed dropped viewer session");
            }
            open
        });
    }

    /// Register a new viewer session
    pub fn subscribe(&self) -> Subscription {
        let session_id = Uuid::new_v4();
        let (closer, closed) = watch::channel(());

        let (states, snapshot) = {
            let latest = self.latest.read();
            let snapshot = if self.snapshot_on_join {
                latest.state.clone()
            } else {
                None
            };
            (self.tx.subscribe(), snapshot)
        };
        self.sessions.insert(session_id, closer);

        debug!(session_id = %session_id, sessions = self.sessions.len(), "Viewer subscribed");

        Subscription {
            session_id,
            states,
            snapshot,
            closed,
            dropped: 0,
        }
    }

    /// Remove a session; returns whether it was still registered
    pub fn unsubscribe(&self, session_id: Uuid) -> bool {
        if self.sessions.remove(&session_id).is_some() {
            debug!(session_id = %session_id, "Viewer unsubscribed");
            true
        } else {
            false
        }
    }

    /// End every session (used on shutdown)
    pub fn close_all(&self) {
        let count = self.sessions.len();
        self.sessions.clear();
        info!(sessions = count, "Closed all viewer sessions");
    }

    pub fn current(&self) -> Option<SharedState> {
        self.latest.read().state.clone()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.latest.read().updated_at
    }

    /// Total states published since startup
    pub fn published(&self) -> u64 {
        self.latest.read().published
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// A registered viewer's receiving end.
///
/// Ends once the session is unsubscribed or the hub shuts down. Dropping it
/// marks the registry entry for removal on the next publish.
pub struct Subscription {
    session_id: Uuid,
    states: broadcast::Receiver<SharedState>,
    snapshot: Option<SharedState>,
    closed: watch::Receiver<()>,
    dropped: u64,
}

impl Subscription {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Next state in publish order, possibly skipping ones lost to lag
    pub async fn recv(&mut self) -> Option<SharedState> {
        if self.closed.has_changed().is_err() {
            return None;
        }
        if let Some(state) = self.snapshot.take() {
            return Some(state);
        }

        loop {
            tokio::select! {
                biased;
                _ = self.closed.changed() => return None,
                result = self.states.recv() => match result {
                    Ok(state) => return Some(state),
                    Err(RecvError::Lagged(n)) => {
                        debug!(session_id = %self.session_id, skipped = n, "Viewer lagged behind");
                        self.dropped += n;
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }

    /// Wait for a state, then skip ahead to the newest one already pending
    pub async fn recv_latest(&mut self) -> Option<SharedState> {
        let mut latest = self.recv().await?;
        loop {
            match self.states.try_recv() {
                Ok(state) => {
                    self.dropped += 1;
                    latest = state;
                }
                Err(TryRecvError::Lagged(n)) => self.dropped += n,
                Err(_) => break,
            }
        }
        Some(latest)
    }

    /// States this session never saw
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    fn state(n: u64) -> SimulationState {
        serde_json::from_value(json!({ "tick": n, "vehicles": [] })).unwrap()
    }

    fn tick(state: &SimulationState) -> u64 {
        state.get("tick").and_then(|v| v.as_u64()).unwrap()
    }

    #[tokio::test]
    async fn stalled_subscriber_still_gets_latest() {
        let hub = Broadcaster::new(1, false);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.publish(state(1));
        assert_eq!(tick(&a.recv().await.unwrap()), 1);

        // B is not reading while S2 and S3 go out; publish must not wait on it
        hub.publish(state(2));
        assert_eq!(tick(&a.recv().await.unwrap()), 2);
        hub.publish(state(3));
        assert_eq!(tick(&a.recv().await.unwrap()), 3);

        let last = timeout(Duration::from_secs(1), b.recv()).await.unwrap().unwrap();
        assert_eq!(tick(&last), 3);
        assert_eq!(b.dropped(), 2);
    }

    #[tokio::test]
    async fn subscribers_see_publishes_in_order() {
        let hub = Broadcaster::new(16, false);
        let mut subs = [hub.subscribe(), hub.subscribe()];

        for n in 1..=5 {
            hub.publish(state(n));
        }

        for sub in subs.iter_mut() {
            let mut seen = Vec::new();
            for _ in 0..5 {
                seen.push(tick(&sub.recv().await.unwrap()));
            }
            assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        }
    }

    #[tokio::test]
    async fn recv_latest_skips_to_newest() {
        let hub = Broadcaster::new(8, false);
        let mut sub = hub.subscribe();
        for n in 1..=5 {
            hub.publish(state(n));
        }

        assert_eq!(tick(&sub.recv_latest().await.unwrap()), 5);
        assert_eq!(sub.dropped(), 4);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let hub = Broadcaster::new(4, false);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        assert!(hub.unsubscribe(a.session_id()));
        assert!(!hub.unsubscribe(a.session_id()));
        assert_eq!(hub.session_count(), 1);

        hub.publish(state(1));
        assert_eq!(tick(&b.recv().await.unwrap()), 1);
        assert_eq!(a.recv().await, None);
    }

    #[tokio::test]
    async fn unsubscribe_wakes_waiting_reader() {
        let hub = Arc::new(Broadcaster::new(4, false));
        let mut sub = hub.subscribe();
        let session_id = sub.session_id();

        let reader = tokio::spawn(async move { sub.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        hub.unsubscribe(session_id);

        let result = timeout(Duration::from_secs(1), reader).await.unwrap().unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn late_joiner_gets_snapshot_when_enabled() {
        let hub = Broadcaster::new(4, true);
        hub.publish(state(9));

        let mut sub = hub.subscribe();
        assert_eq!(tick(&sub.recv().await.unwrap()), 9);

        let quiet = Broadcaster::new(4, false);
        quiet.publish(state(9));
        let mut sub = quiet.subscribe();
        assert!(timeout(Duration::from_millis(50), sub.recv()).await.is_err());
    }

    #[tokio::test]
    async fn snapshot_is_never_delivered_twice() {
        let hub = Arc::new(Broadcaster::new(64, true));
        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for n in 1..=200 {
                    hub.publish(state(n));
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut subs = Vec::new();
        for _ in 0..20 {
            subs.push(hub.subscribe());
            tokio::task::yield_now().await;
        }
        publisher.await.unwrap();

        for mut sub in subs {
            let mut seen = Vec::new();
            while let Ok(Some(state)) = timeout(Duration::from_millis(20), sub.recv()).await {
                seen.push(tick(&state));
            }
            assert!(seen.windows(2).all(|w| w[0] < w[1]), "repeated or reordered: {:?}", seen);
        }
    }

    #[tokio::test]
    async fn dropped_subscription_is_pruned_on_publish() {
        let hub = Broadcaster::new(4, false);
        let sub = hub.subscribe();
        assert_eq!(hub.session_count(), 1);

        drop(sub);
        hub.publish(state(1));
        assert_eq!(hub.session_count(), 0);
        assert_eq!(hub.published(), 1);
        assert_eq!(tick(&hub.current().unwrap()), 1);
    }

    #[tokio::test]
    async fn close_all_ends_every_session() {
        let hub = Broadcaster::new(4, false);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.close_all();
        assert_eq!(hub.session_count(), 0);
        assert_eq!(a.recv().await, None);
        assert_eq!(b.recv().await, None);
    }
}
