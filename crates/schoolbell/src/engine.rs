//! Reconciliation engine.
//!
//! Owns the notification feed for one session and is the only writer to it.
//! The push channel and the presentation layer request changes through the
//! methods here; the resulting view is published through a `watch` channel.
//!
//! Local mutations are applied optimistically before the REST call goes out.
//! If the call fails the engine re-fetches the snapshot instead of trying to
//! undo the change, since other events may have touched the feed meanwhile.
//!
//! The feed lock is never held across an `.await`. Every async operation
//! remembers the engine generation it started in and drops its result if
//! the engine was torn down while the request was in flight.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::NotificationApi;
use crate::feed::{Feed, FeedScope, FeedSnapshot, Received};
use crate::model::Notification;

struct EngineState {
    feed: Feed,
    generation: u64,
    alive: bool,
}

pub struct NotificationEngine {
    api: Arc<dyn NotificationApi>,
    state: Mutex<EngineState>,
    view_tx: watch::Sender<FeedSnapshot>,
}

impl NotificationEngine {
    pub fn new(api: Arc<dyn NotificationApi>, scope: FeedScope) -> Self {
        let (view_tx, _) = watch::channel(FeedSnapshot::default());
        Self {
            api,
            state: Mutex::new(EngineState {
                feed: Feed::new(scope),
                generation: 0,
                alive: true,
            }),
            view_tx,
        }
    }

    /// Subscribe to view updates. The receiver starts at the current view.
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.view_tx.subscribe()
    }

    /// Current notifications (newest arrival first) and unread count.
    pub fn snapshot(&self) -> FeedSnapshot {
        self.state.lock().feed.snapshot()
    }

    pub fn unread_count(&self) -> usize {
        self.state.lock().feed.unread()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.snapshot().notifications
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.state.lock().feed.get(id).cloned()
    }

    pub fn scope(&self) -> FeedScope {
        self.state.lock().feed.scope().clone()
    }

    pub fn is_alive(&self) -> bool {
        self.state.lock().alive
    }

    fn publish(&self, state: &EngineState) {
        self.view_tx.send_replace(state.feed.snapshot());
    }

    /// Fetch the full snapshot and merge it into the feed.
    pub async fn refresh(&self) {
        let (generation, issued_at) = {
            let mut state = self.state.lock();
            if !state.alive {
                return;
            }
            (state.generation, state.feed.begin_fetch())
        };

        let records = match self.api.list().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Failed to fetch notifications");
                return;
            }
        };

        let mut state = self.state.lock();
        if !state.alive || state.generation != generation {
            debug!("Discarding snapshot for a torn-down engine");
            return;
        }
        let fetched = records.len();
        if state.feed.apply_snapshot(records, issued_at) {
            debug!(
                fetched,
                held = state.feed.len(),
                unread = state.feed.unread(),
                "Applied notification snapshot"
            );
            self.publish(&state);
        }
    }

    /// Take in a pushed notification.
    ///
    /// Returns true when it was new to the feed; duplicates and records
    /// addressed to another tenant or user return false.
    pub fn receive(&self, notification: Notification) -> bool {
        let mut state = self.state.lock();
        if !state.alive {
            return false;
        }
        let id = notification.id.clone();
        match state.feed.receive(notification) {
            Received::Inserted => {
                debug!(notification_id = %id, unread = state.feed.unread(), "Received notification");
                self.publish(&state);
                true
            }
            Received::Merged => {
                debug!(notification_id = %id, "Collapsed duplicate notification");
                self.publish(&state);
                false
            }
            Received::Rejected => {
                warn!(notification_id = %id, "Dropping pushed notification outside the session scope");
                false
            }
        }
    }

    /// Mark one notification read.
    ///
    /// Ids that are not held, or are already read, are left alone and no
    /// request is made.
    pub async fn mark_read(&self, id: &str) {
        let generation = {
            let mut state = self.state.lock();
            if !state.alive {
                return;
            }
            if !state.feed.mark_read(id) {
                debug!(notification_id = %id, "Nothing to mark read");
                return;
            }
            self.publish(&state);
            state.generation
        };

        let result = self.api.mark_read(id).await;
        self.settle(generation, |feed| feed.settle_read(&[id], result.is_ok()));
        if let Err(e) = result {
            warn!(notification_id = %id, error = %e, "Failed to mark notification as read");
            self.resync(generation).await;
        }
    }

    /// Mark every held notification read.
    pub async fn mark_all_read(&self) {
        let (generation, flipped) = {
            let mut state = self.state.lock();
            if !state.alive {
                return;
            }
            let flipped = state.feed.mark_all_read();
            debug!(flipped = flipped.len(), "Marked all notifications read");
            self.publish(&state);
            (state.generation, flipped)
        };

        let result = self.api.mark_all_read().await;
        self.settle(generation, |feed| feed.settle_read(&flipped, result.is_ok()));
        if let Err(e) = result {
            warn!(error = %e, "Failed to mark all notifications as read");
            self.resync(generation).await;
        }
    }

    /// Delete one notification.
    pub async fn delete(&self, id: &str) {
        let generation = {
            let mut state = self.state.lock();
            if !state.alive {
                return;
            }
            let Some(removed) = state.feed.remove(id) else {
                debug!(notification_id = %id, "Nothing to delete");
                return;
            };
            debug!(notification_id = %id, was_unread = !removed.read, "Deleted notification");
            self.publish(&state);
            state.generation
        };

        let result = self.api.delete(id).await;
        self.settle(generation, |feed| feed.settle_delete(id, result.is_ok()));
        if let Err(e) = result {
            warn!(notification_id = %id, error = %e, "Failed to delete notification");
            self.resync(generation).await;
        }
    }

    /// Record the server's answer to an optimistic write.
    fn settle(&self, generation: u64, apply: impl FnOnce(&mut Feed)) {
        let mut state = self.state.lock();
        if state.alive && state.generation == generation {
            apply(&mut state.feed);
        }
    }

    /// Re-fetch after a failed mutation, unless the engine moved on.
    async fn resync(&self, generation: u64) {
        {
            let state = self.state.lock();
            if !state.alive || state.generation != generation {
                return;
            }
        }
        info!("Resynchronizing notifications after a failed update");
        self.refresh().await;
    }

    /// Drop the feed and stop accepting work.
    ///
    /// In-flight requests still complete but their results are discarded.
    pub fn teardown(&self) {
        let mut state = self.state.lock();
        if !state.alive {
            return;
        }
        state.alive = false;
        state.generation += 1;
        state.feed.clear();
        self.publish(&state);
        debug!("Notification engine torn down");
    }
}

impl std::fmt::Debug for NotificationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("NotificationEngine")
            .field("scope", state.feed.scope())
            .field("held", &state.feed.len())
            .field("unread", &state.feed.unread())
            .field("alive", &state.alive)
            .finish()
    }
}
