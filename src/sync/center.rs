//! Notification center: keeps a `NotificationMirror` consistent with fetch
//! results, live pushes and local mark-read actions.
//!
//! - Optimistic mutations are rolled back when the server call fails.
//! - Fetch results never un-read an item whose mark-read is in flight, or was
//!   confirmed after the fetch was issued.
//! - A failed mutation never reverts a read the server reported after the
//!   optimistic update was made.
//! - Responses older than the last applied fetch are dropped.
//! - After `teardown()` nothing mutates the mirror any more.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::mirror::{NotificationMirror, PushOutcome, ReadSnapshot};
use crate::api::NotificationApi;
use crate::errors::Result;
use crate::live::{LiveEvent, LiveSubscription};
use crate::models::Notification;

/// Renderable copy of the center's state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MirrorView {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
    /// Set when the last sync or mutation failed; cleared by the next success.
    pub sync_error: Option<String>,
}

#[derive(Default)]
struct State {
    mirror: NotificationMirror,
    /// In-flight optimistic reads, counted per id (mark-read and mark-all can overlap).
    pending: HashMap<String, usize>,
    /// Confirmed reads keyed by id, with the newest fetch sequence issued at
    /// confirmation time. Fetches with a sequence at or below it may predate the write.
    confirmed: HashMap<String, u64>,
    /// Server-reported reads keyed by id, stamped with `read_epoch` when seen.
    read_marks: HashMap<String, u64>,
    read_epoch: u64,
    last_applied_fetch: u64,
    sync_error: Option<String>,
}

impl State {
    fn add_pending(&mut self, snapshot: &ReadSnapshot) {
        for id in snapshot.ids() {
            *self.pending.entry(id.clone()).or_insert(0) += 1;
        }
    }

    fn release_pending(&mut self, snapshot: &ReadSnapshot) {
        for id in snapshot.ids() {
            if let Some(count) = self.pending.get_mut(id) {
                *count -= 1;
                if *count == 0 {
                    self.pending.remove(id);
                }
            }
        }
    }

    fn note_read(&mut self, id: &str) {
        self.read_epoch += 1;
        self.read_marks.insert(id.to_string(), self.read_epoch);
    }

    /// Ids of `snapshot` that may go back to unread: no other mutation still
    /// covers them and the server has not reported them read since `taken_at`.
    fn revertible(&self, snapshot: &ReadSnapshot, taken_at: u64) -> ReadSnapshot {
        snapshot.without(|id| {
            self.pending.contains_key(id)
                || self.read_marks.get(id).is_some_and(|&at| at > taken_at)
        })
    }

    fn view(&self) -> MirrorView {
        MirrorView {
            notifications: self.mirror.notifications().to_vec(),
            unread_count: self.mirror.unread_count(),
            sync_error: self.sync_error.clone(),
        }
    }
}

pub struct NotificationCenter<A> {
    api: A,
    state: Mutex<State>,
    alive: AtomicBool,
    fetch_seq: AtomicU64,
    view: watch::Sender<MirrorView>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    resync_on_reconnect: bool,
}

impl<A: NotificationApi> NotificationCenter<A> {
    pub fn new(api: A) -> Self {
        let (view, _) = watch::channel(MirrorView::default());
        Self {
            api,
            state: Mutex::new(State::default()),
            alive: AtomicBool::new(true),
            fetch_seq: AtomicU64::new(0),
            view,
            tasks: Mutex::new(Vec::new()),
            resync_on_reconnect: true,
        }
    }

    /// Whether a live-channel reconnect triggers a full re-fetch.
    pub fn with_resync_on_reconnect(mut self, enabled: bool) -> Self {
        self.resync_on_reconnect = enabled;
        self
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> MirrorView {
        self.view.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn watch(&self) -> watch::Receiver<MirrorView> {
        self.view.subscribe()
    }

    /// Run `f` against the state and publish the new view. Returns `None`
    /// without touching anything once the center is torn down.
    fn update<R>(&self, f: impl FnOnce(&mut State) -> R) -> Option<R> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !self.is_alive() {
            return None;
        }
        let out = f(&mut state);
        self.view.send_replace(state.view());
        Some(out)
    }

    /// Fetch the authoritative list and replace the mirror with it.
    pub async fn refresh(&self) -> Result<()> {
        if !self.is_alive() {
            return Ok(());
        }
        let seq = self.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;

        match self.api.fetch_all().await {
            Ok(mut items) => {
                let applied = self.update(|state| {
                    if seq <= state.last_applied_fetch {
                        return false;
                    }
                    state.last_applied_fetch = seq;
                    for item in items.iter().filter(|n| n.is_read) {
                        state.note_read(&item.id);
                    }
                    for item in items.iter_mut().filter(|n| !n.is_read) {
                        let in_flight = state.pending.contains_key(&item.id);
                        let confirmed_later = state
                            .confirmed
                            .get(&item.id)
                            .is_some_and(|&at| seq <= at);
                        if in_flight || confirmed_later {
                            item.is_read = true;
                        }
                    }
                    state.confirmed.retain(|_, at| *at >= seq);
                    state.mirror.replace_all(items);
                    let mirror = &state.mirror;
                    state.read_marks.retain(|id, _| mirror.get(id).is_some());
                    state.sync_error = None;
                    true
                });
                match applied {
                    Some(true) => debug!(seq, "notifications refreshed"),
                    Some(false) => debug!(seq, "discarding stale notification fetch"),
                    None => debug!(seq, "fetch completed after teardown, ignored"),
                }
                Ok(())
            }
            Err(e) => {
                warn!(seq, error = %e, "notification fetch failed");
                self.update(|state| {
                    // superseded by a newer successful fetch
                    if seq > state.last_applied_fetch {
                        state.sync_error = Some(e.summary().to_string());
                    }
                });
                Err(e)
            }
        }
    }

    /// Manual retry after a failed sync.
    pub async fn retry(&self) -> Result<()> {
        self.refresh().await
    }

    /// Merge one pushed notification.
    pub fn apply_push(&self, notification: Notification) -> Option<PushOutcome> {
        let id = notification.id.clone();
        let outcome = self.update(|state| state.mirror.apply_push(notification));
        match outcome {
            Some(o) => debug!(notification_id = %id, outcome = ?o, "applied live notification"),
            None => debug!(notification_id = %id, "push after teardown, ignored"),
        }
        outcome
    }

    pub async fn handle_event(&self, event: LiveEvent) {
        match event {
            LiveEvent::Notification(n) => {
                self.apply_push(n);
            }
            LiveEvent::Connected { reconnect: true } if self.resync_on_reconnect => {
                info!("live channel reconnected, resyncing notifications");
                let _ = self.refresh().await;
            }
            LiveEvent::Connected { .. } => {}
            LiveEvent::Lagged { skipped } => {
                warn!(skipped, "missed live notifications, resyncing");
                let _ = self.refresh().await;
            }
            LiveEvent::Disconnected => debug!("live channel disconnected"),
        }
    }

    /// Mark one notification read, optimistically.
    pub async fn mark_read(&self, id: &str) -> Result<()> {
        let Some((snapshot, taken_at)) = self.update(|state| {
            let snapshot = state.mirror.mark_read(id).unwrap_or_default();
            state.add_pending(&snapshot);
            (snapshot, state.read_epoch)
        }) else {
            return Ok(());
        };

        let result = self.api.mark_read(id).await;
        let confirmed_at = self.fetch_seq.load(Ordering::SeqCst);

        self.update(|state| {
            state.release_pending(&snapshot);
            match &result {
                Ok(confirmed) => {
                    state.mirror.apply_confirmed(confirmed.clone());
                    state.confirmed.insert(id.to_string(), confirmed_at);
                    state.note_read(id);
                    state.sync_error = None;
                }
                Err(e) => {
                    let revert = state.revertible(&snapshot, taken_at);
                    state.mirror.rollback(&revert);
                    state.sync_error = Some(e.summary().to_string());
                }
            }
        });

        result.map(|_| ()).map_err(|e| {
            warn!(notification_id = %id, error = %e, "mark-read failed, rolled back");
            e
        })
    }

    /// Mark every notification read, optimistically.
    pub async fn mark_all_read(&self) -> Result<()> {
        let Some((snapshot, taken_at)) = self.update(|state| {
            let snapshot = state.mirror.mark_all_read();
            state.add_pending(&snapshot);
            (snapshot, state.read_epoch)
        }) else {
            return Ok(());
        };

        let result = self.api.mark_all_read().await;
        let confirmed_at = self.fetch_seq.load(Ordering::SeqCst);

        self.update(|state| {
            state.release_pending(&snapshot);
            match &result {
                Ok(_) => {
                    // the server marked everything, including ids flipped by
                    // other mutations still in flight
                    let ids: Vec<String> = state
                        .mirror
                        .notifications()
                        .iter()
                        .map(|n| n.id.clone())
                        .collect();
                    for id in ids {
                        state.confirmed.insert(id.clone(), confirmed_at);
                        state.note_read(&id);
                    }
                    state.sync_error = None;
                }
                Err(e) => {
                    let revert = state.revertible(&snapshot, taken_at);
                    state.mirror.rollback(&revert);
                    state.sync_error = Some(e.summary().to_string());
                }
            }
        });

        match result {
            Ok(ack) => {
                debug!(marked = snapshot.ids().len(), message = %ack.message, "marked all read");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "mark-all-read failed, rolled back");
                Err(e)
            }
        }
    }

    /// Stop background tasks and freeze the mirror.
    pub fn teardown(&self) {
        {
            let _state = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            self.alive.store(false, Ordering::SeqCst);
        }
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        debug!("notification center torn down");
    }

    fn track(&self, handle: JoinHandle<()>) {
        match self.tasks.lock() {
            Ok(mut tasks) if self.is_alive() => tasks.push(handle),
            _ => handle.abort(),
        }
    }
}

impl<A: NotificationApi + 'static> NotificationCenter<A> {
    /// Re-fetch every `interval` until teardown.
    pub fn spawn_polling(self: &Arc<Self>, interval: Duration) {
        let center = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(center) = live_center(&center) else {
                    break;
                };
                let _ = center.refresh().await;
            }
        });
        self.track(handle);
    }

    /// Apply live events from `subscription` until teardown or channel close.
    pub fn attach_live(self: &Arc<Self>, mut subscription: LiveSubscription) {
        let center = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                let Some(center) = live_center(&center) else {
                    break;
                };
                center.handle_event(event).await;
            }
            debug!("live listener detached");
        });
        self.track(handle);
    }
}

/// Background tasks hold the center weakly so dropping the last handle stops them.
fn live_center<A: NotificationApi>(
    center: &Weak<NotificationCenter<A>>,
) -> Option<Arc<NotificationCenter<A>>> {
    center.upgrade().filter(|c| c.is_alive())
}

impl<A> Drop for NotificationCenter<A> {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}
