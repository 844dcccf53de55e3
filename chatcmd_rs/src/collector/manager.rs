//! Shared listeners and the active collector set.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Collected, CollectorOptions, Payload};
use crate::events::EventSource;
use crate::types::{Event, EventKind, Message, Reaction};

/// Type-erased collector as stored in the active set.
trait Pending: Send {
    /// Offer one firing. Returns `true` once the collector has resolved.
    fn offer(&mut self, event: &Event) -> bool;
    /// Resolve with whatever has been accumulated.
    fn expire(&mut self);
}

struct Collector<T: Payload> {
    options: CollectorOptions<T>,
    matches: Vec<T>,
    done: Option<oneshot::Sender<Collected<T>>>,
    stream: Option<mpsc::UnboundedSender<T>>,
    cancel: CancellationToken,
}

impl<T: Payload> Collector<T> {
    fn resolve(&mut self) {
        debug_assert!(!self.cancel.is_cancelled(), "collector resolved twice");
        if let Some(done) = self.done.take() {
            let matches = std::mem::take(&mut self.matches);
            // The waiter may have gone away; nothing to do then.
            let _ = done.send(Collected::from_matches(self.options.limit, matches));
        }
        self.stream = None;
        self.cancel.cancel();
    }
}

impl<T: Payload> Pending for Collector<T> {
    fn offer(&mut self, event: &Event) -> bool {
        let Some(payload) = T::from_event(event) else {
            return false;
        };
        if !(self.options.filter)(&payload) {
            return false;
        }
        if let Some(stream) = &self.stream {
            let _ = stream.send(payload.clone());
        }
        self.matches.push(payload);
        if self.matches.len() >= self.options.limit {
            self.resolve();
            return true;
        }
        false
    }

    fn expire(&mut self) {
        self.resolve();
    }
}

struct Entry {
    id: u64,
    kind: EventKind,
    collector: Box<dyn Pending>,
}

#[derive(Default)]
struct State {
    active: Vec<Entry>,
    listening: HashSet<EventKind>,
    next_id: u64,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
}

impl Shared {
    /// Offer `event` to every active collector of its kind, oldest first.
    fn dispatch(&self, event: &Event) {
        let kind = event.kind();
        let mut state = self.state.lock();
        state.active.retain_mut(|entry| {
            if entry.kind != kind {
                return true;
            }
            let finished = entry.collector.offer(event);
            if finished {
                debug!(id = entry.id, %kind, "collector reached its limit");
            }
            !finished
        });
    }

    /// End collector `id` with its partial result. No-op once it has resolved.
    fn expire(&self, id: u64, reason: &'static str) -> bool {
        let mut state = self.state.lock();
        let Some(pos) = state.active.iter().position(|e| e.id == id) else {
            return false;
        };
        let mut entry = state.active.remove(pos);
        drop(state);
        entry.collector.expire();
        debug!(id, kind = %entry.kind, reason, "collector ended");
        true
    }
}

/// Ends the collector if the waiting future is dropped before it resolves.
struct ExpireOnDrop<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for ExpireOnDrop<'_> {
    fn drop(&mut self) {
        self.shared.expire(self.id, "abandoned");
    }
}

/// Owns the active collectors and one listener per event kind.
///
/// Filters run while the active set is locked and must not start collectors
/// themselves.
pub struct CollectorManager {
    shared: Arc<Shared>,
    source: Arc<dyn EventSource>,
}

impl CollectorManager {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            source,
        }
    }

    /// Wait for `options.limit` payloads of type `T`, or the timeout.
    pub async fn collect<T: Payload>(&self, options: CollectorOptions<T>) -> Collected<T> {
        let timeout = options.timeout;
        let limit = options.limit;
        let (id, done, cancel) = self.start(options, None);
        let _guard = ExpireOnDrop {
            shared: &self.shared,
            id,
        };

        if !timeout.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    self.shared.expire(id, "timed out");
                }
            }
        }
        done.await
            .unwrap_or_else(|_| Collected::from_matches(limit, Vec::new()))
    }

    /// Like [`collect`](Self::collect), but every match is also handed out as
    /// it arrives.
    pub fn stream<T: Payload>(&self, options: CollectorOptions<T>) -> CollectorStream<T> {
        let timeout = options.timeout;
        let limit = options.limit;
        let (tx, rx) = mpsc::unbounded_channel();
        let (id, done, cancel) = self.start(options, Some(tx));

        if !timeout.is_zero() {
            let shared = Arc::downgrade(&self.shared);
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => {
                        if let Some(shared) = shared.upgrade() {
                            shared.expire(id, "timed out");
                        }
                    }
                }
            });
        }

        CollectorStream {
            id,
            limit,
            shared: Arc::downgrade(&self.shared),
            received: rx,
            done: Some(done),
        }
    }

    pub async fn await_messages(&self, options: CollectorOptions<Message>) -> Collected<Message> {
        self.collect(options).await
    }

    pub async fn await_reactions(
        &self,
        options: CollectorOptions<Reaction>,
    ) -> Collected<Reaction> {
        self.collect(options).await
    }

    pub fn stream_messages(&self, options: CollectorOptions<Message>) -> CollectorStream<Message> {
        self.stream(options)
    }

    pub fn stream_reactions(
        &self,
        options: CollectorOptions<Reaction>,
    ) -> CollectorStream<Reaction> {
        self.stream(options)
    }

    /// Collectors currently waiting on `kind`.
    pub fn active_count(&self, kind: EventKind) -> usize {
        self.shared
            .state
            .lock()
            .active
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    fn start<T: Payload>(
        &self,
        options: CollectorOptions<T>,
        stream: Option<mpsc::UnboundedSender<T>>,
    ) -> (u64, oneshot::Receiver<Collected<T>>, CancellationToken) {
        let (done_tx, done_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let collector = Collector {
            options,
            matches: Vec::new(),
            done: Some(done_tx),
            stream,
            cancel: cancel.clone(),
        };

        let (id, first_for_kind) = {
            let mut state = self.shared.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.active.push(Entry {
                id,
                kind: T::KIND,
                collector: Box::new(collector),
            });
            (id, state.listening.insert(T::KIND))
        };

        if first_for_kind {
            self.listen(T::KIND);
        }
        debug!(id, kind = %T::KIND, "collector started");
        (id, done_rx, cancel)
    }

    fn listen(&self, kind: EventKind) {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        self.source.listen(
            kind,
            Arc::new(move |event: &Event| {
                if let Some(shared) = shared.upgrade() {
                    shared.dispatch(event);
                }
            }),
        );
        debug!(%kind, "collector listener registered");
    }
}

/// Continuous collector. Yields each match as it arrives; ends when the limit
/// is reached, the timeout fires, or [`stop`](Self::stop) is called.
pub struct CollectorStream<T> {
    id: u64,
    limit: usize,
    shared: Weak<Shared>,
    received: mpsc::UnboundedReceiver<T>,
    done: Option<oneshot::Receiver<Collected<T>>>,
}

impl<T> CollectorStream<T> {
    /// Next match, or `None` once the collector has ended and every match
    /// has been handed out.
    pub async fn next(&mut self) -> Option<T> {
        self.received.recv().await
    }

    /// End the collector now, keeping what it has matched.
    pub fn stop(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.expire(self.id, "stopped");
        }
    }

    /// Wait for the collector to end and return everything it matched.
    ///
    /// With a zero timeout this only returns once the limit is reached.
    pub async fn finish(mut self) -> Collected<T> {
        let limit = self.limit;
        match self.done.take() {
            Some(done) => done
                .await
                .unwrap_or_else(|_| Collected::from_matches(limit, Vec::new())),
            None => Collected::from_matches(limit, Vec::new()),
        }
    }
}

impl<T> Stream for CollectorStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.received.poll_recv(cx)
    }
}

impl<T> Drop for CollectorStream<T> {
    fn drop(&mut self) {
        if self.done.is_some() {
            self.stop();
        }
    }
}
