//! Event feed abstraction.
//!
//! The gateway owns the real feed; the dispatcher and the collector manager
//! only subscribe to it through [`EventSource`]. Host code that wants the
//! client alongside each event registers [`EventHandlers`] on the client.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};

use crate::client::Client;
use crate::types::{Event, EventKind};

pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

pub trait EventSource: Send + Sync {
    /// Call `listener` for every future event of `kind`.
    fn listen(&self, kind: EventKind, listener: Listener);
}

/// In-process [`EventSource`] that fans events out to listeners in
/// registration order.
#[derive(Default)]
pub struct EventHub {
    listeners: RwLock<Vec<(EventKind, Listener)>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to its listeners. Returns how many were called.
    ///
    /// Listeners may subscribe further listeners while running; those see the
    /// next event, not this one.
    pub fn emit(&self, event: &Event) -> usize {
        let kind = event.kind();
        let targets: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, l)| l.clone())
            .collect();
        for listener in &targets {
            listener(event);
        }
        targets.len()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.read().iter().filter(|(k, _)| *k == kind).count()
    }
}

impl EventSource for EventHub {
    fn listen(&self, kind: EventKind, listener: Listener) {
        self.listeners.write().push((kind, listener));
    }
}

pub type EventHandlerFn =
    Arc<dyn Fn(Arc<Client>, Event) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Event handlers registered together under one origin, e.g. the module or
/// plugin they come from.
///
/// Adding a group whose origin is already registered replaces the old group,
/// so a plugin can be swapped at runtime without stacking duplicate handlers.
pub struct EventHandlers {
    origin: String,
    handlers: Vec<(EventKind, EventHandlerFn)>,
}

impl EventHandlers {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            handlers: Vec::new(),
        }
    }

    pub fn on<F, Fut>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(Arc<Client>, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.handlers.push((
            kind,
            Arc::new(
                move |client: Arc<Client>, event: Event| -> BoxFuture<'static, anyhow::Result<()>> {
                    Box::pin(handler(client, event))
                },
            ),
        ));
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

struct Bound {
    origin: String,
    kind: EventKind,
    handler: EventHandlerFn,
}

/// Registered handler groups plus the kinds already subscribed on the source.
#[derive(Default)]
pub(crate) struct HandlerTable {
    bound: RwLock<Vec<Bound>>,
    listening: Mutex<HashSet<EventKind>>,
}

impl HandlerTable {
    /// Swap in `group`, dropping any handlers with the same origin. Returns
    /// how many were dropped and the kinds that have no source listener yet.
    pub(crate) fn replace(&self, group: EventHandlers) -> (usize, Vec<EventKind>) {
        let mut bound = self.bound.write();
        let before = bound.len();
        bound.retain(|b| b.origin != group.origin);
        let removed = before - bound.len();

        let mut listening = self.listening.lock();
        let mut fresh = Vec::new();
        for (kind, handler) in group.handlers {
            if listening.insert(kind) {
                fresh.push(kind);
            }
            bound.push(Bound {
                origin: group.origin.clone(),
                kind,
                handler,
            });
        }
        (removed, fresh)
    }

    pub(crate) fn remove(&self, origin: &str) -> usize {
        let mut bound = self.bound.write();
        let before = bound.len();
        bound.retain(|b| b.origin != origin);
        before - bound.len()
    }

    pub(crate) fn handlers_for(&self, kind: EventKind) -> Vec<EventHandlerFn> {
        self.bound
            .read()
            .iter()
            .filter(|b| b.kind == kind)
            .map(|b| b.handler.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::types::{Message, User};

    fn message() -> Event {
        Event::MessageCreate(Message {
            id: "1".into(),
            channel_id: "c".into(),
            guild_id: None,
            author: User {
                id: "u".into(),
                username: "u".into(),
            },
            member: None,
            content: "hi".into(),
        })
    }

    #[test]
    fn emit_reaches_only_matching_kind() {
        let hub = EventHub::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        hub.listen(
            EventKind::MessageCreate,
            Arc::new(move |_: &Event| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        hub.listen(EventKind::ReactionAdd, Arc::new(|_: &Event| panic!("wrong kind")));

        assert_eq!(hub.emit(&message()), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(hub.listener_count(EventKind::ReactionAdd), 1);
    }

    fn noop(origin: &str, kinds: &[EventKind]) -> EventHandlers {
        kinds.iter().fold(EventHandlers::new(origin), |group, kind| {
            group.on(*kind, |_, _| async { Ok(()) })
        })
    }

    #[test]
    fn handler_groups_replace_by_origin() {
        let table = HandlerTable::default();
        let (removed, fresh) = table.replace(noop("a", &[EventKind::MessageCreate]));
        assert_eq!((removed, fresh), (0, vec![EventKind::MessageCreate]));

        let (removed, fresh) = table.replace(noop(
            "a",
            &[EventKind::MessageCreate, EventKind::ReactionAdd],
        ));
        assert_eq!((removed, fresh), (1, vec![EventKind::ReactionAdd]));

        table.replace(noop("b", &[EventKind::MessageCreate]));
        assert_eq!(table.handlers_for(EventKind::MessageCreate).len(), 2);
        assert_eq!(table.remove("a"), 2);
        assert_eq!(table.handlers_for(EventKind::MessageCreate).len(), 1);
        assert!(table.handlers_for(EventKind::ReactionAdd).is_empty());
    }

    #[test]
    fn listener_may_subscribe_during_emit() {
        let hub = Arc::new(EventHub::new());
        let inner = hub.clone();
        hub.listen(
            EventKind::MessageCreate,
            Arc::new(move |_: &Event| {
                inner.listen(EventKind::MessageCreate, Arc::new(|_: &Event| {}));
            }),
        );

        assert_eq!(hub.emit(&message()), 1);
        assert_eq!(hub.listener_count(EventKind::MessageCreate), 2);
    }
}
