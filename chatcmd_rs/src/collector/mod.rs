//! Bounded waits on future events.
//!
//! A collector watches one event kind for payloads passing its filter and ends
//! when it has `limit` of them or its timeout fires, whichever comes first.
//! See [`CollectorManager`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::types::{Event, EventKind, Message, Reaction};

pub mod manager;

pub use manager::{CollectorManager, CollectorStream};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_LIMIT: usize = 1;

pub type Filter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Event payload a collector can wait for.
pub trait Payload: Clone + Send + 'static {
    const KIND: EventKind;

    fn from_event(event: &Event) -> Option<Self>;
}

impl Payload for Message {
    const KIND: EventKind = EventKind::MessageCreate;

    fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::MessageCreate(message) => Some(message.clone()),
            _ => None,
        }
    }
}

impl Payload for Reaction {
    const KIND: EventKind = EventKind::ReactionAdd;

    fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::ReactionAdd(reaction) => Some(reaction.clone()),
            _ => None,
        }
    }
}

pub struct CollectorOptions<T> {
    pub filter: Filter<T>,
    /// `Duration::ZERO` disables the timer
    pub timeout: Duration,
    pub limit: usize,
}

impl<T> CollectorOptions<T> {
    pub fn new<F>(filter: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            filter: Arc::new(filter),
            timeout: DEFAULT_TIMEOUT,
            limit: DEFAULT_LIMIT,
        }
    }

    /// Accept every payload.
    pub fn any() -> Self {
        Self::new(|_| true)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Clamped to at least one.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }
}

impl<T> Clone for CollectorOptions<T> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            timeout: self.timeout,
            limit: self.limit,
        }
    }
}

impl<T> fmt::Debug for CollectorOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorOptions")
            .field("timeout", &self.timeout)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

/// Terminal outcome of a collector. Timing out is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Collected<T> {
    /// `limit == 1`: the match, or `None` when the timer won
    Single(Option<T>),
    /// `limit > 1`: every match in arrival order, possibly fewer than `limit`
    Batch(Vec<T>),
}

impl<T> Collected<T> {
    pub(crate) fn from_matches(limit: usize, mut matches: Vec<T>) -> Self {
        if limit == 1 {
            Collected::Single(matches.pop())
        } else {
            Collected::Batch(matches)
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Collected::Single(one) => one.into_iter().collect(),
            Collected::Batch(many) => many,
        }
    }

    pub fn first(&self) -> Option<&T> {
        match self {
            Collected::Single(one) => one.as_ref(),
            Collected::Batch(many) => many.first(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Collected::Single(one) => usize::from(one.is_some()),
            Collected::Batch(many) => many.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
