use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Page-level events, keyed by the job URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent<'a> {
    /// A script wrote to the page log.
    Log { url: &'a str, message: &'a str },
    /// A script faulted.
    Error { url: &'a str, message: &'a str },
}

impl PageEvent<'_> {
    /// Channel name: `page:log` or `page:error`.
    pub fn channel(&self) -> &'static str {
        match self {
            PageEvent::Log { .. } => "page:log",
            PageEvent::Error { .. } => "page:error",
        }
    }

    pub fn url(&self) -> &str {
        match self {
            PageEvent::Log { url, .. } | PageEvent::Error { url, .. } => url,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            PageEvent::Log { message, .. } | PageEvent::Error { message, .. } => message,
        }
    }
}

/// Receives page events. Purely observational: it cannot influence the job.
pub trait PageObserver: Send + Sync {
    fn on_event(&self, event: &PageEvent<'_>) {
        let _ = event;
    }
}

/// Observer that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPageObserver;

impl PageObserver for TracingPageObserver {
    fn on_event(&self, event: &PageEvent<'_>) {
        match event {
            PageEvent::Log { url, message } => {
                tracing::info!(%url, %message, "page:log");
            }
            PageEvent::Error { url, message } => {
                tracing::warn!(%url, %message, "page:error");
            }
        }
    }
}

/// Handle returned by [`Observers::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscribers = Vec<(SubscriptionId, Arc<dyn PageObserver>)>;

/// Shared registry of page observers.
///
/// Clones share the same registry, so subscribing after the engine was built
/// still takes effect.
#[derive(Clone, Default)]
pub struct Observers {
    subscribers: Arc<RwLock<Subscribers>>,
    next_id: Arc<AtomicU64>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn PageObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        subscribers.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn emit(&self, event: &PageEvent<'_>) {
        // Snapshot so observers may (un)subscribe from inside a callback.
        let snapshot: Vec<Arc<dyn PageObserver>> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in snapshot {
            observer.on_event(event);
        }
    }
}
