//! Namespaced publish/subscribe registry.
//!
//! Subscriptions are kept per event name in subscription order. Publishing
//! snapshots the handler list and invokes it with no lock held, so handlers
//! may freely subscribe, unsubscribe or call back into the manager.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ferry_core::{Event, EventName, IntoEventSpec, QueueResult, Reply};

type Handler = Arc<dyn Fn(&Event) -> Reply + Send + Sync>;

struct Subscription {
    namespace: String,
    handler: Handler,
}

/// Event registry shared by the manager, its units and external observers.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<EventName, Vec<Subscription>>>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to `spec` (`"finish"`, `"finish.ui"`, an
    /// [`EventName`] or an [`EventSpec`](ferry_core::EventSpec)).
    ///
    /// Handlers may return `()`, `bool` or a [`Reply`]. An explicit `false`
    /// vetoes `beforeUpload` and `beforeUploadFile`.
    pub fn on<S, F, R>(&self, spec: S, handler: F) -> QueueResult<()>
    where
        S: IntoEventSpec,
        F: Fn(&Event) -> R + Send + Sync + 'static,
        R: Into<Reply>,
    {
        let spec = spec.into_event_spec()?;
        tracing::debug!(event = %spec, "Subscribed");
        self.write()
            .entry(spec.name)
            .or_default()
            .push(Subscription {
                namespace: spec.namespace,
                handler: Arc::new(move |event: &Event| -> Reply { handler(event).into() }),
            });
        Ok(())
    }

    /// Remove every subscription of `spec`'s event whose namespace equals
    /// `spec`'s namespace exactly. `"finish"` removes only the subscriptions
    /// made without a namespace.
    ///
    /// Returns the number of subscriptions removed.
    pub fn off<S: IntoEventSpec>(&self, spec: S) -> QueueResult<usize> {
        let spec = spec.into_event_spec()?;
        let mut subscribers = self.write();
        let Some(list) = subscribers.get_mut(&spec.name) else {
            return Ok(0);
        };
        let before = list.len();
        list.retain(|sub| sub.namespace != spec.namespace);
        let removed = before - list.len();
        if list.is_empty() {
            subscribers.remove(&spec.name);
        }
        drop(subscribers);

        tracing::debug!(event = %spec, removed, "Unsubscribed");
        Ok(removed)
    }

    /// Invoke every subscriber of `event` in subscription order.
    ///
    /// Returns the reply of the last subscriber invoked, or
    /// [`Reply::Empty`] when there are none.
    pub fn publish(&self, event: &Event) -> Reply {
        self.handlers(event.name())
            .iter()
            .fold(Reply::Empty, |_, handler| handler(event))
    }

    /// Invoke every subscriber of `event` and report whether any of them
    /// answered an explicit `false`.
    ///
    /// Later subscribers still run after a veto.
    pub fn vetoed(&self, event: &Event) -> bool {
        self.handlers(event.name())
            .iter()
            .fold(false, |vetoed, handler| handler(event).is_veto() || vetoed)
    }

    /// Number of subscriptions for `name`.
    pub fn subscriber_count(&self, name: EventName) -> usize {
        self.read().get(&name).map_or(0, Vec::len)
    }

    fn handlers(&self, name: EventName) -> Vec<Handler> {
        self.read()
            .get(&name)
            .map(|list| list.iter().map(|sub| Arc::clone(&sub.handler)).collect())
            .unwrap_or_default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<EventName, Vec<Subscription>>> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<EventName, Vec<Subscription>>> {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<EventName, usize> = self
            .read()
            .iter()
            .map(|(name, list)| (*name, list.len()))
            .collect();
        f.debug_struct("EventBus")
            .field("subscribers", &counts)
            .finish()
    }
}
