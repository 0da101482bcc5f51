//! Event recorder.

use std::sync::{Arc, Mutex};

use ferry_queue::{Event, EventBus, EventName};

/// Records every event published on a bus, in order.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    /// Subscribe to every recognised event on `bus`.
    pub fn attach(bus: &EventBus) -> Self {
        let log = Self::default();
        for name in EventName::ALL {
            let events = Arc::clone(&log.events);
            bus.on(name, move |event: &Event| {
                events.lock().unwrap().push(event.clone());
            })
            .unwrap();
        }
        log
    }

    pub fn all(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<EventName> {
        self.all().iter().map(Event::name).collect()
    }

    pub fn named(&self, name: EventName) -> Vec<Event> {
        self.all().into_iter().filter(|e| e.name() == name).collect()
    }

    pub fn count(&self, name: EventName) -> usize {
        self.named(name).len()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}
