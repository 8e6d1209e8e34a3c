use std::sync::{Arc, Mutex, Weak};

use dispatch_core::ingestor::LiveEvent;

/// Returned by `Channel::register`; dropping it unregisters the callback.
/// The bus itself holds only a `Weak` reference, so it can never keep an
/// observer from being dropped.
#[must_use]
pub struct Registration {
    _guard: Arc<()>,
}

struct Slot<T> {
    alive: Weak<()>,
    callback: Box<dyn Fn(&T) + Send + Sync>,
}

/// A single fan-out channel: any number of observers may register, and
/// `notify` invokes every live one synchronously, in registration order.
pub struct Channel<T> {
    slots: Mutex<Vec<Slot<T>>>,
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self { slots: Mutex::new(Vec::new()) }
    }
}

impl<T> Channel<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Registration {
        let guard = Arc::new(());
        let alive = Arc::downgrade(&guard);
        self.slots.lock().unwrap().push(Slot { alive, callback: Box::new(callback) });
        Registration { _guard: guard }
    }

    pub fn notify(&self, value: &T) {
        let mut slots = self.slots.lock().unwrap();
        slots.retain(|slot| slot.alive.upgrade().is_some());
        for slot in slots.iter() {
            (slot.callback)(value);
        }
    }
}

/// The three channels external views subscribe to, per the downstream
/// interface: topology/config changes, rebuild-or-reprognosis completion,
/// and live-event pass-through for tickers.
#[derive(Default)]
pub struct ObserverBus {
    pub anlage_changed: Channel<()>,
    pub plan_changed: Channel<()>,
    pub event_received: Channel<LiveEvent>,
}

impl ObserverBus {
    pub fn new() -> Self {
        Self::default()
    }
}
