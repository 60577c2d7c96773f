use parking_lot::Mutex;
use std::sync::{Arc, Weak};

use crate::disposable::{Disposable, FnDisposable};

/// Callback invoked when an event fires.
pub type Listener<T> = Arc<dyn Fn(T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    listeners: Vec<(u64, Listener<T>)>,
}

/// Listener list for one kind of surface event.
///
/// Subscribing returns a [`Disposable`] that unregisters the listener.
/// Listeners run outside the registry lock, so a listener may subscribe,
/// unsubscribe or fire again without deadlocking.
pub struct EventEmitter<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 1,
                listeners: Vec::new(),
            })),
        }
    }
}

impl<T: Clone + Send + 'static> EventEmitter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Listener<T>) -> Box<dyn Disposable> {
        let id = {
            let mut reg = self.registry.lock();
            let id = reg.next_id;
            reg.next_id += 1;
            reg.listeners.push((id, listener));
            id
        };
        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Box::new(FnDisposable::new(move || {
            if let Some(registry) = weak.upgrade() {
                registry.lock().listeners.retain(|(lid, _)| *lid != id);
            }
        }))
    }

    /// Deliver `value` to every listener registered at the time of the call.
    pub fn fire(&self, value: T) {
        let snapshot: Vec<Listener<T>> = self
            .registry
            .lock()
            .listeners
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in snapshot {
            listener(value.clone());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }
}
