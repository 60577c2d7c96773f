//! Resources released when a panel goes away.

/// Something that holds a resource until disposed.
///
/// Implementations must tolerate being disposed more than once.
pub trait Disposable: Send {
    fn dispose(&mut self);
}

/// A disposable backed by a one-shot closure. Disposing again is a no-op.
pub struct FnDisposable {
    on_dispose: Option<Box<dyn FnOnce() + Send>>,
}

impl FnDisposable {
    pub fn new(on_dispose: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_dispose: Some(Box::new(on_dispose)),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.on_dispose.is_none()
    }
}

impl Disposable for FnDisposable {
    fn dispose(&mut self) {
        if let Some(f) = self.on_dispose.take() {
            f();
        }
    }
}

/// Ordered registrations tied to one owner's lifetime.
///
/// [`DisposableStore::dispose_all`] releases every registration exactly once,
/// newest first.
#[derive(Default)]
pub struct DisposableStore {
    items: Vec<Box<dyn Disposable>>,
}

impl DisposableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: Box<dyn Disposable>) {
        self.items.push(item);
    }

    /// Release everything in reverse registration order. Calling it again is a no-op.
    pub fn dispose_all(&mut self) {
        while let Some(mut item) = self.items.pop() {
            item.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recording(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Box<dyn Disposable> {
        let log = log.clone();
        Box::new(FnDisposable::new(move || log.lock().push(name)))
    }

    #[test]
    fn releases_in_reverse_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut store = DisposableStore::new();
        store.push(recording("A", &log));
        store.push(recording("B", &log));
        store.push(recording("C", &log));

        store.dispose_all();
        assert_eq!(*log.lock(), vec!["C", "B", "A"]);
    }

    #[test]
    fn dispose_all_twice_releases_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut store = DisposableStore::new();
        store.push(recording("A", &log));

        store.dispose_all();
        store.dispose_all();
        assert_eq!(*log.lock(), vec!["A"]);
    }

    #[test]
    fn fn_disposable_runs_once() {
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        let mut d = FnDisposable::new(move || *c.lock() += 1);
        assert!(!d.is_disposed());
        d.dispose();
        d.dispose();
        assert!(d.is_disposed());
        assert_eq!(*count.lock(), 1);
    }
}
