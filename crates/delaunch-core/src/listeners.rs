use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Inner<T: ?Sized> {
    next_id: u64,
    listeners: Arc<Vec<(ListenerId, Arc<T>)>>,
    dispatch_depth: usize,
}

/// Ordered set of observers that may be mutated from inside a dispatch.
///
/// Dispatch iterates a shared snapshot of the list. Adding or removing while
/// a dispatch is running copies the list first, so the running dispatch still
/// sees the observers it started with and the change applies to the next one.
pub struct ListenerSet<T: ?Sized> {
    inner: Mutex<Inner<T>>,
}

impl<T: ?Sized> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 0,
                listeners: Arc::new(Vec::new()),
                dispatch_depth: 0,
            }),
        }
    }
}

struct DepthGuard<'a, T: ?Sized> {
    set: &'a ListenerSet<T>,
}

impl<T: ?Sized> Drop for DepthGuard<'_, T> {
    fn drop(&mut self) {
        let mut inner = self.set.lock();
        inner.dispatch_depth = inner.dispatch_depth.saturating_sub(1);
    }
}

impl<T: ?Sized> ListenerSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, listener: Arc<T>) -> ListenerId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = ListenerId(inner.next_id);
        Arc::make_mut(&mut inner.listeners).push((id, listener));
        id
    }

    /// Returns false if the listener was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut inner = self.lock();
        let Some(pos) = inner.listeners.iter().position(|(l, _)| *l == id) else {
            return false;
        };
        Arc::make_mut(&mut inner.listeners).remove(pos);
        true
    }

    pub fn len(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of dispatches currently running, nested ones included.
    pub fn dispatch_depth(&self) -> usize {
        self.lock().dispatch_depth
    }

    /// Call `f` for each listener in registration order. The lock is not held
    /// while listeners run.
    pub fn dispatch(&self, mut f: impl FnMut(&T)) {
        let snapshot = {
            let mut inner = self.lock();
            inner.dispatch_depth += 1;
            Arc::clone(&inner.listeners)
        };
        let _guard = DepthGuard { set: self };
        for (_, listener) in snapshot.iter() {
            f(listener);
        }
    }
}
