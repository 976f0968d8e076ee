//! Lazily computed values derived from several preferences
//!
//! A [`ResettableLazy`] computes its value on first access and keeps it
//! until reset. Stores reset every derived value they handed out when
//! destroyed.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

pub(crate) trait Resettable: Send + Sync {
    fn reset(&self);
}

struct LazyInner<T> {
    create: Box<dyn Fn() -> T + Send + Sync>,
    value: Mutex<Option<Arc<T>>>,
}

impl<T: Send + Sync> Resettable for LazyInner<T> {
    fn reset(&self) {
        self.value.lock().take();
    }
}

/// Value computed on first access and recomputed after [`reset`](Self::reset)
pub struct ResettableLazy<T> {
    inner: Arc<LazyInner<T>>,
}

impl<T: Send + Sync + 'static> ResettableLazy<T> {
    /// Create with the computation `create`
    pub fn new(create: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(LazyInner {
                create: Box::new(create),
                value: Mutex::new(None),
            }),
        }
    }

    /// Current value, computing it if needed
    #[must_use]
    pub fn get(&self) -> Arc<T> {
        let mut value = self.inner.value.lock();
        Arc::clone(value.get_or_insert_with(|| Arc::new((self.inner.create)())))
    }

    /// Drop the computed value
    pub fn reset(&self) {
        self.inner.reset();
    }

    /// Whether a value is currently held
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.value.lock().is_some()
    }

    pub(crate) fn as_resettable(&self) -> std::sync::Weak<dyn Resettable> {
        let inner: Arc<dyn Resettable> = self.inner.clone();
        Arc::downgrade(&inner)
    }
}

impl<T> Clone for ResettableLazy<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ResettableLazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResettableLazy")
            .field("value", &*self.inner.value.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn computes_once_until_reset() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy = ResettableLazy::new(move || counter.fetch_add(1, Ordering::SeqCst) + 10);

        assert!(!lazy.is_initialized());
        assert_eq!(*lazy.get(), 10);
        assert_eq!(*lazy.get(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        lazy.reset();
        assert!(!lazy.is_initialized());
        assert_eq!(*lazy.get(), 11);
    }
}
