//! Deferred, memoising values keyed by a stable key.
//!
//! The index stores [`LazyValue`] handles instead of raw vectors. A handle
//! carries its key and a resolver; the vector is produced on first access and
//! kept afterwards. Because a handle is fully described by its key, an index
//! snapshot only records keys and a [`LazyRegistry`] rebuilds the handles.

use std::fmt;
use std::sync::{Arc, OnceLock};

/// Resolver turning a key into its value. Must be pure with respect to the key.
pub type Resolver<K, V> = Arc<dyn Fn(&K) -> V + Send + Sync>;

pub struct LazyValue<K, V> {
    key: K,
    resolver: Resolver<K, V>,
    cached: OnceLock<V>,
}

impl<K, V> LazyValue<K, V> {
    /// Create an unresolved handle.
    pub fn new(key: K, resolver: Resolver<K, V>) -> Self {
        Self {
            key,
            resolver,
            cached: OnceLock::new(),
        }
    }

    /// Create a handle whose value is already known.
    ///
    /// The resolver is kept so the handle stays reproducible from its key.
    pub fn resolved(key: K, value: V, resolver: Resolver<K, V>) -> Self {
        let cached = OnceLock::new();
        let _ = cached.set(value);
        Self {
            key,
            resolver,
            cached,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Resolve (once) and return the value.
    pub fn value(&self) -> &V {
        self.cached.get_or_init(|| (self.resolver)(&self.key))
    }

    pub fn is_resolved(&self) -> bool {
        self.cached.get().is_some()
    }
}

impl<K: fmt::Debug, V> fmt::Debug for LazyValue<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyValue")
            .field("key", &self.key)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Explicit resolver registry used to rehydrate [`LazyValue`]s from keys.
///
/// Constructed by whoever owns the data the keys point at, and passed by
/// reference to the component restoring an index snapshot.
pub struct LazyRegistry<K, V> {
    resolver: Resolver<K, V>,
}

impl<K, V> Clone for LazyRegistry<K, V> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
        }
    }
}

impl<K, V> LazyRegistry<K, V> {
    pub fn new<F>(resolver: F) -> Self
    where
        F: Fn(&K) -> V + Send + Sync + 'static,
    {
        Self {
            resolver: Arc::new(resolver),
        }
    }

    pub fn resolver(&self) -> Resolver<K, V> {
        self.resolver.clone()
    }

    /// Wrap a key into an unresolved handle.
    pub fn wrap(&self, key: K) -> Arc<LazyValue<K, V>> {
        Arc::new(LazyValue::new(key, self.resolver.clone()))
    }

    /// Wrap a key whose value has already been computed.
    pub fn wrap_resolved(&self, key: K, value: V) -> Arc<LazyValue<K, V>> {
        Arc::new(LazyValue::resolved(key, value, self.resolver.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_value_is_resolved_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy = LazyValue::new(
            3usize,
            Arc::new(move |k: &usize| {
                counter.fetch_add(1, Ordering::SeqCst);
                vec![*k as f32; 2]
            }),
        );

        assert!(!lazy.is_resolved());
        assert_eq!(lazy.value(), &vec![3.0, 3.0]);
        assert_eq!(lazy.value(), &vec![3.0, 3.0]);
        assert!(lazy.is_resolved());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_resolved_handle_skips_resolver() {
        let lazy = LazyValue::resolved(
            "k".to_string(),
            vec![1.0f32],
            Arc::new(|_: &String| -> Vec<f32> { panic!("resolver must not run") }),
        );
        assert!(lazy.is_resolved());
        assert_eq!(lazy.value(), &vec![1.0]);
    }

    #[test]
    fn test_registry_rehydrates_same_value() {
        let registry = LazyRegistry::new(|k: &String| vec![k.len() as f32]);
        let first = registry.wrap("hello".to_string());
        let second = registry.wrap(first.key().clone());

        assert_eq!(first.value(), second.value());
        assert_eq!(second.key(), "hello");
    }
}
