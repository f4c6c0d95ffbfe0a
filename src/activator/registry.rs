//! Cache of compiled record activators
//!
//! One [`RecordActivator`] per record type, compiled on first use. The
//! registry is an ordinary value: a [`Reader`](crate::Reader) creates its own
//! unless one is supplied, and several readers may share one through an
//! `Arc`. Schema errors are not cached; every use of a broken type reports
//! the error again.

use super::schema::{Record, RecordActivator};
use crate::error::{Error, Result};
use rustc_hash::FxHashMap;
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Thread-safe map from record type to its compiled activator
#[derive(Default)]
pub struct ActivatorRegistry {
    activators: RwLock<FxHashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl ActivatorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The activator of `T`, compiling and caching it on first use
    pub fn activator<T: Record>(&self) -> Result<Arc<RecordActivator<T>>> {
        let id = TypeId::of::<T>();
        let cached = self
            .activators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned();

        let erased = match cached {
            Some(erased) => erased,
            None => {
                // Compiled outside the lock; a racing thread may insert first
                let compiled: Arc<dyn Any + Send + Sync> = Arc::new(RecordActivator::<T>::build()?);
                log::debug!("compiled activator for {}", type_name::<T>());
                self.activators
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(id)
                    .or_insert(compiled)
                    .clone()
            }
        };

        erased.downcast::<RecordActivator<T>>().map_err(|_| {
            Error::config(format!(
                "registry entry for {} holds another type",
                type_name::<T>()
            ))
        })
    }

    /// Compile `T` now so schema errors surface before the first lookup
    pub fn register<T: Record>(&self) -> Result<()> {
        self.activator::<T>().map(|_| ())
    }

    /// True if `T` has been compiled
    pub fn contains<T: Record>(&self) -> bool {
        self.activators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeId::of::<T>())
    }

    /// Number of compiled record types
    pub fn len(&self) -> usize {
        self.activators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when nothing has been compiled yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ActivatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivatorRegistry")
            .field("records", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activator::Schema;

    struct Pair {
        a: u32,
        b: String,
    }

    impl Record for Pair {
        fn schema(schema: &mut Schema<Self>) {
            let a = schema.field("a");
            let b = schema.field("b");
            schema.constructor(move |args| {
                Ok(Pair {
                    a: args.take(a)?,
                    b: args.take(b)?,
                })
            });
        }
    }

    struct Broken;

    impl Record for Broken {
        fn schema(_schema: &mut Schema<Self>) {}
    }

    #[test]
    fn test_compiled_once() {
        let registry = ActivatorRegistry::new();
        assert!(registry.is_empty());
        assert!(!registry.contains::<Pair>());

        let first = registry.activator::<Pair>().unwrap();
        let second = registry.activator::<Pair>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.parameter_count(), 2);
        assert!(registry.contains::<Pair>());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_errors_not_cached() {
        let registry = ActivatorRegistry::new();
        assert!(matches!(
            registry.register::<Broken>(),
            Err(Error::Deserialization(_))
        ));
        assert!(registry.register::<Broken>().is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_shared_across_threads() {
        let registry = Arc::new(ActivatorRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.activator::<Pair>().map(|a| a.parameter_count()))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 2);
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_default_record_values() {
        let registry = ActivatorRegistry::new();
        let ctx = crate::decoder::DecodeContext::new(&registry);
        let pair = registry.activator::<Pair>().unwrap().create_default(&ctx).unwrap();
        assert_eq!(pair.a, 0);
        assert!(pair.b.is_empty());
    }
}
