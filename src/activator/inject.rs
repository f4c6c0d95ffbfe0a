//! Caller-supplied values handed to `inject` parameters.

use rustc_hash::FxHashMap;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Named runtime values injected into records while decoding
///
/// ```
/// use geolocations::InjectableValues;
///
/// let mut values = InjectableValues::new();
/// values.add_value("locales", vec!["de".to_string(), "en".to_string()]);
/// assert_eq!(
///     values.get_as::<Vec<String>>("locales").map(|l| l.len()),
///     Some(2)
/// );
/// ```
#[derive(Clone, Default)]
pub struct InjectableValues {
    values: FxHashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl InjectableValues {
    /// Empty set of values
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a value
    pub fn add_value<V: Any + Send + Sync>(&mut self, key: impl Into<String>, value: V) -> &mut Self {
        self.values.insert(key.into(), Arc::new(value));
        self
    }

    /// Builder form of [`InjectableValues::add_value`]
    pub fn with_value<V: Any + Send + Sync>(mut self, key: impl Into<String>, value: V) -> Self {
        self.add_value(key, value);
        self
    }

    /// The raw value stored under `key`
    pub fn get(&self, key: &str) -> Option<&(dyn Any + Send + Sync)> {
        self.values.get(key).map(|v| v.as_ref())
    }

    /// The value stored under `key`, if it has type `V`
    pub fn get_as<V: Any>(&self, key: &str) -> Option<&V> {
        self.get(key).and_then(|v| v.downcast_ref::<V>())
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no values are set
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for InjectableValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}
