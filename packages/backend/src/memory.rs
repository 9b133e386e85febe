//! The built-in in-memory backend.
//!
//! Settings live in a plain map and vanish with the process. This is the
//! fallback the default resolver reaches for when nothing better is
//! registered, and the workhorse of the test suites.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::backend::{Backend, BackendExt};
use crate::changeset::Changeset;
use crate::paths::is_key;
use crate::value::{Value, ValueType};
use crate::watch::{OriginTag, WatchRegistry};

/// A settings backend storing everything in process memory.
///
/// # Example
///
/// ```rust
/// use prefstore_backend::{Backend, BackendExt, MemoryBackend, OriginTag, Value, ValueType};
///
/// let backend = MemoryBackend::new();
/// backend.write("/app/mode", Value::from("dark"), OriginTag::default());
///
/// let value = backend.read_value("/app/mode", &ValueType::String, None, false, false);
/// assert_eq!(value, Some(Value::from("dark")));
/// ```
pub struct MemoryBackend {
    watches: WatchRegistry,
    table: Mutex<BTreeMap<String, Value>>,
    defaults: BTreeMap<String, Value>,
}

impl MemoryBackend {
    /// Create an empty backend with no defaults layer.
    pub fn new() -> Self {
        MemoryBackend::with_defaults(BTreeMap::new())
    }

    /// Create a backend seeded with a read-only defaults layer.
    ///
    /// Entries with invalid keys are dropped with a diagnostic.
    pub fn with_defaults(defaults: BTreeMap<String, Value>) -> Self {
        let defaults = defaults
            .into_iter()
            .filter(|(key, _)| {
                let ok = is_key(key);
                if !ok {
                    log::error!("memory backend: default entry '{}' is not a valid key", key);
                }
                ok
            })
            .collect();

        MemoryBackend {
            watches: WatchRegistry::new(),
            table: Mutex::new(BTreeMap::new()),
            defaults,
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        MemoryBackend::new()
    }
}

impl Backend for MemoryBackend {
    fn watch_registry(&self) -> &WatchRegistry {
        &self.watches
    }

    fn read(&self, key: &str, _expected: &ValueType, default_only: bool) -> Option<Value> {
        if default_only {
            return self.defaults.get(key).cloned();
        }

        self.table
            .lock()
            .get(key)
            .cloned()
            .or_else(|| self.defaults.get(key).cloned())
    }

    fn read_user_value(&self, key: &str, _expected: &ValueType) -> Option<Value> {
        self.table.lock().get(key).cloned()
    }

    fn write_batch(&self, changeset: &Changeset, origin: OriginTag) -> bool {
        let mut mutated = false;

        {
            let mut table = self.table.lock();
            changeset.for_each(|key, value| match value {
                Some(value) => {
                    if table.get(key) != Some(value) {
                        table.insert(key.to_string(), value.clone());
                        mutated = true;
                    }
                }
                None => {
                    if table.remove(key).is_some() {
                        mutated = true;
                    }
                }
            });
        }

        // No-op batches elect to skip signaling.
        if mutated {
            self.changeset_applied(changeset, origin);
        }

        true
    }
}
