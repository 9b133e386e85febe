//! A settings backend persisting to a single JSON document on disk.
//!
//! User values live in one flat object (see [`crate::convert`]); an
//! optional second document supplies the read-only defaults layer plus a
//! `locks` list implementing lockdown. Writes apply in memory first and are
//! flushed to disk best-effort; [`Backend::sync`] forces the flush.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::{env, fs};

use parking_lot::Mutex;

use prefstore_backend::{
    is_dir, is_key, is_path, register_backend, Backend, BackendExt, Changeset, MemoryBackend,
    OriginTag, RegistryError, Value, ValueType, WatchRegistry,
};

use crate::convert::{table_from_json, table_to_json, value_from_json};
use crate::error::Error;

/// Environment variable overriding the store document location.
pub const STORE_PATH_ENV_VAR: &str = "PREFSTORE_JSON_STORE";

/// The name this backend registers under.
pub const BACKEND_NAME: &str = "json";

/// Member of the defaults document listing locked-down keys and dirs.
/// Unambiguous because settings keys always start with `/`.
const LOCKS_MEMBER: &str = "locks";

/// A settings backend storing the user table as a flat JSON document.
pub struct JsonFileBackend {
    watches: WatchRegistry,
    store_path: PathBuf,
    defaults: BTreeMap<String, Value>,
    locks: Mutex<BTreeSet<String>>,
    table: Mutex<BTreeMap<String, Value>>,
    dirty: AtomicBool,
}

impl JsonFileBackend {
    /// Open (or lazily create) the store document at `store_path`.
    ///
    /// A missing file is an empty store; it is created on the first flush.
    pub fn new(store_path: impl Into<PathBuf>) -> Result<Self, Error> {
        let store_path = store_path.into();
        let table = load_table(&store_path)?;

        Ok(JsonFileBackend {
            watches: WatchRegistry::new(),
            store_path,
            defaults: BTreeMap::new(),
            locks: Mutex::new(BTreeSet::new()),
            table: Mutex::new(table),
            dirty: AtomicBool::new(false),
        })
    }

    /// Open a store with a sysadmin defaults document.
    ///
    /// The defaults document is flat like the store itself; its optional
    /// `locks` member is an array of keys and dirs that refuse writes.
    pub fn with_defaults(
        store_path: impl Into<PathBuf>,
        defaults_path: &Path,
    ) -> Result<Self, Error> {
        let mut backend = JsonFileBackend::new(store_path)?;
        let (defaults, locks) = load_defaults(defaults_path)?;
        backend.defaults = defaults;
        backend.locks = Mutex::new(locks);
        Ok(backend)
    }

    /// The location of the store document.
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Reconfigure lockdown for a key or dir at runtime.
    ///
    /// Emits the matching writability signal when the lock state actually
    /// changes. This is the "external event" source for writability
    /// notifications.
    pub fn set_locked(&self, path: &str, locked: bool) {
        if !is_path(path) {
            log::error!("set_locked: '{}' is not a valid path", path);
            return;
        }

        let mutated = {
            let mut locks = self.locks.lock();
            if locked {
                locks.insert(path.to_string())
            } else {
                locks.remove(path)
            }
        };

        if !mutated {
            return;
        }

        if is_dir(path) {
            self.path_writable_changed(path);
        } else {
            self.writable_changed(path);
        }
    }

    fn is_locked(&self, key: &str) -> bool {
        let locks = self.locks.lock();
        if locks.contains(key) {
            return true;
        }

        // Any enclosing dir locks the key too.
        key.match_indices('/')
            .any(|(index, _)| locks.contains(&key[..=index]))
    }

    fn persist(&self) -> Result<(), Error> {
        if let Some(parent) = self.store_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let document = {
            let table = self.table.lock();
            serde_json::to_string_pretty(&table_to_json(&table))?
        };

        log::debug!("Writing {}...", self.store_path.display());
        fs::write(&self.store_path, document)?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Backend for JsonFileBackend {
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
        // Lockdown refuses the whole batch up front: no partial state, no
        // signal.
        let mut refused = false;
        changeset.for_each(|key, _| {
            if self.is_locked(key) {
                refused = true;
            }
        });
        if refused {
            return false;
        }

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

        if mutated {
            self.dirty.store(true, Ordering::SeqCst);
            self.changeset_applied(changeset, origin);

            // Durability is best-effort here; sync() retries the flush.
            if let Err(error) = self.persist() {
                log::error!(
                    "failed to write settings store {}: {}",
                    self.store_path.display(),
                    error
                );
            }
        }

        true
    }

    fn get_writable(&self, key: &str) -> bool {
        !self.is_locked(key)
    }

    fn sync(&self) {
        if self.dirty.load(Ordering::SeqCst) {
            if let Err(error) = self.persist() {
                log::error!(
                    "failed to sync settings store {}: {}",
                    self.store_path.display(),
                    error
                );
            }
        }
    }
}

fn load_table(path: &Path) -> Result<BTreeMap<String, Value>, Error> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let text = fs::read_to_string(path)?;
    let json: serde_json::Value = serde_json::from_str(&text)?;
    table_from_json(&json)
}

fn load_defaults(path: &Path) -> Result<(BTreeMap<String, Value>, BTreeSet<String>), Error> {
    let text = fs::read_to_string(path)?;
    let json: serde_json::Value = serde_json::from_str(&text)?;
    let object = json.as_object().ok_or_else(|| Error::Document {
        message: "defaults document root is not an object".to_string(),
    })?;

    let mut locks = BTreeSet::new();
    if let Some(member) = object.get(LOCKS_MEMBER) {
        let entries = member.as_array().ok_or_else(|| Error::Document {
            message: format!("'{}' member is not an array", LOCKS_MEMBER),
        })?;
        for entry in entries {
            match entry.as_str() {
                Some(path) if is_path(path) => {
                    locks.insert(path.to_string());
                }
                _ => log::warn!("defaults document: lock entry {} skipped", entry),
            }
        }
    }

    let mut defaults = BTreeMap::new();
    for (key, value) in object {
        if key == LOCKS_MEMBER {
            continue;
        }
        if !is_key(key) {
            log::warn!("defaults document: '{}' is not a valid key; skipped", key);
            continue;
        }
        match value_from_json(value) {
            Ok(value) => {
                defaults.insert(key.clone(), value);
            }
            Err(error) => {
                log::warn!("defaults document: entry '{}' skipped: {}", key, error);
            }
        }
    }

    Ok((defaults, locks))
}

/// Register this backend with the default resolver under the name `json`.
///
/// The store document comes from `PREFSTORE_JSON_STORE`, falling back to
/// `prefstore/settings.json` under the user configuration directory. A
/// factory that cannot open the store logs the failure and serves a memory
/// backend so the process still has working settings.
pub fn register() -> Result<(), RegistryError> {
    register_backend(BACKEND_NAME, 10, || match open_default_store() {
        Ok(backend) => Arc::new(backend) as Arc<dyn Backend>,
        Err(error) => {
            log::error!("cannot open json settings store: {}; using memory", error);
            Arc::new(MemoryBackend::new())
        }
    })
}

fn open_default_store() -> Result<JsonFileBackend, Error> {
    JsonFileBackend::new(default_store_path()?)
}

fn default_store_path() -> Result<PathBuf, Error> {
    if let Some(path) = env::var_os(STORE_PATH_ENV_VAR) {
        return Ok(PathBuf::from(path));
    }

    if let Some(config) = env::var_os("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(config).join("prefstore").join("settings.json"));
    }

    if let Some(home) = env::var_os("HOME") {
        return Ok(PathBuf::from(home)
            .join(".config")
            .join("prefstore")
            .join("settings.json"));
    }

    Err(Error::NoStorePath)
}
