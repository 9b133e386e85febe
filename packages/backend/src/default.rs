//! Process-wide default backend selection.
//!
//! Concrete backends register themselves by name and priority; the first
//! call to [`default_backend`] resolves a winner and caches it for the
//! lifetime of the process. The `PREFSTORE_BACKEND` environment variable
//! overrides the priority order; the name `memory` always refers to the
//! built-in [`MemoryBackend`](crate::MemoryBackend).

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::Mutex;

use crate::backend::Backend;
use crate::memory::MemoryBackend;

/// Environment variable naming the preferred backend.
pub const BACKEND_ENV_VAR: &str = "PREFSTORE_BACKEND";

/// The reserved name of the built-in in-memory backend.
pub const MEMORY_BACKEND_NAME: &str = "memory";

type Factory = Arc<dyn Fn() -> Arc<dyn Backend> + Send + Sync>;

struct Registration {
    name: String,
    priority: i32,
    factory: Factory,
}

lazy_static! {
    static ref REGISTRY: Mutex<Vec<Registration>> = Mutex::new(Vec::new());
    static ref DEFAULT: Mutex<Option<Arc<dyn Backend>>> = Mutex::new(None);
}

/// Whether a default backend has been instantiated yet. Lets
/// [`sync_default`] avoid creating a backend just to flush nothing.
static HAS_DEFAULT: AtomicBool = AtomicBool::new(false);

/// Errors from [`register_backend`].
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("a settings backend named '{name}' is already registered")]
    DuplicateName { name: String },

    #[error("'memory' names the built-in backend and cannot be registered")]
    ReservedName,
}

/// Register a concrete backend implementation under `name`.
///
/// The factory runs at most once, when the default resolver picks this
/// registration. Higher `priority` wins when no environment override is in
/// effect.
pub fn register_backend<F>(name: &str, priority: i32, factory: F) -> Result<(), RegistryError>
where
    F: Fn() -> Arc<dyn Backend> + Send + Sync + 'static,
{
    if name == MEMORY_BACKEND_NAME {
        return Err(RegistryError::ReservedName);
    }

    let mut registry = REGISTRY.lock();
    if registry.iter().any(|r| r.name == name) {
        return Err(RegistryError::DuplicateName {
            name: name.to_string(),
        });
    }

    registry.push(Registration {
        name: name.to_string(),
        priority,
        factory: Arc::new(factory),
    });
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Choice {
    /// Index into the registration list.
    Extension(usize),
    /// The built-in memory backend; `requested` records whether the user
    /// asked for it by name.
    Memory { requested: bool },
}

/// Pure selection logic, separated from the global registry and the
/// environment so it can be tested directly.
fn select(requested: Option<&str>, registered: &[(&str, i32)]) -> Choice {
    if let Some(name) = requested {
        if name == MEMORY_BACKEND_NAME {
            return Choice::Memory { requested: true };
        }
        if let Some(index) = registered.iter().position(|(n, _)| *n == name) {
            return Choice::Extension(index);
        }
        log::warn!("settings backend '{}' is not registered; ignoring", name);
    }

    // Strictly-greater comparison keeps the earliest registration on ties.
    let mut best: Option<(usize, i32)> = None;
    for (index, (_, priority)) in registered.iter().enumerate() {
        if best.is_none_or(|(_, current)| *priority > current) {
            best = Some((index, *priority));
        }
    }

    match best {
        Some((index, _)) => Choice::Extension(index),
        None => Choice::Memory { requested: false },
    }
}

fn instantiate(requested: Option<&str>) -> Arc<dyn Backend> {
    // Clone the winning factory out so it never runs under the registry
    // lock (a factory is allowed to register further backends).
    let factory: Option<Factory> = {
        let registry = REGISTRY.lock();
        let registered: Vec<(&str, i32)> = registry
            .iter()
            .map(|r| (r.name.as_str(), r.priority))
            .collect();

        match select(requested, &registered) {
            Choice::Extension(index) => Some(registry[index].factory.clone()),
            Choice::Memory { requested } => {
                if !requested {
                    log::info!(
                        "Using the 'memory' settings backend. \
                         Your settings will not be saved or shared with other applications."
                    );
                }
                None
            }
        }
    };

    match factory {
        Some(factory) => factory(),
        None => Arc::new(MemoryBackend::new()),
    }
}

/// The process-wide default backend.
///
/// Resolved once: the `PREFSTORE_BACKEND` environment variable names a
/// registration (or `memory`); otherwise the highest-priority registration
/// wins; otherwise the built-in memory backend is used, with an
/// informational notice since settings will not outlive the process.
/// Subsequent calls return the cached instance.
pub fn default_backend() -> Arc<dyn Backend> {
    let mut slot = DEFAULT.lock();
    if let Some(backend) = &*slot {
        return backend.clone();
    }

    let requested = env::var(BACKEND_ENV_VAR).ok();
    let backend = instantiate(requested.as_deref());
    *slot = Some(backend.clone());
    HAS_DEFAULT.store(true, Ordering::SeqCst);
    backend
}

/// Flush the default backend, if one has been instantiated.
///
/// Deliberately a no-op when no default exists yet: flushing nothing does
/// not justify building an entire backend.
pub fn sync_default() {
    if HAS_DEFAULT.load(Ordering::SeqCst) {
        default_backend().sync();
    }
}
