//! prefstore: a pluggable settings backend abstraction.
//!
//! This crate is the storage-agnostic core of a settings system. It defines:
//!
//! - `paths`: the lexical rules for keys (`/a/b`), dirs (`/a/b/`), and paths
//! - [`Value`] / [`ValueType`]: opaque typed settings payloads
//! - [`Changeset`]: sealable, prefix-factored batches of writes and resets,
//!   plus the read-through overlay ([`check_changeset_queue`])
//! - [`Watcher`] / [`WatchRegistry`] / [`Context`]: the change-notification
//!   fabric, safe against targets destroyed from arbitrary threads
//! - [`Backend`] / [`BackendExt`]: the implementer contract and the
//!   consumer surface, with canonical default compositions
//! - [`MemoryBackend`]: the built-in fallback backend
//! - [`default_backend`] / [`register_backend`]: process-wide backend
//!   selection
//!
//! Concrete backends (files, registries, daemons) live in their own crates
//! and plug in behind [`Backend`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use prefstore_backend::{
//!     Backend, BackendExt, MemoryBackend, OriginTag, Value, ValueType, Watcher,
//! };
//!
//! struct Logger;
//!
//! impl Watcher for Logger {
//!     fn changed(&self, key: &str, _origin: OriginTag) {
//!         println!("{} changed", key);
//!     }
//! }
//!
//! let backend = MemoryBackend::new();
//! let logger = Arc::new(Logger);
//! backend.watch(&logger, None);
//!
//! backend.write("/app/mode", Value::from("dark"), OriginTag::new(1));
//! let mode = backend.read_value("/app/mode", &ValueType::String, None, false, false);
//! assert_eq!(mode, Some(Value::from("dark")));
//! ```

pub use bytes::Bytes;

mod backend;
mod changeset;
mod context;
mod default;
mod memory;
pub mod paths;
mod value;
mod watch;

pub use backend::{Backend, BackendExt};
pub use changeset::{check_changeset_queue, Changeset, Op, SealedChangeset};
pub use context::{Context, Task, WorkerContext};
pub use default::{
    default_backend, register_backend, sync_default, RegistryError, BACKEND_ENV_VAR,
    MEMORY_BACKEND_NAME,
};
pub use memory::MemoryBackend;
pub use paths::{is_dir, is_key, is_path};
pub use value::{Value, ValueType};
pub use watch::{OriginTag, WatchRegistry, Watcher};
