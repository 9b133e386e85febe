//! # prefstore-json-store
//!
//! A file-backed settings backend for prefstore. The user table is one flat
//! JSON document (member names are settings keys); an optional defaults
//! document supplies sysadmin defaults and a lockdown list.
//!
//! ```ignore
//! use prefstore_json_store::JsonFileBackend;
//! use prefstore_backend::{Backend, BackendExt, OriginTag, Value, ValueType};
//!
//! let backend = JsonFileBackend::new("/tmp/settings.json")?;
//! backend.write("/app/mode", Value::from("dark"), OriginTag::default());
//! backend.sync();
//! ```
//!
//! Call [`register`] once at startup to make the backend available to
//! [`prefstore_backend::default_backend`] under the name `json`.

pub mod convert;
mod error;
mod file;

pub use error::Error;
pub use file::{register, JsonFileBackend, BACKEND_NAME, STORE_PATH_ENV_VAR};
