//! Changesets: ordered batches of per-key writes and resets.
//!
//! A [`Changeset`] collects operations against absolute keys while *open*,
//! deduplicating so the last operation on a key wins. [`Changeset::seal`]
//! freezes it and factors the entries into a common prefix plus relative
//! suffixes; [`Changeset::describe`] exposes that factoring as a stable
//! view. Sealed changesets are immutable and can be shared freely between
//! threads behind an `Arc`.
//!
//! [`check_changeset_queue`] is the read-through overlay: it answers "what
//! would a read of this key return if the pending changesets were applied?"
//! without touching any backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::paths::is_key;
use crate::value::Value;

/// A single pending operation on a key.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    /// Store this value at the key.
    Write(Value),
    /// Reset the key to its default (possibly unsetting it).
    Reset,
}

impl Op {
    /// The value this operation would leave visible, or `None` for a reset.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Op::Write(value) => Some(value),
            Op::Reset => None,
        }
    }
}

enum State {
    Open(BTreeMap<String, Op>),
    Sealed(Arc<SealedChangeset>),
}

/// The immutable, prefix-factored view of a sealed [`Changeset`].
///
/// `prefix` concatenated with `keys[i]` reproduces the i-th absolute key.
/// With two or more entries the prefix is always a valid dir; with exactly
/// one entry the prefix is the full key and the single relative key is the
/// empty string.
#[derive(Debug)]
pub struct SealedChangeset {
    prefix: String,
    keys: Vec<String>,
    ops: Vec<Op>,
}

impl SealedChangeset {
    /// The common prefix of every absolute key in the batch.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The relative key suffixes, in sorted order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// The operations, parallel to [`SealedChangeset::keys`].
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the batch carries no entries.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Look up the operation recorded for an absolute key.
    pub fn get(&self, key: &str) -> Option<&Op> {
        let suffix = key.strip_prefix(&self.prefix)?;
        let index = self.keys.binary_search_by(|k| k.as_str().cmp(suffix)).ok()?;
        Some(&self.ops[index])
    }
}

/// An ordered batch of write-or-reset operations.
///
/// # Example
///
/// ```rust
/// use prefstore_backend::{Changeset, Value};
///
/// let changeset = Changeset::new();
/// changeset.add_write("/editor/theme", Value::from("dark"));
/// changeset.add_write("/editor/font-size", Value::from(12i64));
///
/// let sealed = changeset.describe();
/// assert_eq!(sealed.prefix(), "/editor/");
/// assert_eq!(sealed.keys(), ["font-size".to_string(), "theme".to_string()]);
/// ```
pub struct Changeset {
    state: Mutex<State>,
}

impl Changeset {
    /// Create an empty, open changeset.
    pub fn new() -> Self {
        Changeset {
            state: Mutex::new(State::Open(BTreeMap::new())),
        }
    }

    /// Convenience constructor for the single-write case.
    pub fn new_write(key: &str, value: Value) -> Self {
        let changeset = Changeset::new();
        changeset.add_write(key, value);
        changeset
    }

    /// Record that `key` should be set to `value`.
    ///
    /// The last operation recorded for a key wins. Invalid keys and sealed
    /// changesets are refused with a diagnostic; no entry is recorded.
    pub fn add_write(&self, key: &str, value: Value) {
        self.add(key, Op::Write(value));
    }

    /// Record that `key` should be reset to its default.
    ///
    /// Same refusal rules as [`Changeset::add_write`].
    pub fn add_reset(&self, key: &str) {
        self.add(key, Op::Reset);
    }

    fn add(&self, key: &str, op: Op) {
        if !is_key(key) {
            log::error!("changeset: '{}' is not a valid key; entry dropped", key);
            return;
        }

        match &mut *self.state.lock() {
            State::Open(entries) => {
                entries.insert(key.to_string(), op);
            }
            State::Sealed(_) => {
                log::error!(
                    "changeset: cannot add '{}' after sealing; entry dropped",
                    key
                );
            }
        }
    }

    /// Seal the changeset, freezing its entries.
    ///
    /// Sealing computes the longest common prefix of all absolute keys and
    /// rewrites the entries as relative suffixes. Idempotent.
    pub fn seal(&self) {
        self.describe();
    }

    /// Seal (if not already sealed) and return the stable factored view.
    pub fn describe(&self) -> Arc<SealedChangeset> {
        let mut state = self.state.lock();
        let sealed = match &*state {
            State::Sealed(sealed) => return sealed.clone(),
            State::Open(entries) => Arc::new(seal_entries(entries)),
        };
        *state = State::Sealed(sealed.clone());
        sealed
    }

    /// Look up the operation recorded for an absolute key, open or sealed.
    pub fn get(&self, key: &str) -> Option<Op> {
        match &*self.state.lock() {
            State::Open(entries) => entries.get(key).cloned(),
            State::Sealed(sealed) => sealed.get(key).cloned(),
        }
    }

    /// Enumerate `(absolute_key, value_or_absent)` over all entries.
    ///
    /// A pending reset is reported as `None`.
    pub fn for_each(&self, mut f: impl FnMut(&str, Option<&Value>)) {
        match &*self.state.lock() {
            State::Open(entries) => {
                for (key, op) in entries {
                    f(key, op.value());
                }
            }
            State::Sealed(sealed) => {
                for (suffix, op) in sealed.keys.iter().zip(&sealed.ops) {
                    let absolute = format!("{}{}", sealed.prefix, suffix);
                    f(&absolute, op.value());
                }
            }
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        match &*self.state.lock() {
            State::Open(entries) => entries.len(),
            State::Sealed(sealed) => sealed.len(),
        }
    }

    /// Whether the changeset carries no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Changeset {
    fn default() -> Self {
        Changeset::new()
    }
}

fn seal_entries(entries: &BTreeMap<String, Op>) -> SealedChangeset {
    if entries.is_empty() {
        return SealedChangeset {
            prefix: String::new(),
            keys: Vec::new(),
            ops: Vec::new(),
        };
    }

    if entries.len() == 1 {
        let (key, op) = entries.iter().next().unwrap();
        return SealedChangeset {
            prefix: key.clone(),
            keys: vec![String::new()],
            ops: vec![op.clone()],
        };
    }

    let prefix = common_dir_prefix(entries.keys());
    let mut keys = Vec::with_capacity(entries.len());
    let mut ops = Vec::with_capacity(entries.len());
    for (key, op) in entries {
        keys.push(key[prefix.len()..].to_string());
        ops.push(op.clone());
    }

    SealedChangeset { prefix, keys, ops }
}

/// Longest common prefix of the given keys, truncated back to the last `/`
/// so the result is a dir. Every key starts with `/`, so the result is at
/// worst `/`.
fn common_dir_prefix<'a>(mut keys: impl Iterator<Item = &'a String>) -> String {
    let first = keys.next().expect("at least one key").as_str();
    let mut len = first.len();

    for key in keys {
        let common = first
            .bytes()
            .zip(key.bytes())
            .take_while(|(a, b)| a == b)
            .count();
        len = len.min(common);
    }

    // The byte-wise common length may land inside a multi-byte character;
    // cutting back to the last '/' (ASCII) restores a char boundary.
    let slash = first.as_bytes()[..len]
        .iter()
        .rposition(|&b| b == b'/')
        .expect("keys start with '/'");
    first[..=slash].to_string()
}

/// Query a stack of pending changesets for the most recent operation on
/// `key`.
///
/// The last element of `queue` is the newest changeset; the scan walks from
/// newest to oldest. Returns:
///
/// - `None` - no changeset in the queue mentions `key`; the caller should
///   fall through to the real backend.
/// - `Some(Some(value))` - a pending write supplies the effective value.
/// - `Some(None)` - a pending reset hides any stored value.
pub fn check_changeset_queue(queue: &[Arc<Changeset>], key: &str) -> Option<Option<Value>> {
    for changeset in queue.iter().rev() {
        if let Some(op) = changeset.get(key) {
            return Some(match op {
                Op::Write(value) => Some(value),
                Op::Reset => None,
            });
        }
    }

    None
}
