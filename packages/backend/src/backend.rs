//! The abstract backend contract.
//!
//! [`Backend`] is the implementer protocol: a concrete storage backend must
//! supply [`Backend::watch_registry`], [`Backend::read`] and
//! [`Backend::write_batch`]; every other operation has a canonical default
//! composed from those, so a minimal backend is functionally complete.
//!
//! [`BackendExt`] is the consumer surface plus the signal emitters. It has
//! a blanket implementation and cannot be overridden, which is what makes
//! [`BackendExt::read_value`] an anti-corruption boundary: no backend can
//! hand a wrong-typed value to a consumer, because the type check runs on
//! this side of the polymorphic call.
//!
//! # Object Safety
//!
//! `Backend` is object-safe: consumers hold `Arc<dyn Backend>`.

use std::sync::Arc;

use crate::changeset::{check_changeset_queue, Changeset};
use crate::context::Context;
use crate::paths::{is_dir, is_key};
use crate::value::{Value, ValueType};
use crate::watch::{Event, OriginTag, WatchRegistry, Watcher};

/// The implementer protocol for concrete settings backends.
pub trait Backend: Send + Sync {
    /// The registry holding this backend's watches.
    ///
    /// Every implementation embeds one [`WatchRegistry`] and returns it
    /// here; the registry owns the mutex that guards the watch list.
    fn watch_registry(&self) -> &WatchRegistry;

    /// Read the value stored at `key`, or `None` if the key is unset.
    ///
    /// `expected` is a hint; implementations may ignore it. The consumer
    /// path re-checks the returned type either way. With `default_only`,
    /// only the defaults layer is consulted, even if the user has set a
    /// value.
    fn read(&self, key: &str, expected: &ValueType, default_only: bool) -> Option<Value>;

    /// Commit all entries of `changeset`, atomically from the caller's
    /// viewpoint.
    ///
    /// On success the appropriate change signal must be emitted before this
    /// call returns (unless the batch turned out to be a no-op and the
    /// implementation cares to detect that). Returns `false` if the batch
    /// was refused, e.g. because a key is not writable.
    fn write_batch(&self, changeset: &Changeset, origin: OriginTag) -> bool;

    /// Read the value the user explicitly set for `key`.
    ///
    /// Returns `None` if the visible value is merely inherited from the
    /// defaults layer. The default implementation cannot tell the two
    /// apart and reports the stored value.
    fn read_user_value(&self, key: &str, expected: &ValueType) -> Option<Value> {
        self.read(key, expected, false)
    }

    /// Write exactly one key.
    ///
    /// The default wraps the write in a singleton changeset and delegates
    /// to [`Backend::write_batch`]. Returns `false` if the key is invalid
    /// or not writable.
    fn write(&self, key: &str, value: Value, origin: OriginTag) -> bool {
        if !is_key(key) {
            log::error!("write: '{}' is not a valid key", key);
            return false;
        }

        let changeset = Changeset::new_write(key, value);
        self.write_batch(&changeset, origin)
    }

    /// Reset `key` to its default value, possibly unsetting it.
    ///
    /// Reset must always succeed; a backend whose batch path refuses a
    /// reset is misbehaving and is diagnosed, and execution continues.
    fn reset(&self, key: &str, origin: OriginTag) {
        if !is_key(key) {
            log::error!("reset: '{}' is not a valid key", key);
            return;
        }

        let changeset = Changeset::new();
        changeset.add_reset(key);
        if !self.write_batch(&changeset, origin) {
            log::error!("settings backend is behaving incorrectly: reset() must always succeed");
        }
    }

    /// Whether `key` currently accepts writes. Lockdown is surfaced here.
    fn get_writable(&self, key: &str) -> bool {
        let _ = key;
        true
    }

    /// Hint that change signals for `name` (a key or dir) are wanted.
    ///
    /// Backends talking to an external service use this to scope their
    /// subscriptions; the default does nothing.
    fn subscribe(&self, name: &str) {
        let _ = name;
    }

    /// Reverse a previous [`Backend::subscribe`].
    fn unsubscribe(&self, name: &str) {
        let _ = name;
    }

    /// Flush any in-flight work. May block.
    fn sync(&self) {}
}

/// Consumer surface and signal emitters, blanket-implemented for every
/// [`Backend`].
pub trait BackendExt: Backend {
    /// Read `key` through the pending-changeset overlay with a final type
    /// check.
    ///
    /// Resolution order: `default_only` short-circuits to the defaults
    /// layer; otherwise the `read_through` queue is consulted (newest
    /// changeset last), then `read_user_value` if `user_only`, then
    /// [`Backend::read`]. Whatever is found, a value whose type does not
    /// match `expected` is suppressed and reported as absent.
    fn read_value(
        &self,
        key: &str,
        expected: &ValueType,
        read_through: Option<&[Arc<Changeset>]>,
        user_only: bool,
        default_only: bool,
    ) -> Option<Value> {
        if !is_key(key) {
            log::error!("read_value: '{}' is not a valid key", key);
            return None;
        }

        let value = if default_only {
            self.read(key, expected, true)
        } else if let Some(pending) =
            read_through.and_then(|queue| check_changeset_queue(queue, key))
        {
            pending
        } else if user_only {
            self.read_user_value(key, expected)
        } else {
            self.read(key, expected, false)
        };

        match value {
            Some(value) if expected.matches(&value.type_of()) => Some(value),
            Some(value) => {
                log::debug!(
                    "read_value: suppressing {:?} value at '{}' (expected {:?})",
                    value.type_of(),
                    key,
                    expected
                );
                None
            }
            None => None,
        }
    }

    /// Register `target` for this backend's change signals.
    ///
    /// With a context, callbacks are posted to it and the origin tag must
    /// be treated as untrustworthy (see [`OriginTag`]); with `None`,
    /// callbacks run synchronously in production order.
    fn watch<W: Watcher + 'static>(&self, target: &Arc<W>, context: Option<Arc<dyn Context>>) {
        self.watch_registry().watch(target, context);
    }

    /// Remove the watch registered for `target`.
    fn unwatch<W: Watcher + 'static>(&self, target: &Arc<W>) {
        self.watch_registry().unwatch(target);
    }

    /// Signal that the value of `key` may have changed.
    ///
    /// Backend implementations call this from their write paths, before
    /// the write returns, and at any other time in response to external
    /// events.
    fn changed(&self, key: &str, origin: OriginTag) {
        if !is_key(key) {
            log::error!("changed: '{}' is not a valid key", key);
            return;
        }

        self.watch_registry().dispatch(Event::Changed {
            key: key.to_string(),
            origin,
        });
    }

    /// Signal that `dir ++ k` may have changed for each `k` in `keys`.
    ///
    /// For efficiency `dir` should be the longest common dir of the
    /// affected keys; `/` is always correct.
    fn keys_changed(&self, dir: &str, keys: &[String], origin: OriginTag) {
        if !is_dir(dir) {
            log::error!("keys_changed: '{}' is not a valid dir", dir);
            return;
        }

        self.watch_registry().dispatch(Event::KeysChanged {
            dir: dir.to_string(),
            keys: keys.to_vec(),
            origin,
        });
    }

    /// Signal that any key under `dir` may have changed.
    fn path_changed(&self, dir: &str, origin: OriginTag) {
        if !is_dir(dir) {
            log::error!("path_changed: '{}' is not a valid dir", dir);
            return;
        }

        self.watch_registry().dispatch(Event::PathChanged {
            dir: dir.to_string(),
            origin,
        });
    }

    /// Signal that the writability of `key` may have changed.
    ///
    /// Writability only changes in response to external events (lockdown
    /// reconfiguration), so there is no origin tag.
    fn writable_changed(&self, key: &str) {
        if !is_key(key) {
            log::error!("writable_changed: '{}' is not a valid key", key);
            return;
        }

        self.watch_registry().dispatch(Event::WritableChanged {
            key: key.to_string(),
        });
    }

    /// Signal that the writability of any key under `dir` may have changed.
    fn path_writable_changed(&self, dir: &str) {
        if !is_dir(dir) {
            log::error!("path_writable_changed: '{}' is not a valid dir", dir);
            return;
        }

        self.watch_registry().dispatch(Event::PathWritableChanged {
            dir: dir.to_string(),
        });
    }

    /// Emit the right change signal for a committed changeset.
    ///
    /// Seals the changeset if needed. Zero entries emit nothing; one entry
    /// emits `changed` (the prefix of a singleton is the full key); two or
    /// more emit `keys_changed` with the factored prefix.
    fn changeset_applied(&self, changeset: &Changeset, origin: OriginTag) {
        let sealed = changeset.describe();

        match sealed.len() {
            0 => {}
            1 => {
                debug_assert!(sealed.keys()[0].is_empty());
                self.changed(sealed.prefix(), origin);
            }
            _ => self.keys_changed(sealed.prefix(), sealed.keys(), origin),
        }
    }
}

impl<B: Backend + ?Sized> BackendExt for B {}
