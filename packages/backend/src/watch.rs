//! The watch registry and dispatch engine.
//!
//! Every backend owns one [`WatchRegistry`]: a mutex-guarded list of
//! subscriptions. Each subscription pairs a target (any [`Watcher`]) with an
//! optional dispatch [`Context`](crate::Context). The registry holds only a
//! `Weak` reference to the target; the caller keeps it alive.
//!
//! Dispatch is snapshot-then-release: under the lock, every live target is
//! upgraded to a strong reference and paired with its context; the lock is
//! dropped before any callback runs. Consequences:
//!
//! - Callbacks never run while the registry is locked, so a callback may
//!   call [`WatchRegistry::watch`] or [`WatchRegistry::unwatch`] on the same
//!   backend without deadlocking.
//! - A delivery in flight holds its own strong reference, so the target
//!   stays valid even if every other reference is dropped concurrently.
//!   An `unwatch` does not cancel deliveries that were already snapshot.
//! - Targets that died before the snapshot fail to upgrade; their records
//!   are pruned under the lock and can never be invoked again.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::context::Context;

/// An opaque identity token attached to a mutation and delivered back in
/// change notifications, letting a caller recognize its own writes.
///
/// The tag is never dereferenced or validated; its meaning is defined
/// entirely by the caller.
///
/// # Cross-context caveat
///
/// Tag identity is only trustworthy for watches registered *without* a
/// dispatch context. A callback posted to a context runs later, possibly on
/// another thread; by then whatever minted the tag may be gone and its
/// identity reused by an unrelated party. Watches with a context must treat
/// the tag as noise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct OriginTag(u64);

impl OriginTag {
    /// Wrap a caller-defined identity.
    pub const fn new(raw: u64) -> Self {
        OriginTag(raw)
    }

    /// The caller-defined identity.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// The callback table of a watch target.
///
/// All methods default to no-ops so a target only overrides the signals it
/// cares about. Callbacks run either on the emitting thread (no context) or
/// on whatever thread services the watch's context.
pub trait Watcher: Send + Sync {
    /// The value of `key` may have changed.
    fn changed(&self, key: &str, origin: OriginTag) {
        let _ = (key, origin);
    }

    /// For each `k` in `keys`, the value of `dir ++ k` may have changed.
    fn keys_changed(&self, dir: &str, keys: &[String], origin: OriginTag) {
        let _ = (dir, keys, origin);
    }

    /// Any key under `dir` may have changed.
    fn path_changed(&self, dir: &str, origin: OriginTag) {
        let _ = (dir, origin);
    }

    /// The writability of `key` may have changed.
    fn writable_changed(&self, key: &str) {
        let _ = key;
    }

    /// The writability of any key under `dir` may have changed.
    fn path_writable_changed(&self, dir: &str) {
        let _ = dir;
    }
}

/// A change signal with its payload, shared read-only across deliveries.
#[derive(Clone, Debug)]
pub(crate) enum Event {
    Changed { key: String, origin: OriginTag },
    KeysChanged {
        dir: String,
        keys: Vec<String>,
        origin: OriginTag,
    },
    PathChanged { dir: String, origin: OriginTag },
    WritableChanged { key: String },
    PathWritableChanged { dir: String },
}

impl Event {
    fn deliver(&self, target: &dyn Watcher) {
        match self {
            Event::Changed { key, origin } => target.changed(key, *origin),
            Event::KeysChanged { dir, keys, origin } => target.keys_changed(dir, keys, *origin),
            Event::PathChanged { dir, origin } => target.path_changed(dir, *origin),
            Event::WritableChanged { key } => target.writable_changed(key),
            Event::PathWritableChanged { dir } => target.path_writable_changed(dir),
        }
    }
}

struct Watch {
    target: Weak<dyn Watcher>,
    context: Option<Arc<dyn Context>>,
}

/// The per-backend list of subscriptions.
#[derive(Default)]
pub struct WatchRegistry {
    watches: Mutex<Vec<Watch>>,
}

impl WatchRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        WatchRegistry {
            watches: Mutex::new(Vec::new()),
        }
    }

    /// Register `target` for change signals, optionally confined to a
    /// dispatch context.
    ///
    /// The registry keeps only a weak reference; dropping every strong
    /// reference to the target retires the watch. A `None` context means
    /// "any context is fine": callbacks run synchronously on the thread
    /// that emits the signal.
    pub fn watch<W: Watcher + 'static>(&self, target: &Arc<W>, context: Option<Arc<dyn Context>>) {
        let target: Arc<dyn Watcher> = target.clone();
        let target: Weak<dyn Watcher> = Arc::downgrade(&target);
        let mut watches = self.watches.lock();
        watches.retain(|watch| watch.target.strong_count() > 0);
        watches.insert(0, Watch { target, context });
    }

    /// Remove the watch registered for `target`.
    ///
    /// The caller must still hold a live reference to the target (it does:
    /// it just passed one in). Unwatching does not cancel deliveries that
    /// are already in flight.
    pub fn unwatch<W: Watcher + 'static>(&self, target: &Arc<W>) {
        let needle = Arc::as_ptr(target) as *const ();
        let mut watches = self.watches.lock();
        let before = watches.len();
        watches.retain(|watch| {
            watch.target.strong_count() > 0 && watch.target.as_ptr() as *const () != needle
        });
        if watches.len() == before {
            log::warn!("unwatch: target was not registered");
        }
    }

    /// Number of live watches.
    pub fn len(&self) -> usize {
        self.watches
            .lock()
            .iter()
            .filter(|watch| watch.target.strong_count() > 0)
            .count()
    }

    /// Whether no live watch is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fan an event out to every live watch.
    ///
    /// The snapshot happens under the lock; invocation happens after it is
    /// released, synchronously for context-less watches and via
    /// [`Context::post`] otherwise.
    pub(crate) fn dispatch(&self, event: Event) {
        let mut deliveries: Vec<(Arc<dyn Watcher>, Option<Arc<dyn Context>>)> = Vec::new();

        {
            let mut watches = self.watches.lock();
            watches.retain(|watch| match watch.target.upgrade() {
                Some(target) => {
                    deliveries.push((target, watch.context.clone()));
                    true
                }
                None => false,
            });
        }

        let event = Arc::new(event);
        for (target, context) in deliveries {
            match context {
                Some(context) => {
                    let event = Arc::clone(&event);
                    context.post(Box::new(move || event.deliver(&*target)));
                }
                None => event.deliver(&*target),
            }
        }
    }
}
