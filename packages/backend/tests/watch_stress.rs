//! Cross-thread behavior of the watch fabric: context-confined delivery,
//! concurrent target destruction, and ordering of synchronous deliveries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use prefstore_backend::{
    Backend, BackendExt, Context, MemoryBackend, OriginTag, Value, Watcher, WorkerContext,
};

/// Records the origin tags it sees and the thread it was invoked on.
#[derive(Default)]
struct TagRecorder {
    tags: Mutex<Vec<u64>>,
    threads: Mutex<Vec<thread::ThreadId>>,
}

impl TagRecorder {
    fn new() -> Arc<Self> {
        Arc::new(TagRecorder::default())
    }
}

impl Watcher for TagRecorder {
    fn changed(&self, _key: &str, origin: OriginTag) {
        self.tags.lock().push(origin.raw());
        self.threads.lock().push(thread::current().id());
    }
}

fn assert_strictly_increasing(tags: &[u64]) {
    for pair in tags.windows(2) {
        assert!(
            pair[0] < pair[1],
            "delivery order violated causal order: {} then {}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn context_watch_runs_only_on_the_context_thread() {
    let backend = Arc::new(MemoryBackend::new());
    let context = Arc::new(WorkerContext::spawn("notify"));
    let recorder = TagRecorder::new();

    backend.watch(&recorder, Some(context.clone() as Arc<dyn Context>));

    // Emit from several different threads.
    let mut writers = Vec::new();
    for i in 0..4u64 {
        let backend = backend.clone();
        writers.push(thread::spawn(move || {
            backend.write(
                &format!("/stress/ctx/{}", i),
                Value::from(i as i64),
                OriginTag::new(i),
            );
        }));
    }
    for writer in writers {
        writer.join().unwrap();
    }
    context.flush();

    let threads = recorder.threads.lock();
    assert_eq!(threads.len(), 4);
    for observed in threads.iter() {
        assert_eq!(*observed, context.thread_id());
    }
}

#[test]
fn synchronous_watch_sees_writes_in_causal_order() {
    let backend = Arc::new(MemoryBackend::new());
    let recorder = TagRecorder::new();
    backend.watch(&recorder, None);

    for i in 0..200u64 {
        backend.write("/stress/seq", Value::from(i as i64), OriginTag::new(i));
    }

    let tags = recorder.tags.lock();
    assert_eq!(tags.len(), 200);
    assert_strictly_increasing(&tags);
}

#[test]
fn context_queue_preserves_single_producer_order() {
    let backend = Arc::new(MemoryBackend::new());
    let context = Arc::new(WorkerContext::spawn("fifo"));
    let recorder = TagRecorder::new();
    backend.watch(&recorder, Some(context.clone() as Arc<dyn Context>));

    for i in 0..100u64 {
        backend.write("/stress/fifo", Value::from(i as i64), OriginTag::new(i));
    }
    context.flush();

    let tags = recorder.tags.lock();
    assert_eq!(tags.len(), 100);
    assert_strictly_increasing(&tags);
}

#[test]
fn targets_destroyed_mid_dispatch_are_safe() {
    let backend = Arc::new(MemoryBackend::new());
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let backend = backend.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let mut i = 0u64;
            while !stop.load(Ordering::Relaxed) {
                backend.write("/stress/churn", Value::from(i as i64), OriginTag::new(i));
                i += 1;
            }
            i
        })
    };

    // Churn watchers while the writer hammers the backend. Half are
    // unwatched politely; the other half are simply dropped so the registry
    // has to prune them.
    let mut survivors = Vec::new();
    for round in 0..100 {
        let recorder = TagRecorder::new();
        backend.watch(&recorder, None);
        thread::sleep(Duration::from_micros(200));

        match round % 4 {
            0 => {
                backend.unwatch(&recorder);
                drop(recorder);
            }
            1 => drop(recorder),
            _ => survivors.push(recorder),
        }
    }

    stop.store(true, Ordering::Relaxed);
    let total_writes = writer.join().unwrap();
    assert!(total_writes > 0);

    // Every surviving watcher observed a strictly increasing window of the
    // write sequence.
    for recorder in survivors {
        let tags = recorder.tags.lock();
        assert_strictly_increasing(&tags);
    }
}

#[test]
fn unwatch_does_not_cancel_posted_deliveries() {
    let backend = Arc::new(MemoryBackend::new());
    let context = Arc::new(WorkerContext::spawn("late"));
    let recorder = TagRecorder::new();
    backend.watch(&recorder, Some(context.clone() as Arc<dyn Context>));

    backend.write("/stress/late", Value::from(1i64), OriginTag::new(1));
    // The delivery may still be queued; unwatching now must not lose or
    // corrupt it.
    backend.unwatch(&recorder);
    context.flush();

    assert_eq!(*recorder.tags.lock(), vec![1]);
}

#[test]
fn dropping_the_last_local_reference_during_delivery_is_safe() {
    let backend = Arc::new(MemoryBackend::new());
    let context = Arc::new(WorkerContext::spawn("drop-race"));

    for i in 0..50u64 {
        let recorder = TagRecorder::new();
        backend.watch(&recorder, Some(context.clone() as Arc<dyn Context>));
        backend.write("/stress/drop", Value::from(i as i64), OriginTag::new(i));
        // The posted closure holds its own strong reference; dropping ours
        // immediately must not invalidate the in-flight delivery.
        drop(recorder);
    }

    context.flush();
}
