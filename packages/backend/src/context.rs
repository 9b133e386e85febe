//! Dispatch contexts: where a watch wants its callbacks to run.
//!
//! A watch registered with a context never has its callback invoked
//! anywhere else; the dispatcher posts a closure to the context's work
//! queue and returns immediately. A watch registered without a context is
//! invoked synchronously on whatever thread emitted the signal.

use std::thread;

use crossbeam_channel::{unbounded, Sender};

/// A unit of work handed to a context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// An execution context that can run posted work.
///
/// Implementations must eventually run every posted task, in the order
/// their queue defines. The core makes no ordering promise across contexts.
pub trait Context: Send + Sync {
    /// Queue `task` for execution on this context.
    fn post(&self, task: Task);
}

enum Message {
    Run(Task),
    Shutdown,
}

/// A [`Context`] backed by a dedicated worker thread draining a FIFO queue.
///
/// # Example
///
/// ```rust
/// use prefstore_backend::{Context, WorkerContext};
///
/// let context = WorkerContext::spawn("settings-notify");
/// context.post(Box::new(|| println!("runs on the worker thread")));
/// context.flush();
/// ```
pub struct WorkerContext {
    sender: Sender<Message>,
    worker: Option<thread::JoinHandle<()>>,
    worker_thread: thread::ThreadId,
}

impl WorkerContext {
    /// Spawn a worker thread with the given name.
    pub fn spawn(name: &str) -> Self {
        let (sender, receiver) = unbounded::<Message>();
        let (id_tx, id_rx) = unbounded();

        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _ = id_tx.send(thread::current().id());
                for message in receiver {
                    match message {
                        Message::Run(task) => task(),
                        Message::Shutdown => break,
                    }
                }
            })
            .expect("failed to spawn context worker thread");

        let worker_thread = id_rx.recv().expect("context worker thread died at startup");

        WorkerContext {
            sender,
            worker: Some(worker),
            worker_thread,
        }
    }

    /// The id of the thread that services this context.
    pub fn thread_id(&self) -> thread::ThreadId {
        self.worker_thread
    }

    /// Block until every task posted before this call has run.
    pub fn flush(&self) {
        let (done_tx, done_rx) = unbounded();
        self.post(Box::new(move || {
            let _ = done_tx.send(());
        }));
        let _ = done_rx.recv();
    }
}

impl Context for WorkerContext {
    fn post(&self, task: Task) {
        if self.sender.send(Message::Run(task)).is_err() {
            log::warn!("context worker is gone; dropping posted task");
        }
    }
}

impl Drop for WorkerContext {
    fn drop(&mut self) {
        let _ = self.sender.send(Message::Shutdown);
        if let Some(worker) = self.worker.take() {
            // Joining from the worker itself would deadlock; that can only
            // happen if the last reference is dropped inside a posted task.
            if thread::current().id() != self.worker_thread {
                let _ = worker.join();
            }
        }
    }
}
