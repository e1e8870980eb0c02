//! Dispatch core: a single owning worker thread draining a FIFO of tasks.
//!
//! Every native call of a backend runs on the worker of that backend's [`Dispatcher`], the
//! "UI thread". Tasks submitted by one thread run in submission order; across threads they
//! run in the order the queue observes them.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a UI worker thread. Cheap to clone; all clones feed the same queue.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    thread_id: ThreadId,
    // `None` once shut down. The worker exits when the last sender is dropped, so this must
    // stay the only sender.
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.inner.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Dispatcher {
    /// Spawns the worker thread.
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Task>();

        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker(receiver))?;

        debug!(thread = %name, "Spawned dispatch worker");

        Ok(Dispatcher {
            inner: Arc::new(Inner {
                thread_id: worker.thread().id(),
                name,
                sender: Mutex::new(Some(sender)),
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the calling thread is this dispatcher's worker.
    pub fn is_ui_thread(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Enqueues a task and returns immediately.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> Result<()> {
        let guard = self
            .inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(Error::QueueClosed)?;
        sender.send(Box::new(task)).map_err(|_| Error::QueueClosed)
    }

    /// Enqueues a task and blocks until it has run, returning its value.
    ///
    /// Called from the UI thread itself the task runs inline, since waiting on the queue from
    /// its own consumer could never complete.
    pub fn submit_and_wait<R, F>(&self, task: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_ui_thread() {
            trace!(thread = %self.inner.name, "submit_and_wait on UI thread, running inline");
            return Ok(task());
        }

        let (tx, rx) = mpsc::sync_channel(1);
        self.submit(move || {
            let _ = tx.send(task());
        })?;

        rx.recv().map_err(|_| Error::NativeOpFailed {
            op: "submit_and_wait",
            reason: "task panicked before producing a value".to_string(),
        })
    }

    /// Stops accepting work, drains what is queued and joins the worker. Idempotent.
    ///
    /// Every caller returns only once the worker has finished, including callers that lost
    /// the race to close the queue.
    pub fn shutdown(&self) {
        self.close(None);
    }

    /// Like [`Dispatcher::shutdown`], with `last` queued as the final task.
    ///
    /// `last` is enqueued under the same lock that closes the queue, so no other submission
    /// can run after it. It is dropped unrun if the queue was already closed.
    pub fn shutdown_with(&self, last: impl FnOnce() + Send + 'static) {
        self.close(Some(Box::new(last)));
    }

    fn close(&self, last: Option<Task>) {
        {
            let mut sender = self
                .inner
                .sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(sender) = sender.take() {
                if let Some(task) = last {
                    let _ = sender.send(task);
                }
                debug!(thread = %self.inner.name, "Dispatch queue closed");
            }
        }

        if self.is_ui_thread() {
            // The worker exits on its own once the current task returns and the queue is empty.
            trace!(thread = %self.inner.name, "Shutdown requested from the UI thread, not joining");
            return;
        }

        // Held across the join so concurrent callers wait for the drain too.
        let mut worker = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                warn!(thread = %self.inner.name, "Dispatch worker terminated abnormally");
            } else {
                debug!(thread = %self.inner.name, "Dispatch worker joined");
            }
        }
    }
}

fn run_worker(receiver: mpsc::Receiver<Task>) {
    // `recv` keeps yielding queued tasks after the sender is dropped, so shutdown drains.
    while let Ok(task) = receiver.recv() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            error!(panic = panic_message(payload.as_ref()), "UI task panicked");
        }
    }
    trace!("Dispatch queue closed, worker exiting");
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}
