//! Cross-thread work queue drained on a window's owning thread.
//!
//! Any thread may enqueue; only the thread that created the queue may drain.
//! The pending list is swapped out under the lock and run outside it, so a
//! task that enqueues more work never deadlocks: the new work waits for the
//! next drain cycle. Once closed, a queue drops new work without waking anyone.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A deferred callback. It receives the thread-affine context it was queued
/// for (a window's browser) instead of capturing it.
pub type Task<T> = Box<dyn FnOnce(&mut T) + Send + 'static>;

/// Signals the owning thread that work is pending.
pub trait Wake: Send + Sync {
    fn wake(&self);
}

impl<F> Wake for F
where
    F: Fn() + Send + Sync,
{
    fn wake(&self) {
        self()
    }
}

struct Pending<T: ?Sized> {
    tasks: Vec<Task<T>>,
    closed: bool,
}

pub struct DispatchQueue<T: ?Sized> {
    pending: Mutex<Pending<T>>,
    waker: Arc<dyn Wake>,
    owner: ThreadId,
}

impl<T: ?Sized> DispatchQueue<T> {
    /// Create a queue owned by the calling thread.
    pub fn new(waker: Arc<dyn Wake>) -> Self {
        Self {
            pending: Mutex::new(Pending {
                tasks: Vec::new(),
                closed: false,
            }),
            waker,
            owner: thread::current().id(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pending<T>> {
        // Tasks never run under the lock, so a poisoned list is still consistent.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a task and wake the owning thread. Callable from any thread.
    /// A closed queue drops the task.
    pub fn enqueue(&self, task: Task<T>) {
        {
            let mut pending = self.lock();
            if pending.closed {
                debug!("dispatch queue closed, task dropped");
                return;
            }
            pending.tasks.push(task);
        }
        self.waker.wake();
    }

    /// Run every task queued before this call, in FIFO order.
    /// Returns the number of tasks run.
    pub fn drain(&self, context: &mut T) -> Result<usize> {
        if thread::current().id() != self.owner {
            warn!("refusing to drain dispatch queue off its owning thread");
            return Err(Error::ForeignThread);
        }
        let tasks = std::mem::take(&mut self.lock().tasks);
        let count = tasks.len();
        for task in tasks {
            task(&mut *context);
        }
        Ok(count)
    }

    /// Drop all pending tasks without running them and close the queue.
    pub fn discard(&self) -> usize {
        let dropped = {
            let mut pending = self.lock();
            pending.closed = true;
            std::mem::take(&mut pending.tasks).len()
        };
        if dropped > 0 {
            debug!(dropped, "discarded pending dispatch tasks");
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_owner(&self) -> bool {
        thread::current().id() == self.owner
    }
}

impl<T: ?Sized> fmt::Debug for DispatchQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("pending", &self.len())
            .field("owner", &self.owner)
            .finish()
    }
}

/// Cloneable handle for scheduling work onto a queue from any thread.
pub struct Dispatcher<T: ?Sized> {
    queue: Arc<DispatchQueue<T>>,
}

impl<T: ?Sized> Dispatcher<T> {
    pub fn new(queue: Arc<DispatchQueue<T>>) -> Self {
        Self { queue }
    }

    pub fn dispatch<F>(&self, f: F)
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        self.queue.enqueue(Box::new(f));
    }
}

impl<T: ?Sized> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dispatcher").field(&self.queue).finish()
    }
}
