//! Background work for self-driving props
//!
//! Props that drive themselves (a [`FutureProp`](crate::FutureProp) settling, a
//! [`StreamProp`](crate::StreamProp) subscription, a
//! [`DebouncedProp`](crate::DebouncedProp) timer) run their work as local tasks
//! on the current thread:
//!
//! - **Local tasks**: everything is spawned with `tokio::task::spawn_local`, so
//!   prop state never crosses threads and needs no locking. The caller must be
//!   running inside a `tokio::task::LocalSet`.
//!
//! - **Task slot**: each prop owns at most one cancellable background task
//!   (its stream subscription or its pending debounce timer). Renewing the slot
//!   aborts the previous task and starts a new epoch; disposing the prop aborts
//!   whatever is left.
//!
//! ## Usage
//!
//! ```ignore
//! let local = tokio::task::LocalSet::new();
//! local.run_until(async {
//!     let user = FutureProp::new(async { fetch_user().await });
//!     // ...
//! }).await;
//! ```

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::time::Duration;
use tokio::task::AbortHandle;

/// Default quiet interval for [`DebouncedProp`](crate::DebouncedProp).
///
/// Only the last call made within this window runs.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Handle to a spawned local task. Aborting a finished task is a no-op.
#[derive(Debug)]
pub(crate) struct TaskHandle {
    abort: AbortHandle,
}

impl TaskHandle {
    pub(crate) fn abort(&self) {
        self.abort.abort();
    }
}

/// Spawn `future` on the current `LocalSet`.
///
/// Panics (inside tokio) when called outside a `LocalSet`.
pub(crate) fn spawn<F>(future: F) -> TaskHandle
where
    F: Future<Output = ()> + 'static,
{
    let handle = tokio::task::spawn_local(future);
    TaskHandle {
        abort: handle.abort_handle(),
    }
}

/// A single cancellable background task owned by a prop.
///
/// Every [`renew`](TaskSlot::renew) or [`cancel`](TaskSlot::cancel) starts a
/// new epoch. A task captures the epoch it was spawned for and checks it with
/// [`is_current`](TaskSlot::is_current) before touching the prop: aborting
/// only takes effect at the task's next suspension point, so a superseded
/// task may still be running synchronously when it is replaced.
#[derive(Debug, Default)]
pub(crate) struct TaskSlot {
    current: RefCell<Option<TaskHandle>>,
    epoch: Cell<u64>,
}

impl TaskSlot {
    /// Abort the current task and open a new epoch for its successor.
    pub(crate) fn renew(&self) -> u64 {
        self.cancel();
        self.epoch.get()
    }

    /// Store the task spawned for `epoch`.
    ///
    /// If the epoch already ended (a listener cancelled or renewed the slot
    /// in between), the task is aborted instead.
    pub(crate) fn install(&self, epoch: u64, task: TaskHandle) -> bool {
        if !self.is_current(epoch) {
            task.abort();
            return false;
        }
        if let Some(previous) = self.current.borrow_mut().replace(task) {
            previous.abort();
        }
        true
    }

    /// Abort and clear the current task, ending its epoch. Returns whether
    /// one was present.
    pub(crate) fn cancel(&self) -> bool {
        self.epoch.set(self.epoch.get().wrapping_add(1));
        match self.current.borrow_mut().take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.epoch.get() == epoch
    }

    /// Forget the task of `epoch` without aborting it.
    ///
    /// A task calls this on its own slot once it no longer wants to be
    /// cancelled. Returns false when `epoch` is over.
    pub(crate) fn release(&self, epoch: u64) -> bool {
        if !self.is_current(epoch) {
            return false;
        }
        self.current.borrow_mut().take();
        true
    }

    pub(crate) fn is_occupied(&self) -> bool {
        self.current.borrow().is_some()
    }
}
