use super::Prop;
use crate::executor::{self, DEFAULT_DEBOUNCE};
use crate::state::{AnyProp, AsAnyProp};
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::rc::Rc;
use std::time::Duration;

/// A prop that runs only the last operation of a burst.
///
/// Each call to [`debounce`](DebouncedProp::debounce) restarts a quiet
/// interval; when it elapses without another call, the most recent operation
/// runs exactly like [`Prop::run`]. Once an operation has started it is no
/// longer cancelled by later calls.
///
/// ```ignore
/// let results = DebouncedProp::with_delay(Duration::from_millis(250));
/// // on every keystroke:
/// results.debounce(move || search(query.clone()));
/// ```
pub struct DebouncedProp<T> {
    prop: Prop<T>,
    delay: Duration,
}

impl<T> Clone for DebouncedProp<T> {
    fn clone(&self) -> Self {
        Self {
            prop: self.prop.clone(),
            delay: self.delay,
        }
    }
}

impl<T> fmt::Debug for DebouncedProp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebouncedProp")
            .field("prop", &self.prop)
            .field("delay", &self.delay)
            .field("timer_pending", &self.prop.core.task.is_occupied())
            .finish()
    }
}

impl<T: 'static> Default for DebouncedProp<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> DebouncedProp<T> {
    /// An empty prop using [`DEFAULT_DEBOUNCE`].
    pub fn new() -> Self {
        Self::with_delay(DEFAULT_DEBOUNCE)
    }

    /// An empty prop with a custom quiet interval.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            prop: Prop::empty(),
            delay,
        }
    }

    /// The quiet interval.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether a timer is waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.prop.core.task.is_occupied()
    }

    /// Schedule `op` to run after the quiet interval, replacing any operation
    /// that is still waiting.
    ///
    /// Must be called inside a `tokio::task::LocalSet`.
    pub fn debounce<F, Fut, E>(&self, op: F)
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        let core = Rc::clone(&self.prop.core);
        if core.is_disposed() {
            tracing::warn!(prop = ?core.id(), "debounce on a disposed prop ignored");
            return;
        }
        let delay = self.delay;
        let epoch = core.task.renew();
        let timer = executor::spawn(async move {
            tokio::time::sleep(delay).await;
            // From here on a newer call must not abort this run.
            if !core.task.release(epoch) {
                return;
            }
            core.begin();
            let outcome = op().await;
            core.settle(outcome);
        });
        self.prop.core.task.install(epoch, timer);
    }

    /// Drop the waiting operation, if any.
    pub fn cancel(&self) -> bool {
        self.prop.core.task.cancel()
    }
}

impl<T> Deref for DebouncedProp<T> {
    type Target = Prop<T>;

    fn deref(&self) -> &Prop<T> {
        &self.prop
    }
}

impl<T: Clone + 'static> AsAnyProp for DebouncedProp<T> {
    fn as_any_prop(&self) -> AnyProp {
        self.prop.as_any_prop()
    }
}
