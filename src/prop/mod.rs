//! Observable property containers.
//!
//! Every prop variant is a thin handle over one shared core: the lifecycle
//! state, the (possibly stale) value, the captured error, the listener list and
//! a single background-task slot. Variants differ only in which operations they
//! expose and in what drives the core:
//!
//! - [`Prop`]: driven manually (`set`, `run`, `transform`, ...).
//! - [`SyncProp`]: always `Success`, updated synchronously.
//! - [`FutureProp`]: drives itself from a future.
//! - [`StreamProp`]: drives itself from a stream subscription.
//! - [`DebouncedProp`]: runs only the last operation of a burst.
//! - [`PaginatedProp`]: fetches pages through a replaceable fetcher.
//!
//! # Notifications
//!
//! Each externally visible transition emits exactly one notification. An async
//! `run` emits twice: once on entering `Loading` (synchronously, before the
//! first await point) and once on settling. Operations are not queued; if two
//! runs overlap, whichever settles last decides the value.

mod debounce;
mod future;
mod paginated;
mod stream;
mod sync;

pub use debounce::DebouncedProp;
pub use future::FutureProp;
pub use paginated::{PageFetcher, PaginatedProp};
pub use stream::StreamProp;
pub use sync::SyncProp;

use crate::error::{Error, OperationError};
use crate::executor::TaskSlot;
use crate::notifier::{ListenerId, Notifier};
use crate::state::{AnyProp, AsAnyProp, PropBase, PropId, PropState, StaleData};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

/// Mutable fields of a prop.
///
/// `error` is `Some` exactly when `state` is `Error`. `value` survives loading
/// and error states and is only cleared by `reset`.
pub(crate) struct PropCell<T> {
    pub(crate) state: PropState,
    pub(crate) value: Option<T>,
    pub(crate) error: Option<OperationError>,
}

pub(crate) struct PropCore<T> {
    id: PropId,
    cell: RefCell<PropCell<T>>,
    listeners: Notifier,
    /// Stream subscription or debounce timer, depending on the variant.
    pub(crate) task: TaskSlot,
    disposed: Cell<bool>,
}

impl<T> PropCore<T> {
    pub(crate) fn new(state: PropState, value: Option<T>) -> Self {
        Self {
            id: PropId::next(),
            cell: RefCell::new(PropCell {
                state,
                value,
                error: None,
            }),
            listeners: Notifier::new(),
            task: TaskSlot::default(),
            disposed: Cell::new(false),
        }
    }

    pub(crate) fn id(&self) -> PropId {
        self.id
    }

    pub(crate) fn state(&self) -> PropState {
        self.cell.borrow().state
    }

    pub(crate) fn with_cell<R>(&self, f: impl FnOnce(&PropCell<T>) -> R) -> R {
        f(&self.cell.borrow())
    }

    /// Mutate the fields without notifying.
    ///
    /// Returns false (and changes nothing) once the prop is disposed.
    pub(crate) fn update(&self, f: impl FnOnce(&mut PropCell<T>)) -> bool {
        if self.disposed.get() {
            tracing::warn!(prop = ?self.id, "mutation of a disposed prop dropped");
            return false;
        }

        let mut cell = self.cell.borrow_mut();
        let from = cell.state;
        f(&mut cell);
        let to = cell.state;
        debug_assert_eq!(cell.error.is_some(), to == PropState::Error);
        drop(cell);

        if from != to {
            tracing::debug!(prop = ?self.id, ?from, ?to, "prop state changed");
        }
        true
    }

    pub(crate) fn notify(&self) {
        tracing::trace!(prop = ?self.id, listeners = self.listeners.len(), "prop notifying");
        self.listeners.notify();
    }

    /// Apply `f` and emit one notification if it was applied.
    pub(crate) fn mutate(&self, f: impl FnOnce(&mut PropCell<T>)) {
        if self.update(f) {
            self.notify();
        }
    }

    pub(crate) fn set(&self, value: T) {
        self.mutate(|cell| {
            cell.state = PropState::Success;
            cell.value = Some(value);
            cell.error = None;
        });
    }

    /// First phase of a run: enter `Loading`, keeping the stale value.
    pub(crate) fn begin(&self) {
        self.mutate(|cell| {
            cell.state = PropState::Loading;
            cell.error = None;
        });
    }

    /// Record the outcome of an operation without notifying.
    ///
    /// Returns true when the outcome was a success that got applied.
    pub(crate) fn finish<E>(&self, outcome: Result<T, E>) -> bool
    where
        E: Into<anyhow::Error>,
    {
        match outcome {
            Ok(value) => self.update(|cell| {
                cell.state = PropState::Success;
                cell.value = Some(value);
                cell.error = None;
            }),
            Err(error) => {
                let error = OperationError::new(error);
                tracing::debug!(prop = ?self.id, error = %error, "operation failed");
                self.update(|cell| {
                    cell.state = PropState::Error;
                    cell.error = Some(error);
                });
                false
            }
        }
    }

    /// Second phase of a run: record the outcome and notify.
    pub(crate) fn settle<E>(&self, outcome: Result<T, E>)
    where
        E: Into<anyhow::Error>,
    {
        self.finish(outcome);
        if !self.disposed.get() {
            self.notify();
        }
    }

    pub(crate) fn reset(&self) {
        self.mutate(|cell| {
            cell.state = PropState::Initial;
            cell.value = None;
            cell.error = None;
        });
    }

    /// Refused with a warning once the prop is disposed; the returned id is
    /// then never attached.
    pub(crate) fn subscribe(&self, listener: Rc<dyn Fn()>) -> ListenerId {
        if self.disposed.get() {
            tracing::warn!(prop = ?self.id, "subscription to a disposed prop refused");
            return ListenerId::DETACHED;
        }
        self.listeners.add(listener)
    }

    pub(crate) fn unsubscribe(&self, id: ListenerId) {
        self.listeners.remove(id);
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.task.cancel();
        self.listeners.clear();
        tracing::debug!(prop = ?self.id, "prop disposed");
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

impl<T: Clone> PropCore<T> {
    pub(crate) fn value(&self) -> Option<T> {
        self.cell.borrow().value.clone()
    }

    pub(crate) fn require(&self) -> Result<T, Error> {
        let cell = self.cell.borrow();
        match (cell.state, &cell.value) {
            (PropState::Success, Some(value)) => Ok(value.clone()),
            (state, _) => Err(Error::InvalidState { state }),
        }
    }

    /// The current value, if the prop is `Success`. Transforms only apply then.
    pub(crate) fn transformable(&self) -> Option<T> {
        let cell = self.cell.borrow();
        match cell.state {
            PropState::Success => cell.value.clone(),
            _ => {
                cov_mark::hit!(transform_skipped_when_not_success);
                None
            }
        }
    }
}

impl<T: Clone + 'static> PropBase for PropCore<T> {
    fn id(&self) -> PropId {
        self.id
    }

    fn state(&self) -> PropState {
        PropCore::state(self)
    }

    fn error(&self) -> Option<OperationError> {
        self.cell.borrow().error.clone()
    }

    fn stale_value(&self) -> Option<StaleData> {
        self.value().map(|value| Rc::new(value) as StaleData)
    }

    fn subscribe(&self, listener: Rc<dyn Fn()>) -> ListenerId {
        PropCore::subscribe(self, listener)
    }

    fn unsubscribe(&self, id: ListenerId) {
        PropCore::unsubscribe(self, id);
    }

    fn dispose(&self) {
        PropCore::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        PropCore::is_disposed(self)
    }
}

/// A manually driven prop.
///
/// `Prop` is a cheap handle; clones observe and mutate the same prop.
///
/// ```ignore
/// let user = Prop::<User>::empty();
/// user.run(async { api.fetch_user().await }).await;
///
/// match user.require() {
///     Ok(user) => println!("hello {}", user.name),
///     Err(err) => println!("not ready: {err}"),
/// }
/// ```
pub struct Prop<T> {
    pub(crate) core: Rc<PropCore<T>>,
}

impl<T> Clone for Prop<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T> fmt::Debug for Prop<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prop")
            .field("id", &self.core.id())
            .field("state", &self.core.state())
            .finish_non_exhaustive()
    }
}

impl<T> Prop<T> {
    /// A prop with no value, in the `Initial` state.
    pub fn empty() -> Self {
        Self::from_core(PropCore::new(PropState::Initial, None))
    }

    /// A prop holding `value`, in the `Success` state.
    pub fn new(value: T) -> Self {
        Self::from_core(PropCore::new(PropState::Success, Some(value)))
    }

    pub(crate) fn from_core(core: PropCore<T>) -> Self {
        Self {
            core: Rc::new(core),
        }
    }

    /// Identity of this prop.
    pub fn id(&self) -> PropId {
        self.core.id()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PropState {
        self.core.state()
    }

    /// Borrow the current (possibly stale) value.
    ///
    /// The prop stays borrowed while `f` runs; mutating it from `f` panics.
    /// Use [`value`](Prop::value) to work on a copy instead.
    pub fn with_value<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        self.core.with_cell(|cell| f(cell.value.as_ref()))
    }

    /// The captured error, present exactly in the `Error` state.
    pub fn error(&self) -> Option<OperationError> {
        self.core.with_cell(|cell| cell.error.clone())
    }

    /// Replace the value and move to `Success`.
    pub fn set(&self, value: T) {
        self.core.set(value);
    }

    /// Run `op`, moving to `Loading` and then to `Success` or `Error`.
    ///
    /// Errors are captured into the prop, never returned.
    pub async fn run<F, E>(&self, op: F)
    where
        F: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        self.core.begin();
        let outcome = op.await;
        self.core.settle(outcome);
    }

    /// Run a synchronous operation and settle with its outcome.
    ///
    /// Nothing can observe the prop while `op` runs, so only the settled
    /// state is notified.
    pub fn run_sync<E>(&self, op: impl FnOnce() -> Result<T, E>)
    where
        E: Into<anyhow::Error>,
    {
        self.core.settle(op());
    }

    /// Clear value and error, back to `Initial`.
    pub fn reset(&self) {
        self.core.reset();
    }

    /// Attach a change listener.
    pub fn subscribe(&self, listener: impl Fn() + 'static) -> ListenerId {
        self.core.subscribe(Rc::new(listener))
    }

    /// Detach a change listener.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.core.unsubscribe(id);
    }

    /// Release listeners and background work. Later mutations are dropped.
    pub fn dispose(&self) {
        self.core.dispose();
    }
}

impl<T: Clone> Prop<T> {
    /// The current (possibly stale) value.
    pub fn value(&self) -> Option<T> {
        self.core.value()
    }

    /// The value, if and only if the prop is `Success`.
    ///
    /// Fails with [`Error::InvalidState`] naming the blocking state otherwise.
    pub fn require(&self) -> Result<T, Error> {
        self.core.require()
    }

    /// Run `op` against the current value.
    ///
    /// Silently does nothing unless the prop is `Success`.
    pub async fn transform<F, Fut, E>(&self, op: F)
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        let Some(current) = self.core.transformable() else {
            return;
        };
        self.run(op(current)).await;
    }

    /// Synchronous [`transform`](Prop::transform).
    pub fn transform_sync<E>(&self, op: impl FnOnce(&T) -> Result<T, E>)
    where
        E: Into<anyhow::Error>,
    {
        let Some(current) = self.core.transformable() else {
            return;
        };
        self.core.settle(op(&current));
    }
}

impl<T: Clone + 'static> AsAnyProp for Prop<T> {
    fn as_any_prop(&self) -> AnyProp {
        Rc::clone(&self.core) as AnyProp
    }
}
