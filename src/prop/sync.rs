use super::PropCore;
use crate::notifier::ListenerId;
use crate::state::{AnyProp, AsAnyProp, PropId, PropState};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A prop that always holds a value.
///
/// Constructed with a mandatory value and never leaves `Success`, so a
/// resolver never sees it as pending or failed. The value lives next to the
/// lifecycle cell rather than inside it, which keeps it readable from
/// listeners while a change is being announced.
pub struct SyncProp<T> {
    value: Rc<RefCell<T>>,
    core: Rc<PropCore<()>>,
}

impl<T> Clone for SyncProp<T> {
    fn clone(&self) -> Self {
        Self {
            value: Rc::clone(&self.value),
            core: Rc::clone(&self.core),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SyncProp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncProp")
            .field("id", &self.core.id())
            .field("value", &self.value.try_borrow().ok())
            .finish()
    }
}

impl<T> SyncProp<T> {
    /// A prop holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            value: Rc::new(RefCell::new(value)),
            core: Rc::new(PropCore::new(PropState::Success, None)),
        }
    }

    /// Identity of this prop.
    pub fn id(&self) -> PropId {
        self.core.id()
    }

    /// Borrow the value.
    ///
    /// The value stays borrowed while `f` runs; calling [`set`](Self::set)
    /// or [`transform`](Self::transform) from `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    /// Replace the value. Dropped once the prop is disposed.
    pub fn set(&self, value: T) {
        let slot = &self.value;
        let applied = self.core.update(|cell| {
            cell.state = PropState::Success;
            *slot.borrow_mut() = value;
        });
        if applied {
            self.core.notify();
        }
    }

    /// Replace the value with `op` applied to the current one.
    ///
    /// `op` runs under the same borrow as [`with`](Self::with).
    pub fn transform(&self, op: impl FnOnce(&T) -> T) {
        let next = self.with(op);
        self.set(next);
    }

    /// Attach a change listener.
    pub fn subscribe(&self, listener: impl Fn() + 'static) -> ListenerId {
        self.core.subscribe(Rc::new(listener))
    }

    /// Detach a change listener.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.core.unsubscribe(id);
    }

    /// Release the listeners. Later writes are dropped.
    pub fn dispose(&self) {
        self.core.dispose();
    }
}

impl<T: Clone> SyncProp<T> {
    /// A copy of the value.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }
}

impl<T> AsAnyProp for SyncProp<T> {
    fn as_any_prop(&self) -> AnyProp {
        Rc::clone(&self.core) as AnyProp
    }
}
