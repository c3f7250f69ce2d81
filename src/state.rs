//! The lifecycle state shared by every prop and the type-erased prop interface.

use crate::error::OperationError;
use crate::notifier::ListenerId;
use std::any::Any;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle state of a single prop.
///
/// Which transitions are legal is decided by each prop variant; a
/// [`SyncProp`](crate::SyncProp) for example never leaves `Success`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropState {
    /// Nothing has been loaded yet.
    Initial,
    /// An operation is in flight.
    Loading,
    /// The last operation succeeded; the value is current.
    Success,
    /// The last operation failed; the error is available.
    Error,
}

static NEXT_PROP_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a prop.
///
/// Unique for the lifetime of the process; used as the key of the error map
/// and of the observation registry.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
pub struct PropId(u64);

impl PropId {
    pub(crate) fn next() -> Self {
        Self(NEXT_PROP_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The last value a prop held, type-erased so aggregated view states can carry it.
///
/// Use [`ViewState::stale_data`](crate::ViewState::stale_data) to get it back
/// as a concrete type.
pub type StaleData = Rc<dyn Any>;

/// Type-erased interface every prop variant exposes to shells, resolvers and
/// the observation registry.
pub trait PropBase {
    /// Identity of the prop.
    fn id(&self) -> PropId;

    /// Current lifecycle state.
    fn state(&self) -> PropState;

    /// The captured error. `Some` exactly when the state is `Error`.
    fn error(&self) -> Option<OperationError>;

    /// The last known value, if any, regardless of state.
    fn stale_value(&self) -> Option<StaleData>;

    /// Attach a change listener.
    fn subscribe(&self, listener: Rc<dyn Fn()>) -> ListenerId;

    /// Detach a change listener. Unknown ids are ignored.
    fn unsubscribe(&self, id: ListenerId);

    /// Release background work and listeners. Idempotent.
    fn dispose(&self);

    /// Whether [`dispose`](PropBase::dispose) has run.
    fn is_disposed(&self) -> bool;

    /// The prop holds a current value.
    fn is_valid(&self) -> bool {
        self.state() == PropState::Success
    }

    /// An operation is in flight.
    fn is_loading(&self) -> bool {
        self.state() == PropState::Loading
    }

    /// Nothing has been loaded yet.
    fn is_initial(&self) -> bool {
        self.state() == PropState::Initial
    }

    /// The last operation failed.
    fn has_error(&self) -> bool {
        self.state() == PropState::Error
    }
}

/// Shared, type-erased handle to a prop.
pub type AnyProp = Rc<dyn PropBase>;

/// Conversion from a concrete prop variant to its type-erased handle.
pub trait AsAnyProp {
    /// A handle that observes the same prop.
    fn as_any_prop(&self) -> AnyProp;
}

impl AsAnyProp for AnyProp {
    fn as_any_prop(&self) -> AnyProp {
        Rc::clone(self)
    }
}
