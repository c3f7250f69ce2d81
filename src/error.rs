//! Error types.
//!
//! Two families of failure exist and they never mix:
//!
//! - [`OperationError`]: whatever a wrapped operation failed with. It is captured
//!   into the prop that ran the operation and surfaced through
//!   [`ViewState::Error`](crate::ViewState::Error). It is never returned to the
//!   caller of `run`.
//! - [`Error`]: a usage error (a violated precondition). These are always
//!   returned to the caller and never recovered internally.

use crate::shell::ActionKey;
use crate::state::PropState;
use std::backtrace::Backtrace;
use std::fmt;
use std::rc::Rc;

/// Usage errors surfaced by precondition-checked operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// `require` was called on a prop that is not in the `Success` state.
    #[error("prop value is not available while the prop is {state:?}")]
    InvalidState {
        /// The state that blocked access.
        state: PropState,
    },

    /// `shell_return_for_action` was called but nothing awaits that action.
    #[error("no pending call for action `{action}`")]
    NoPendingAction {
        /// The action that had nothing pending.
        action: ActionKey,
    },

    /// The value handed to `shell_return_for_action` has a different type than
    /// the intercepted `shell_run` call expects.
    #[error("value supplied for action `{action}` does not match the awaited output type")]
    ActionOutputMismatch {
        /// The action whose pending entry rejected the value.
        action: ActionKey,
    },

    /// An observer tried to register outside of an active render pass.
    #[error("observers can only be registered during a render pass")]
    OutsideRenderPass,

    /// The observer handle was released or belongs to another registry.
    #[error("observer is not registered")]
    UnknownObserver,

    /// The shell was disposed.
    #[error("shell has been disposed")]
    Disposed,
}

/// An error captured from a wrapped operation.
///
/// Cheap to clone; every clone refers to the same underlying error so the
/// prop, the aggregated view state and the rendering layer all share one
/// value.
#[derive(Clone)]
pub struct OperationError {
    inner: Rc<anyhow::Error>,
}

impl OperationError {
    /// Wrap an error produced by an operation.
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: Rc::new(error.into()),
        }
    }

    /// The captured error.
    pub fn error(&self) -> &anyhow::Error {
        &self.inner
    }

    /// Backtrace captured where the error was first converted.
    ///
    /// Only populated when backtraces are enabled (`RUST_BACKTRACE`/`RUST_LIB_BACKTRACE`).
    pub fn backtrace(&self) -> &Backtrace {
        self.inner.backtrace()
    }

    /// Attempt to downcast the captured error to a concrete type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.inner.downcast_ref::<E>()
    }

    /// Whether two handles refer to the same captured error.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner, f)
    }
}
