//! The aggregate state of a set of props.

use crate::error::OperationError;
use crate::hash::IdIndexMap;
use crate::state::{PropId, StaleData};
use std::fmt;

/// Errors of every failed prop, keyed by prop and kept in prop order.
pub type ErrorMap = IdIndexMap<PropId, OperationError>;

/// Three-way classification of a set of props.
#[derive(Clone)]
pub enum ViewState {
    /// Every prop holds a current value.
    Valid,
    /// At least one prop failed.
    Error {
        /// Every failed prop with its error.
        errors: ErrorMap,
        /// Last known value of the first failed prop.
        stale: Option<StaleData>,
    },
    /// Nothing failed, but at least one prop is loading or not loaded yet.
    Pending {
        /// Last known value of the first prop that is not valid.
        stale: Option<StaleData>,
    },
}

/// The tag of a [`ViewState`], without payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewStateKind {
    /// See [`ViewState::Valid`].
    Valid,
    /// See [`ViewState::Error`].
    Error,
    /// See [`ViewState::Pending`].
    Pending,
}

impl ViewState {
    /// A pending state with no stale data.
    pub fn pending() -> Self {
        ViewState::Pending { stale: None }
    }

    /// The tag of this state.
    pub fn kind(&self) -> ViewStateKind {
        match self {
            ViewState::Valid => ViewStateKind::Valid,
            ViewState::Error { .. } => ViewStateKind::Error,
            ViewState::Pending { .. } => ViewStateKind::Pending,
        }
    }

    /// Whether this state is [`ViewState::Valid`].
    pub fn is_valid(&self) -> bool {
        matches!(self, ViewState::Valid)
    }

    /// Whether this state is [`ViewState::Error`].
    pub fn is_error(&self) -> bool {
        matches!(self, ViewState::Error { .. })
    }

    /// Whether this state is [`ViewState::Pending`].
    pub fn is_pending(&self) -> bool {
        matches!(self, ViewState::Pending { .. })
    }

    /// The error map, if this is an error state.
    pub fn errors(&self) -> Option<&ErrorMap> {
        match self {
            ViewState::Error { errors, .. } => Some(errors),
            _ => None,
        }
    }

    /// The stale data carried by an error or pending state, as `T`.
    ///
    /// `None` when there is no stale data or it is not a `T`.
    pub fn stale_data<T: 'static>(&self) -> Option<&T> {
        match self {
            ViewState::Error { stale, .. } | ViewState::Pending { stale } => {
                stale.as_ref().and_then(|data| data.downcast_ref::<T>())
            }
            ViewState::Valid => None,
        }
    }
}

impl fmt::Debug for ViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewState::Valid => f.write_str("Valid"),
            ViewState::Error { errors, stale } => f
                .debug_struct("Error")
                .field("errors", errors)
                .field("has_stale", &stale.is_some())
                .finish(),
            ViewState::Pending { stale } => f
                .debug_struct("Pending")
                .field("has_stale", &stale.is_some())
                .finish(),
        }
    }
}
