//! Aggregation of prop states into a [`ViewState`].
//!
//! The default policy is strict priority: any error wins, then anything that
//! is not valid makes the view pending, otherwise the view is valid. A shell
//! can swap in its own [`Resolver`] with full authority over the outcome.

use crate::state::AnyProp;
use crate::view_state::{ErrorMap, ViewState};
use std::rc::Rc;

/// Custom aggregation policy. Receives the shell's props in order.
pub type Resolver = Rc<dyn Fn(&[AnyProp]) -> ViewState>;

/// The default aggregation.
///
/// - Any failed prop: [`ViewState::Error`] with every failed prop, stale data
///   from the first one. Loading props do not matter.
/// - Otherwise any loading or initial prop: [`ViewState::Pending`] with the
///   stale data of the first such prop.
/// - Otherwise [`ViewState::Valid`].
pub fn resolve(props: &[AnyProp]) -> ViewState {
    let mut errors = ErrorMap::default();
    let mut error_stale = None;

    for prop in props {
        if let Some(error) = prop.error() {
            if errors.is_empty() {
                error_stale = prop.stale_value();
            }
            errors.insert(prop.id(), error);
        }
    }

    if !errors.is_empty() {
        return ViewState::Error {
            errors,
            stale: error_stale,
        };
    }

    match props.iter().find(|prop| !prop.is_valid()) {
        Some(blocking) => ViewState::Pending {
            stale: blocking.stale_value(),
        },
        None => ViewState::Valid,
    }
}
