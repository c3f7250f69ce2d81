//! Binding of a [`ViewState`] to one of three render branches.
//!
//! The rendering layer owns the actual views; this module only decides which
//! branch runs and which builder produces it. Builders are looked up with the
//! priority *local options > ambient options > library default*, where the
//! library default is a [`Placeholder`] converted into the view type.

use crate::error::OperationError;
use crate::state::StaleData;
use crate::view_state::{ErrorMap, ViewState};
use std::fmt;
use std::rc::Rc;

/// Message shown for an error that no mapper recognises.
pub const DEFAULT_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Builds the loading view from the stale data, if any.
pub type LoadingBuilder<V> = Rc<dyn Fn(Option<&StaleData>) -> V>;

/// Builds the error view from the error map and the stale data, if any.
pub type ErrorBuilder<V> = Rc<dyn Fn(&ErrorMap, Option<&StaleData>) -> V>;

/// Turns an operation error into a user-facing message, or `None` to fall
/// through to [`DEFAULT_ERROR_MESSAGE`].
pub type ErrorMessageMapper = Rc<dyn Fn(&OperationError) -> Option<String>>;

/// The view the library renders when no builder is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// Something is still loading.
    Loading,
    /// Something failed.
    Error {
        /// Message for the first failed prop.
        message: String,
    },
}

/// Builders for the loading and error branches.
///
/// Passed down explicitly by the rendering layer. Unset fields fall through
/// to the next level in [`RenderOptions::resolve`].
pub struct RenderOptions<V> {
    loading: Option<LoadingBuilder<V>>,
    error: Option<ErrorBuilder<V>>,
    error_message: Option<ErrorMessageMapper>,
}

impl<V> Default for RenderOptions<V> {
    fn default() -> Self {
        Self {
            loading: None,
            error: None,
            error_message: None,
        }
    }
}

impl<V> Clone for RenderOptions<V> {
    fn clone(&self) -> Self {
        Self {
            loading: self.loading.clone(),
            error: self.error.clone(),
            error_message: self.error_message.clone(),
        }
    }
}

impl<V> fmt::Debug for RenderOptions<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOptions")
            .field("loading", &self.loading.is_some())
            .field("error", &self.error.is_some())
            .field("error_message", &self.error_message.is_some())
            .finish()
    }
}

impl<V> RenderOptions<V> {
    /// Options with nothing set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the loading builder.
    pub fn loading(mut self, builder: impl Fn(Option<&StaleData>) -> V + 'static) -> Self {
        self.loading = Some(Rc::new(builder));
        self
    }

    /// Set the error builder.
    pub fn error(
        mut self,
        builder: impl Fn(&ErrorMap, Option<&StaleData>) -> V + 'static,
    ) -> Self {
        self.error = Some(Rc::new(builder));
        self
    }

    /// Set the error message mapper used by the default error view.
    pub fn error_message(
        mut self,
        mapper: impl Fn(&OperationError) -> Option<String> + 'static,
    ) -> Self {
        self.error_message = Some(Rc::new(mapper));
        self
    }

    /// Merge per-instance options over ambient ones, field by field.
    pub fn resolve(local: Option<&Self>, ambient: Option<&Self>) -> Self {
        fn pick<T: Clone>(local: Option<&T>, ambient: Option<&T>) -> Option<T> {
            local.or(ambient).cloned()
        }

        Self {
            loading: pick(
                local.and_then(|o| o.loading.as_ref()),
                ambient.and_then(|o| o.loading.as_ref()),
            ),
            error: pick(
                local.and_then(|o| o.error.as_ref()),
                ambient.and_then(|o| o.error.as_ref()),
            ),
            error_message: pick(
                local.and_then(|o| o.error_message.as_ref()),
                ambient.and_then(|o| o.error_message.as_ref()),
            ),
        }
    }

    /// Message for the first error in `errors`.
    pub fn message_for(&self, errors: &ErrorMap) -> String {
        errors
            .values()
            .next()
            .and_then(|error| self.error_message.as_ref().and_then(|map| map(error)))
            .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_owned())
    }
}

/// Render `state` with `options`, calling `child` only when it is valid.
pub fn render_view_state<V>(
    state: &ViewState,
    options: &RenderOptions<V>,
    child: impl FnOnce() -> V,
) -> V
where
    V: From<Placeholder>,
{
    match state {
        ViewState::Valid => child(),
        ViewState::Error { errors, stale } => match &options.error {
            Some(builder) => builder(errors, stale.as_ref()),
            None => V::from(Placeholder::Error {
                message: options.message_for(errors),
            }),
        },
        ViewState::Pending { stale } => match &options.loading {
            Some(builder) => builder(stale.as_ref()),
            None => V::from(Placeholder::Loading),
        },
    }
}
