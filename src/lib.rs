#![deny(missing_docs)]

//! Observable state containers for views backed by asynchronous data.
//!
//! Each piece of view data lives in a prop that tracks its own fetch lifecycle
//! (initial, loading, success, error). A [`Shell`] aggregates its props into
//! one [`ViewState`] and only notifies when the *kind* of that state changes.
//! Fine-grained UI fragments bind to single props through the
//! [`ObservationRegistry`] and are invalidated only when those props change.
//!
//! Everything is single-threaded. Background work (futures, streams,
//! debounce timers) runs on the current thread through
//! `tokio::task::spawn_local`, so it needs a `tokio::task::LocalSet`.
//!
//! # Quick Start
//!
//! ```ignore
//! use propshell::{AsAnyProp, FutureProp, Shell, SyncProp, ViewState};
//!
//! let user = FutureProp::new(async { api.fetch_user().await });
//! let filter = SyncProp::new(String::new());
//!
//! let shell: Shell = Shell::new(vec![user.as_any_prop(), filter.as_any_prop()]);
//! assert!(shell.state().is_pending());
//!
//! shell.subscribe(|| println!("view kind changed"));
//! // ...once the fetch settles the shell becomes Valid and notifies once.
//! ```
//!
//! # Props
//!
//! - [`Prop<T>`] - value plus lifecycle, driven by [`run`](Prop::run) and
//!   [`run_sync`](Prop::run_sync). Operation errors are captured, never
//!   returned.
//! - [`SyncProp<T>`] - always holds a value, always valid.
//! - [`FutureProp<T>`] - loads from a future at construction.
//! - [`StreamProp<T>`] - follows a stream while hooked.
//! - [`DebouncedProp<T>`] - only the last run of a burst executes.
//! - [`PaginatedProp<T>`] - page-indexed fetching.
//!
//! # Shell
//!
//! ```ignore
//! let shell: Shell<Dialogs> = Shell::builder(props)
//!     .resolver(|props| propshell::resolve(props))
//!     .build();
//!
//! shell.attach(move || ui.dialogs());       // live context while mounted
//! let confirmed = shell.shell_run(CONFIRM, |dialogs| dialogs.confirm()).await?;
//!
//! // In tests, intercept the action instead:
//! shell.fake_shell();
//! let pending = shell.shell_run(CONFIRM, |dialogs| dialogs.confirm());
//! shell.shell_return_for_action(CONFIRM, true)?;
//! assert_eq!(pending.await?, Some(true));
//! ```
//!
//! # Observation
//!
//! ```ignore
//! let registry = ObservationRegistry::new();
//! let header = registry.register_observer(|| schedule_rebuild(HEADER));
//!
//! let scope = registry.render();
//! let name = scope.select(&header, &controller, |c| &c.name)?;
//! drop(scope);
//!
//! for dirty in registry.take_dirty() { rebuild(dirty); }
//! ```
//!
//! # Rendering
//!
//! [`render_view_state`] picks the valid, error or loading branch for a
//! [`ViewState`]. Builders come from [`RenderOptions`], resolved per field as
//! local over ambient over the built-in [`Placeholder`].

mod error;
mod executor;
mod hash;
mod notifier;
mod observation;
mod prop;
mod render;
mod resolver;
mod shell;
mod state;
mod view_state;

// Props
pub use prop::{
    DebouncedProp, FutureProp, PageFetcher, PaginatedProp, Prop, StreamProp, SyncProp,
};
pub use state::{AnyProp, AsAnyProp, PropBase, PropId, PropState, StaleData};

// Aggregation
pub use resolver::{Resolver, resolve};
pub use view_state::{ErrorMap, ViewState, ViewStateKind};

// Controller
pub use shell::{ActionKey, ContextAccessor, Shell, ShellBuilder};

// Fine-grained observation
pub use observation::{ObservationRegistry, ObserverHandle, ObserverId, RenderScope};

// Render binding
pub use render::{
    DEFAULT_ERROR_MESSAGE, ErrorBuilder, ErrorMessageMapper, LoadingBuilder, Placeholder,
    RenderOptions, render_view_state,
};

pub use error::{Error, OperationError};
pub use executor::DEFAULT_DEBOUNCE;
pub use hash::{IdHashBuilder, IdIndexMap, IdIndexSet};
pub use notifier::ListenerId;

#[cfg(test)]
mod tests;
