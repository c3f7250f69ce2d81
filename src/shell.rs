//! The controller that aggregates a fixed set of props into one view state.
//!
//! A [`Shell`] subscribes one listener to each of its props. Whenever a prop
//! notifies, the shell re-resolves its [`ViewState`] and notifies its own
//! observers only when the *kind* of the state changes (`Pending` to `Valid`,
//! say). A `Pending` to `Pending` transition with different stale data is
//! coalesced away.
//!
//! # Actions
//!
//! [`Shell::shell_run`] executes an action that needs the live rendering
//! context `C` (to show a confirmation prompt, for instance). It only runs
//! while a context accessor is attached and yields a context. In tests,
//! [`Shell::fake_shell`] intercepts every call instead: the call stays pending
//! until the test answers it with [`Shell::shell_return_for_action`].
//!
//! ```ignore
//! shell.fake_shell();
//! let confirm = shell.shell_run(CONFIRM_DELETE, |cx| cx.confirm("Delete?"));
//! shell.shell_return_for_action(CONFIRM_DELETE, true)?;
//! assert_eq!(confirm.await?, Some(true));
//! ```

use crate::error::Error;
use crate::hash::IdIndexMap;
use crate::notifier::{ListenerId, Notifier};
use crate::resolver::{Resolver, resolve};
use crate::state::AnyProp;
use crate::view_state::{ViewState, ViewStateKind};
use futures::future::{FutureExt, LocalBoxFuture};
use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};
use tokio::sync::oneshot;

/// Identity of an action dispatched through [`Shell::shell_run`].
///
/// Tests use the same key to answer an intercepted call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionKey(&'static str);

impl ActionKey {
    /// A key named `name`.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The key's name.
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Yields the live rendering context, or `None` once it is gone.
pub type ContextAccessor<C> = Box<dyn Fn() -> Option<C>>;

struct PendingAction {
    output: TypeId,
    sender: oneshot::Sender<Box<dyn Any>>,
}

struct ShellInner<C> {
    props: Vec<AnyProp>,
    bindings: RefCell<Vec<ListenerId>>,
    state: RefCell<ViewState>,
    resolver: Option<Resolver>,
    observers: Notifier,
    context: RefCell<Option<ContextAccessor<C>>>,
    faked: Cell<bool>,
    pending: RefCell<IdIndexMap<ActionKey, PendingAction>>,
    disposed: Cell<bool>,
}

impl<C> ShellInner<C> {
    fn compute(&self) -> ViewState {
        match &self.resolver {
            Some(resolver) => resolver(&self.props),
            None => resolve(&self.props),
        }
    }

    fn reevaluate(&self) {
        if self.disposed.get() {
            return;
        }

        let next = self.compute();
        let to = next.kind();
        let from = self.state.replace(next).kind();

        if from != to {
            tracing::debug!(?from, ?to, "shell state changed");
            self.observers.notify();
        }
    }
}

/// Builder for a [`Shell`] with a custom resolver.
pub struct ShellBuilder<C> {
    props: Vec<AnyProp>,
    resolver: Option<Resolver>,
    context: PhantomData<fn() -> C>,
}

impl<C: 'static> ShellBuilder<C> {
    /// Replace the default aggregation.
    pub fn resolver(mut self, resolver: impl Fn(&[AnyProp]) -> ViewState + 'static) -> Self {
        self.resolver = Some(Rc::new(resolver));
        self
    }

    /// Build the shell, resolving its initial state and subscribing to every prop.
    pub fn build(self) -> Shell<C> {
        let inner = Rc::new(ShellInner {
            props: self.props,
            bindings: RefCell::new(Vec::new()),
            state: RefCell::new(ViewState::pending()),
            resolver: self.resolver,
            observers: Notifier::new(),
            context: RefCell::new(None),
            faked: Cell::new(false),
            pending: RefCell::new(IdIndexMap::default()),
            disposed: Cell::new(false),
        });

        let initial = inner.compute();
        *inner.state.borrow_mut() = initial;

        let bindings = inner
            .props
            .iter()
            .map(|prop| {
                let weak: Weak<ShellInner<C>> = Rc::downgrade(&inner);
                prop.subscribe(Rc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.reevaluate();
                    }
                }))
            })
            .collect();
        *inner.bindings.borrow_mut() = bindings;

        Shell { inner }
    }
}

/// Aggregates a fixed list of props into one [`ViewState`].
///
/// `C` is the rendering context handed to actions run through
/// [`shell_run`](Shell::shell_run).
pub struct Shell<C = ()> {
    inner: Rc<ShellInner<C>>,
}

impl<C> Clone for Shell<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C> fmt::Debug for Shell<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shell")
            .field("props", &self.inner.props.len())
            .field("state", &*self.inner.state.borrow())
            .field("faked", &self.inner.faked.get())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

impl<C: 'static> Shell<C> {
    /// Configure a shell over `props`.
    pub fn builder(props: Vec<AnyProp>) -> ShellBuilder<C> {
        ShellBuilder {
            props,
            resolver: None,
            context: PhantomData,
        }
    }

    /// A shell over `props` using the default resolver.
    ///
    /// The props should already be constructed (and self-driving ones started)
    /// so the initial resolution reflects them.
    pub fn new(props: Vec<AnyProp>) -> Self {
        Self::builder(props).build()
    }

    /// The props this shell aggregates, in order.
    pub fn props(&self) -> &[AnyProp] {
        &self.inner.props
    }

    /// A copy of the current state.
    pub fn state(&self) -> ViewState {
        self.inner.state.borrow().clone()
    }

    /// The kind of the current state.
    pub fn kind(&self) -> ViewStateKind {
        self.inner.state.borrow().kind()
    }

    /// Borrow the current state.
    pub fn with_state<R>(&self, f: impl FnOnce(&ViewState) -> R) -> R {
        f(&self.inner.state.borrow())
    }

    /// Re-resolve now. Observers are notified only if the state kind changed.
    pub fn reevaluate_props(&self) {
        self.inner.reevaluate();
    }

    /// Observe state-kind changes.
    pub fn subscribe(&self, listener: impl Fn() + 'static) -> ListenerId {
        self.inner.observers.add(Rc::new(listener))
    }

    /// Stop observing.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.inner.observers.remove(id);
    }

    /// Bind the accessor for the live rendering context.
    pub fn attach(&self, accessor: impl Fn() -> Option<C> + 'static) {
        *self.inner.context.borrow_mut() = Some(Box::new(accessor));
    }

    /// Drop the context accessor.
    pub fn detach(&self) {
        self.inner.context.borrow_mut().take();
    }

    /// Whether a live rendering context is available right now.
    pub fn is_mounted(&self) -> bool {
        self.context().is_some()
    }

    fn context(&self) -> Option<C> {
        self.inner
            .context
            .borrow()
            .as_ref()
            .and_then(|accessor| accessor())
    }

    /// Intercept every subsequent [`shell_run`](Shell::shell_run) call.
    pub fn fake_shell(&self) {
        self.inner.faked.set(true);
    }

    /// Whether calls are being intercepted.
    pub fn is_faked(&self) -> bool {
        self.inner.faked.get()
    }

    /// Whether an intercepted call for `action` is waiting for an answer.
    pub fn has_pending_action(&self, action: ActionKey) -> bool {
        self.inner.pending.borrow().contains_key(&action)
    }

    /// Run `action` with the live rendering context.
    ///
    /// The returned future resolves to:
    /// - `Ok(Some(output))` once the action finishes,
    /// - `Ok(None)` if no live context was available at call time,
    /// - `Err(Error::Disposed)` if the shell was disposed.
    ///
    /// When faked, the action is not invoked; the call is registered under
    /// `key` (replacing an earlier unanswered call, which then resolves to
    /// `Ok(None)`) and resolves with the value passed to
    /// [`shell_return_for_action`](Shell::shell_return_for_action).
    /// Registration and the context check happen immediately, not on first poll.
    pub fn shell_run<R, F, Fut>(
        &self,
        key: ActionKey,
        action: F,
    ) -> LocalBoxFuture<'static, Result<Option<R>, Error>>
    where
        R: 'static,
        F: FnOnce(C) -> Fut,
        Fut: Future<Output = R> + 'static,
    {
        if self.inner.disposed.get() {
            return futures::future::ready(Err(Error::Disposed)).boxed_local();
        }

        if self.inner.faked.get() {
            let (sender, receiver) = oneshot::channel();
            let replaced = self.inner.pending.borrow_mut().insert(
                key,
                PendingAction {
                    output: TypeId::of::<R>(),
                    sender,
                },
            );
            if replaced.is_some() {
                tracing::debug!(action = %key, "intercepted call replaced an unanswered one");
            }
            tracing::trace!(action = %key, "action intercepted");
            return async move {
                match receiver.await {
                    Ok(value) => Ok(value.downcast::<R>().ok().map(|value| *value)),
                    Err(_) => Ok(None),
                }
            }
            .boxed_local();
        }

        match self.context() {
            Some(cx) => action(cx).map(|output| Ok(Some(output))).boxed_local(),
            None => {
                tracing::debug!(action = %key, "action skipped: no live context");
                futures::future::ready(Ok(None)).boxed_local()
            }
        }
    }

    /// Answer the intercepted call pending for `key` with `value`.
    ///
    /// Fails with [`Error::NoPendingAction`] if nothing is pending and with
    /// [`Error::ActionOutputMismatch`] if the call awaits a different type (the
    /// call then stays pending).
    pub fn shell_return_for_action<R: 'static>(&self, key: ActionKey, value: R) -> Result<(), Error> {
        let mut pending = self.inner.pending.borrow_mut();
        let Some(entry) = pending.shift_remove(&key) else {
            return Err(Error::NoPendingAction { action: key });
        };
        if entry.output != TypeId::of::<R>() {
            pending.insert(key, entry);
            return Err(Error::ActionOutputMismatch { action: key });
        }
        drop(pending);

        if entry.sender.send(Box::new(value)).is_err() {
            tracing::debug!(action = %key, "intercepted call was dropped before its answer");
        }
        Ok(())
    }

    /// Detach from every prop, dispose them, drop the context accessor and
    /// release pending intercepted calls. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }

        let bindings = std::mem::take(&mut *self.inner.bindings.borrow_mut());
        for (prop, listener) in self.inner.props.iter().zip(bindings) {
            prop.unsubscribe(listener);
        }
        for prop in &self.inner.props {
            prop.dispose();
        }
        self.detach();
        self.inner.observers.clear();
        self.inner.pending.borrow_mut().clear();
        tracing::debug!(props = self.inner.props.len(), "shell disposed");
    }

    /// Whether [`dispose`](Shell::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}
