use super::Prop;
use crate::executor;
use crate::state::{AnyProp, AsAnyProp};
use std::fmt;
use std::future::Future;
use std::ops::Deref;

/// A prop that drives itself from a future.
///
/// Construction enters `Loading` immediately (before returning), so a shell
/// built right afterwards already resolves to pending. The future is awaited on
/// a local task and its outcome settles the prop.
///
/// Must be created inside a `tokio::task::LocalSet`.
pub struct FutureProp<T> {
    prop: Prop<T>,
}

impl<T> Clone for FutureProp<T> {
    fn clone(&self) -> Self {
        Self {
            prop: self.prop.clone(),
        }
    }
}

impl<T> fmt::Debug for FutureProp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FutureProp").field(&self.prop).finish()
    }
}

impl<T: 'static> FutureProp<T> {
    /// Start loading from `source`.
    pub fn new<F, E>(source: F) -> Self
    where
        F: Future<Output = Result<T, E>> + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        let this = Self {
            prop: Prop::empty(),
        };
        this.refresh(source);
        this
    }

    /// Re-run against a new source.
    ///
    /// An earlier source that is still in flight is not cancelled; whichever
    /// settles last decides the value.
    pub fn refresh<F, E>(&self, source: F)
    where
        F: Future<Output = Result<T, E>> + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        self.prop.core.begin();
        let core = self.prop.core.clone();
        // Runs are never cancelled; a disposed core drops the settlement.
        let _task = executor::spawn(async move {
            let outcome = source.await;
            core.settle(outcome);
        });
    }
}

impl<T> Deref for FutureProp<T> {
    type Target = Prop<T>;

    fn deref(&self) -> &Prop<T> {
        &self.prop
    }
}

impl<T: Clone + 'static> AsAnyProp for FutureProp<T> {
    fn as_any_prop(&self) -> AnyProp {
        self.prop.as_any_prop()
    }
}
