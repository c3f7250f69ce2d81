use super::Prop;
use crate::state::{AnyProp, AsAnyProp};
use futures::future::{FutureExt, LocalBoxFuture, TryFutureExt};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::rc::Rc;

/// Loads one page of items.
pub type PageFetcher<T> = Rc<dyn Fn(u32) -> LocalBoxFuture<'static, anyhow::Result<Vec<T>>>>;

fn erase_fetcher<T, F, Fut, E>(fetcher: F) -> PageFetcher<T>
where
    F: Fn(u32) -> Fut + 'static,
    Fut: Future<Output = Result<Vec<T>, E>> + 'static,
    E: Into<anyhow::Error> + 'static,
{
    Rc::new(move |page| {
        fetcher(page)
            .map_err(|error| -> anyhow::Error { error.into() })
            .boxed_local()
    })
}

/// A prop holding one page of items at a time.
///
/// Each fetch replaces the value with the requested page; the current page
/// only moves when the fetch succeeds. Pages below the initial page are
/// rejected without touching the prop.
pub struct PaginatedProp<T> {
    prop: Prop<Vec<T>>,
    initial_page: u32,
    current_page: Rc<Cell<u32>>,
    fetcher: Rc<RefCell<PageFetcher<T>>>,
}

impl<T> Clone for PaginatedProp<T> {
    fn clone(&self) -> Self {
        Self {
            prop: self.prop.clone(),
            initial_page: self.initial_page,
            current_page: Rc::clone(&self.current_page),
            fetcher: Rc::clone(&self.fetcher),
        }
    }
}

impl<T> fmt::Debug for PaginatedProp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaginatedProp")
            .field("prop", &self.prop)
            .field("initial_page", &self.initial_page)
            .field("current_page", &self.current_page.get())
            .finish_non_exhaustive()
    }
}

impl<T: 'static> PaginatedProp<T> {
    /// An empty prop that starts at `initial_page`. Nothing is fetched yet.
    pub fn new<F, Fut, E>(initial_page: u32, fetcher: F) -> Self
    where
        F: Fn(u32) -> Fut + 'static,
        Fut: Future<Output = Result<Vec<T>, E>> + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        Self {
            prop: Prop::empty(),
            initial_page,
            current_page: Rc::new(Cell::new(initial_page)),
            fetcher: Rc::new(RefCell::new(erase_fetcher(fetcher))),
        }
    }

    /// The first page.
    pub fn initial_page(&self) -> u32 {
        self.initial_page
    }

    /// The page the current value belongs to.
    pub fn current_page(&self) -> u32 {
        self.current_page.get()
    }

    /// Replace the fetcher used by subsequent fetches.
    pub fn set_fetcher<F, Fut, E>(&self, fetcher: F)
    where
        F: Fn(u32) -> Fut + 'static,
        Fut: Future<Output = Result<Vec<T>, E>> + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        *self.fetcher.borrow_mut() = erase_fetcher(fetcher);
    }

    /// Fetch `page`. Pages below the initial page are ignored.
    pub async fn fetch_page(&self, page: u32) {
        if page < self.initial_page {
            cov_mark::hit!(page_below_initial_rejected);
            return;
        }

        let fetcher = Rc::clone(&*self.fetcher.borrow());
        let fetch = fetcher(page);
        let core = &self.prop.core;
        core.begin();
        let outcome = fetch.await;
        if core.finish(outcome) {
            self.current_page.set(page);
        }
        if !core.is_disposed() {
            core.notify();
        }
    }

    /// Fetch the page after the current one.
    pub async fn fetch_next_page(&self) {
        self.fetch_page(self.current_page.get().saturating_add(1))
            .await;
    }

    /// Fetch the page before the current one. Does nothing on the initial page.
    pub async fn fetch_previous_page(&self) {
        let current = self.current_page.get();
        if current <= self.initial_page {
            cov_mark::hit!(previous_page_at_initial_ignored);
            return;
        }
        self.fetch_page(current - 1).await;
    }

    /// Fetch the initial page again.
    pub async fn fetch_initial_page(&self) {
        self.fetch_page(self.initial_page).await;
    }
}

impl<T> Deref for PaginatedProp<T> {
    type Target = Prop<Vec<T>>;

    fn deref(&self) -> &Prop<Vec<T>> {
        &self.prop
    }
}

impl<T: Clone + 'static> AsAnyProp for PaginatedProp<T> {
    fn as_any_prop(&self) -> AnyProp {
        self.prop.as_any_prop()
    }
}
