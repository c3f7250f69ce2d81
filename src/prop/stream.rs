use super::{Prop, PropCore};
use crate::executor;
use crate::notifier::ListenerId;
use crate::state::{AnyProp, AsAnyProp, PropId, PropState};
use futures::{Stream, StreamExt};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// A prop fed by a stream of results.
///
/// Every `Ok` item moves the prop to `Success` with that value, every `Err`
/// item to `Error` (keeping the last value). When the stream ends the prop is
/// marked completed and unhooked; value and error stay as they were.
///
/// The subscription is the prop's background task, so disposing the prop
/// (directly or through a [`Shell`](crate::Shell)) also unhooks it.
///
/// Hooking must happen inside a `tokio::task::LocalSet`.
pub struct StreamProp<T> {
    prop: Prop<T>,
    completed: Rc<Cell<bool>>,
}

impl<T> Clone for StreamProp<T> {
    fn clone(&self) -> Self {
        Self {
            prop: self.prop.clone(),
            completed: Rc::clone(&self.completed),
        }
    }
}

impl<T> fmt::Debug for StreamProp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamProp")
            .field("prop", &self.prop)
            .field("hooked", &self.prop.core.task.is_occupied())
            .field("completed", &self.completed.get())
            .finish()
    }
}

impl<T: 'static> Default for StreamProp<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> StreamProp<T> {
    /// An unhooked prop in the `Initial` state.
    pub fn new() -> Self {
        Self {
            prop: Prop::empty(),
            completed: Rc::default(),
        }
    }

    /// A prop already hooked to `stream`.
    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        let this = Self::new();
        this.hook(stream);
        this
    }

    /// Identity of this prop.
    pub fn id(&self) -> PropId {
        self.prop.id()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PropState {
        self.prop.state()
    }

    /// Whether a subscription is active.
    pub fn is_hooked(&self) -> bool {
        self.prop.core.task.is_occupied()
    }

    /// Whether the last hooked stream ran to its end.
    pub fn is_completed(&self) -> bool {
        self.completed.get()
    }

    /// Borrow the last received value.
    ///
    /// The prop stays borrowed while `f` runs; mutating it from `f` panics.
    pub fn with_value<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        self.prop.with_value(f)
    }

    /// Subscribe to `stream`, replacing any current subscription.
    ///
    /// Clears the completion flag and any error, and enters `Loading` until
    /// the first item arrives. Safe to call from a listener of this prop while
    /// the previous stream is delivering.
    pub fn hook<S, E>(&self, stream: S)
    where
        S: Stream<Item = Result<T, E>> + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        let core = &self.prop.core;
        if core.is_disposed() {
            tracing::warn!(prop = ?core.id(), "hook on a disposed prop ignored");
            return;
        }

        let epoch = core.task.renew();
        let task = executor::spawn(drive(
            Rc::clone(core),
            Rc::clone(&self.completed),
            epoch,
            stream,
        ));
        core.task.install(epoch, task);
        self.completed.set(false);
        core.begin();
    }

    /// Cancel the subscription, keeping the last value and error.
    pub fn unhook(&self) {
        if self.prop.core.task.cancel() {
            self.prop.core.notify();
        }
    }

    /// Attach a change listener.
    pub fn subscribe(&self, listener: impl Fn() + 'static) -> ListenerId {
        self.prop.subscribe(listener)
    }

    /// Detach a change listener.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.prop.unsubscribe(id);
    }

    /// Cancel the subscription and release listeners.
    pub fn dispose(&self) {
        self.prop.dispose();
    }
}

impl<T: Clone> StreamProp<T> {
    /// The last received value.
    pub fn value(&self) -> Option<T> {
        self.prop.value()
    }

    /// The value, if the last item was `Ok`.
    pub fn require(&self) -> Result<T, crate::Error> {
        self.prop.require()
    }
}

/// Feed `stream` into `core` for as long as `epoch` is the slot's epoch.
///
/// A listener may unhook or re-hook while an item is being delivered; the
/// abort only lands at the next suspension point, so the epoch is checked
/// before every item and before the completion bookkeeping.
async fn drive<T, S, E>(core: Rc<PropCore<T>>, completed: Rc<Cell<bool>>, epoch: u64, stream: S)
where
    S: Stream<Item = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    let mut stream = std::pin::pin!(stream);
    while let Some(item) = stream.next().await {
        if !core.task.is_current(epoch) {
            cov_mark::hit!(superseded_stream_item_dropped);
            return;
        }
        core.settle(item);
    }

    if !core.task.release(epoch) {
        return;
    }
    completed.set(true);
    tracing::debug!(prop = ?core.id(), "stream completed");
    if !core.is_disposed() {
        core.notify();
    }
}

impl<T: Clone + 'static> AsAnyProp for StreamProp<T> {
    fn as_any_prop(&self) -> AnyProp {
        self.prop.as_any_prop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PropBase;
    use futures::stream;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::task::LocalSet;

    fn channel_stream<T: 'static>(
        mut rx: mpsc::UnboundedReceiver<Result<T, anyhow::Error>>,
    ) -> impl Stream<Item = Result<T, anyhow::Error>> {
        futures::stream::poll_fn(move |cx| rx.poll_recv(cx))
    }

    #[tokio::test(start_paused = true)]
    async fn stream_items_update_the_prop() {
        LocalSet::new()
            .run_until(async {
                let (tx, rx) = mpsc::unbounded_channel();
                let prop = StreamProp::from_stream(channel_stream(rx));
                assert!(prop.is_hooked());
                assert_eq!(prop.state(), PropState::Loading);

                tx.send(Ok(1)).unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;
                assert_eq!(prop.require(), Ok(1));

                tx.send(Err(anyhow::anyhow!("glitch"))).unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;
                assert_eq!(prop.state(), PropState::Error);
                assert_eq!(prop.value(), Some(1));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn finished_stream_marks_completed_and_keeps_value() {
        LocalSet::new()
            .run_until(async {
                let prop = StreamProp::from_stream(stream::iter(vec![
                    Ok::<_, anyhow::Error>("a"),
                    Ok("b"),
                ]));
                tokio::time::sleep(Duration::from_millis(1)).await;

                assert!(prop.is_completed());
                assert!(!prop.is_hooked());
                assert_eq!(prop.require(), Ok("b"));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn unhook_stops_updates_but_keeps_value() {
        LocalSet::new()
            .run_until(async {
                let (tx, rx) = mpsc::unbounded_channel();
                let prop = StreamProp::from_stream(channel_stream(rx));
                tx.send(Ok(5)).unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;

                prop.unhook();
                let _ = tx.send(Ok(6));
                tokio::time::sleep(Duration::from_millis(1)).await;

                assert!(!prop.is_hooked());
                assert!(!prop.is_completed());
                assert_eq!(prop.value(), Some(5));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn rehooking_replaces_the_previous_subscription() {
        LocalSet::new()
            .run_until(async {
                let (old_tx, old_rx) = mpsc::unbounded_channel();
                let (new_tx, new_rx) = mpsc::unbounded_channel();
                let prop = StreamProp::from_stream(channel_stream(old_rx));

                prop.hook(channel_stream(new_rx));
                let _ = old_tx.send(Ok("old"));
                new_tx.send(Ok("new")).unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;

                assert_eq!(prop.value(), Some("new"));
                assert!(prop.is_hooked());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn unhook_from_a_listener_stops_ready_items() {
        cov_mark::check!(superseded_stream_item_dropped);
        LocalSet::new()
            .run_until(async {
                let prop = StreamProp::new();
                let handle = prop.clone();
                prop.subscribe(move || {
                    if handle.value() == Some(1) {
                        handle.unhook();
                    }
                });

                prop.hook(stream::iter(vec![
                    Ok::<_, anyhow::Error>(1),
                    Ok(2),
                    Ok(3),
                ]));
                tokio::time::sleep(Duration::from_millis(1)).await;

                assert_eq!(prop.value(), Some(1));
                assert!(!prop.is_hooked());
                assert!(!prop.is_completed());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn rehook_from_a_listener_survives_the_old_stream_ending() {
        LocalSet::new()
            .run_until(async {
                let prop = StreamProp::new();
                let handle = prop.clone();
                let rehooked = Rc::new(Cell::new(false));
                let rehooked_clone = rehooked.clone();
                prop.subscribe(move || {
                    if handle.value() == Some(1) && !rehooked_clone.replace(true) {
                        handle.hook(stream::pending::<Result<i32, anyhow::Error>>());
                    }
                });

                prop.hook(stream::iter(vec![Ok::<_, anyhow::Error>(1), Ok(2)]));
                tokio::time::sleep(Duration::from_millis(1)).await;

                assert!(rehooked.get());
                assert_eq!(prop.value(), Some(1));
                assert_eq!(prop.state(), PropState::Loading);
                assert!(prop.is_hooked());
                assert!(!prop.is_completed());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn hooking_after_a_failed_stream_clears_error_and_completion() {
        LocalSet::new()
            .run_until(async {
                let prop = StreamProp::from_stream(stream::iter(vec![
                    Ok(1),
                    Err(anyhow::anyhow!("feed dropped")),
                ]));
                tokio::time::sleep(Duration::from_millis(1)).await;
                assert_eq!(prop.state(), PropState::Error);
                assert!(prop.is_completed());

                let (_tx, rx) = mpsc::unbounded_channel::<Result<i32, anyhow::Error>>();
                prop.hook(channel_stream(rx));

                assert_eq!(prop.state(), PropState::Loading);
                assert!(prop.prop.error().is_none());
                assert!(!prop.is_completed());
                assert!(prop.is_hooked());
                assert_eq!(prop.value(), Some(1));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn disposing_through_the_erased_handle_unhooks() {
        LocalSet::new()
            .run_until(async {
                let prop = StreamProp::from_stream(stream::pending::<Result<u8, anyhow::Error>>());
                assert!(prop.is_hooked());

                prop.as_any_prop().dispose();

                assert!(!prop.is_hooked());
                prop.hook(stream::iter(vec![Ok::<_, anyhow::Error>(9)]));
                tokio::time::sleep(Duration::from_millis(1)).await;
                assert!(!prop.is_hooked());
                assert_eq!(prop.value(), None);
            })
            .await;
    }
}
