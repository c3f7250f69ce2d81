// Observation registry - which render observers read which props
//
// During a render pass, UI fragments declare "observer O reads prop P". The
// registry attaches exactly one listener to P for each such pair. When P
// notifies, only the observers bound to P are marked dirty and their
// invalidation callback runs; nothing else in the view is touched.
//
// LIFECYCLE:
// - Observers are slab entries addressed by ObserverId and owned through an
//   ObserverHandle. Dropping the handle only marks the entry unmounted.
// - An unmounted observer is pruned lazily: the next time one of its props
//   notifies, that (observer, prop) pair is removed from both sides and its
//   listener detached. The slab entry goes away with its last binding, so an
//   id is never reused while a listener can still refer to it.
// - sweep() prunes every unmounted observer eagerly.
//
// RENDER PASSES:
// - Registration is only legal while a RenderScope is alive.
// - Invalidations raised while any scope is alive are deferred and delivered
//   once, when the outermost scope ends.

use crate::error::Error;
use crate::hash::{IdIndexMap, IdIndexSet};
use crate::notifier::ListenerId;
use crate::state::{AsAnyProp, PropBase, PropId};
use slab::Slab;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Identity of a render observer.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ObserverId(u32);

impl ObserverId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

struct Binding {
    prop: Weak<dyn PropBase>,
    listener: ListenerId,
}

impl Binding {
    fn detach(self) {
        if let Some(prop) = self.prop.upgrade() {
            prop.unsubscribe(self.listener);
        }
    }
}

struct ObserverEntry {
    mounted: bool,
    on_invalidate: Rc<dyn Fn()>,
    bindings: IdIndexMap<PropId, Binding>,
}

#[derive(Default)]
struct RegistryInner {
    observers: RefCell<Slab<ObserverEntry>>,
    prop_observers: RefCell<IdIndexMap<PropId, IdIndexSet<ObserverId>>>,
    dirty: RefCell<IdIndexSet<ObserverId>>,
    deferred: RefCell<IdIndexSet<ObserverId>>,
    render_depth: Cell<usize>,
}

impl RegistryInner {
    fn unlink(&self, observer: ObserverId, prop: PropId) {
        let mut prop_observers = self.prop_observers.borrow_mut();
        if let Some(set) = prop_observers.get_mut(&prop) {
            set.shift_remove(&observer);
            if set.is_empty() {
                prop_observers.shift_remove(&prop);
            }
        }
    }

    fn on_prop_changed(&self, observer: ObserverId, prop: PropId) {
        let mut observers = self.observers.borrow_mut();
        let Some(entry) = observers.get_mut(observer.index()) else {
            return;
        };

        if !entry.mounted {
            cov_mark::hit!(stale_observer_pruned);
            let binding = entry.bindings.shift_remove(&prop);
            if entry.bindings.is_empty() {
                observers.remove(observer.index());
            }
            drop(observers);

            self.unlink(observer, prop);
            if let Some(binding) = binding {
                binding.detach();
            }
            tracing::debug!(?observer, ?prop, "pruned unmounted observer binding");
            return;
        }

        let on_invalidate = Rc::clone(&entry.on_invalidate);
        drop(observers);

        if !self.dirty.borrow_mut().insert(observer) {
            return;
        }
        if self.render_depth.get() > 0 {
            self.deferred.borrow_mut().insert(observer);
            return;
        }
        tracing::trace!(?observer, ?prop, "observer invalidated");
        on_invalidate();
    }

    fn flush_deferred(&self) {
        let deferred = std::mem::take(&mut *self.deferred.borrow_mut());
        for observer in deferred {
            let on_invalidate = {
                let observers = self.observers.borrow();
                match observers.get(observer.index()) {
                    Some(entry) if entry.mounted => Rc::clone(&entry.on_invalidate),
                    _ => continue,
                }
            };
            tracing::trace!(?observer, "deferred invalidation delivered");
            on_invalidate();
        }
    }

    fn unmount(&self, observer: ObserverId) {
        let mut observers = self.observers.borrow_mut();
        let Some(entry) = observers.get_mut(observer.index()) else {
            return;
        };
        entry.mounted = false;
        if entry.bindings.is_empty() {
            observers.remove(observer.index());
        }
        drop(observers);

        self.dirty.borrow_mut().shift_remove(&observer);
        self.deferred.borrow_mut().shift_remove(&observer);
    }
}

/// Tracks which render observers read which props.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone, Default)]
pub struct ObservationRegistry {
    inner: Rc<RegistryInner>,
}

impl fmt::Debug for ObservationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationRegistry")
            .field("observers", &self.inner.observers.borrow().len())
            .field("props", &self.inner.prop_observers.borrow().len())
            .field("dirty", &self.inner.dirty.borrow().len())
            .field("render_depth", &self.inner.render_depth.get())
            .finish()
    }
}

impl ObservationRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a render observer.
    ///
    /// `on_invalidate` runs when a prop the observer reads changes (typically
    /// it schedules a rebuild of that fragment). It runs once per dirty
    /// period: after it fired, further changes only keep the observer dirty
    /// until [`take_dirty`](Self::take_dirty) drains it, so the rendering layer
    /// must drain the dirty set when it rebuilds. The observer lives until the
    /// returned handle is dropped.
    pub fn register_observer(&self, on_invalidate: impl Fn() + 'static) -> ObserverHandle {
        let mut observers = self.inner.observers.borrow_mut();
        let entry = observers.vacant_entry();
        let id = ObserverId(entry.key() as u32);
        entry.insert(ObserverEntry {
            mounted: true,
            on_invalidate: Rc::new(on_invalidate),
            bindings: IdIndexMap::default(),
        });

        ObserverHandle {
            id,
            registry: Rc::downgrade(&self.inner),
        }
    }

    /// Start a render pass. Registration is legal until the scope is dropped.
    pub fn render(&self) -> RenderScope<'_> {
        self.inner
            .render_depth
            .set(self.inner.render_depth.get() + 1);
        RenderScope { registry: self }
    }

    /// Whether a render pass is active.
    pub fn is_rendering(&self) -> bool {
        self.inner.render_depth.get() > 0
    }

    /// Declare that `observer` reads `prop`.
    ///
    /// Registering the same pair again is a no-op. Fails with
    /// [`Error::OutsideRenderPass`] when no render pass is active and with
    /// [`Error::UnknownObserver`] when the handle belongs to another registry
    /// or was released.
    pub fn observe(&self, observer: &ObserverHandle, prop: &dyn AsAnyProp) -> Result<(), Error> {
        if !self.is_rendering() {
            return Err(Error::OutsideRenderPass);
        }
        if !Weak::ptr_eq(&observer.registry, &Rc::downgrade(&self.inner)) {
            return Err(Error::UnknownObserver);
        }

        let prop = prop.as_any_prop();
        let prop_id = prop.id();
        let id = observer.id;

        {
            let observers = self.inner.observers.borrow();
            match observers.get(id.index()) {
                Some(entry) if entry.mounted => {
                    if entry.bindings.contains_key(&prop_id) {
                        return Ok(());
                    }
                }
                _ => return Err(Error::UnknownObserver),
            }
        }
        if prop.is_disposed() {
            tracing::debug!(observer = ?id, prop = ?prop_id, "disposed prop not observed");
            return Ok(());
        }

        let registry = Rc::downgrade(&self.inner);
        let listener = prop.subscribe(Rc::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.on_prop_changed(id, prop_id);
            }
        }));

        if let Some(entry) = self.inner.observers.borrow_mut().get_mut(id.index()) {
            entry.bindings.insert(
                prop_id,
                Binding {
                    prop: Rc::downgrade(&prop),
                    listener,
                },
            );
        }
        self.inner
            .prop_observers
            .borrow_mut()
            .entry(prop_id)
            .or_default()
            .insert(id);

        Ok(())
    }

    /// Drain the dirty observers, in the order they were marked.
    ///
    /// Drained observers are invalidated again on their props' next change.
    pub fn take_dirty(&self) -> Vec<ObserverId> {
        std::mem::take(&mut *self.inner.dirty.borrow_mut())
            .into_iter()
            .collect()
    }

    /// Whether `observer` was marked dirty since the last [`take_dirty`](Self::take_dirty).
    pub fn is_dirty(&self, observer: ObserverId) -> bool {
        self.inner.dirty.borrow().contains(&observer)
    }

    /// Number of observers currently bound to `prop`.
    pub fn observer_count(&self, prop: PropId) -> usize {
        self.inner
            .prop_observers
            .borrow()
            .get(&prop)
            .map_or(0, IdIndexSet::len)
    }

    /// Number of live registry entries, unmounted-but-unpruned ones included.
    pub fn len(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    /// Whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prune every unmounted observer now instead of on its props' next change.
    pub fn sweep(&self) -> usize {
        let stale: Vec<(ObserverId, Vec<(PropId, Binding)>)> = {
            let mut observers = self.inner.observers.borrow_mut();
            let ids: Vec<usize> = observers
                .iter()
                .filter(|(_, entry)| !entry.mounted)
                .map(|(index, _)| index)
                .collect();
            ids.into_iter()
                .map(|index| {
                    let entry = observers.remove(index);
                    (
                        ObserverId(index as u32),
                        entry.bindings.into_iter().collect(),
                    )
                })
                .collect()
        };

        let pruned = stale.len();
        for (observer, bindings) in stale {
            for (prop, binding) in bindings {
                self.inner.unlink(observer, prop);
                binding.detach();
            }
        }
        if pruned > 0 {
            tracing::debug!(pruned, "swept unmounted observers");
        }
        pruned
    }
}

/// An active render pass.
///
/// Scopes nest; invalidations raised while any scope is alive are delivered
/// when the outermost one is dropped.
pub struct RenderScope<'a> {
    registry: &'a ObservationRegistry,
}

impl fmt::Debug for RenderScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderScope")
            .field("depth", &self.registry.inner.render_depth.get())
            .finish()
    }
}

impl RenderScope<'_> {
    /// Declare that `observer` reads `prop`.
    pub fn observe(&self, observer: &ObserverHandle, prop: &dyn AsAnyProp) -> Result<(), Error> {
        self.registry.observe(observer, prop)
    }

    /// Bind `observer` to the prop `selector` picks out of `controller`, and
    /// return that prop.
    pub fn select<'c, S, P>(
        &self,
        observer: &ObserverHandle,
        controller: &'c S,
        selector: impl FnOnce(&'c S) -> &'c P,
    ) -> Result<&'c P, Error>
    where
        P: AsAnyProp,
    {
        let prop = selector(controller);
        self.registry.observe(observer, prop)?;
        Ok(prop)
    }
}

impl Drop for RenderScope<'_> {
    fn drop(&mut self) {
        let inner = &self.registry.inner;
        let depth = inner.render_depth.get().saturating_sub(1);
        inner.render_depth.set(depth);
        if depth == 0 {
            inner.flush_deferred();
        }
    }
}

/// Owning handle of a registered observer. Dropping it unmounts the observer.
pub struct ObserverHandle {
    id: ObserverId,
    registry: Weak<RegistryInner>,
}

impl fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObserverHandle").field(&self.id).finish()
    }
}

impl ObserverHandle {
    /// The observer's id, as reported by [`ObservationRegistry::take_dirty`].
    pub fn id(&self) -> ObserverId {
        self.id
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unmount(self.id);
        }
    }
}
