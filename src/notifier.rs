// Listener storage shared by props and shells.
//
// Listeners live in a slab and are addressed by `ListenerId`. Slab slots are
// reused, so every id also carries the generation it was issued under; a stale
// id no longer matches once its slot holds a newer listener and removing it is
// a no-op. Notification snapshots the callbacks before calling any of them, so
// a listener may add or remove listeners (including itself) while a
// notification is in flight. A listener removed mid-notification still
// receives that notification if it was already part of the snapshot.

use slab::Slab;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Handle returned when subscribing to a prop or a shell.
///
/// Pass it back to the matching `unsubscribe` to detach the listener.
/// Unsubscribing twice, or after the listener was dropped, does nothing.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ListenerId {
    index: u32,
    generation: u32,
}

impl ListenerId {
    /// An id no notifier ever issues; returned when a subscription is refused.
    pub(crate) const DETACHED: Self = Self {
        index: u32::MAX,
        generation: 0,
    };

    fn index(self) -> usize {
        self.index as usize
    }
}

pub(crate) type Listener = Rc<dyn Fn()>;

struct Entry {
    generation: u32,
    listener: Listener,
}

#[derive(Default)]
pub(crate) struct Notifier {
    listeners: RefCell<Slab<Entry>>,
    generation: Cell<u32>,
}

impl Notifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, listener: Listener) -> ListenerId {
        let generation = self.generation.get().wrapping_add(1).max(1);
        self.generation.set(generation);

        let mut listeners = self.listeners.borrow_mut();
        let entry = listeners.vacant_entry();
        let id = ListenerId {
            index: entry.key() as u32,
            generation,
        };
        entry.insert(Entry {
            generation,
            listener,
        });
        id
    }

    /// Returns false if the id was not attached.
    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        match listeners.get(id.index()) {
            Some(entry) if entry.generation == id.generation => {
                listeners.remove(id.index());
                true
            }
            _ => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub(crate) fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }

    pub(crate) fn notify(&self) {
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, entry)| Rc::clone(&entry.listener))
            .collect();

        for listener in snapshot {
            listener();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn notify_reaches_every_listener_once() {
        let notifier = Notifier::new();
        let hits = Rc::new(Cell::new(0));

        for _ in 0..3 {
            let hits = hits.clone();
            notifier.add(Rc::new(move || hits.set(hits.get() + 1)));
        }

        notifier.notify();
        assert_eq!(hits.get(), 3);
    }

    #[test]
    fn listener_can_remove_itself_during_notify() {
        let notifier = Rc::new(Notifier::new());
        let slot: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));
        let hits = Rc::new(Cell::new(0));

        let id = {
            let notifier_ref = Rc::downgrade(&notifier);
            let slot = slot.clone();
            let hits = hits.clone();
            notifier.add(Rc::new(move || {
                hits.set(hits.get() + 1);
                if let (Some(notifier), Some(id)) = (notifier_ref.upgrade(), slot.get()) {
                    notifier.remove(id);
                }
            }))
        };
        slot.set(Some(id));

        notifier.notify();
        notifier.notify();

        assert_eq!(hits.get(), 1);
        assert_eq!(notifier.len(), 0);
    }

    #[test]
    fn removing_unknown_listener_reports_false() {
        let notifier = Notifier::new();
        let id = notifier.add(Rc::new(|| {}));

        assert!(notifier.remove(id));
        assert!(!notifier.remove(id));
    }

    #[test]
    fn stale_id_does_not_detach_the_slot_reuser() {
        let notifier = Notifier::new();
        let hits = Rc::new(Cell::new(0));

        let first = notifier.add(Rc::new(|| {}));
        assert!(notifier.remove(first));

        let hits_clone = hits.clone();
        let second = notifier.add(Rc::new(move || hits_clone.set(hits_clone.get() + 1)));
        assert_ne!(first, second);

        assert!(!notifier.remove(first));
        notifier.notify();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn detached_id_is_never_attached() {
        let notifier = Notifier::new();
        notifier.add(Rc::new(|| {}));

        assert!(!notifier.remove(ListenerId::DETACHED));
        assert_eq!(notifier.len(), 1);
    }
}
