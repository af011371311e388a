//! Observable, ordered containers shared between the session and the
//! rendering surface.
//!
//! A [`SharedStore`] is a cheap, clonable handle to one logical channel
//! (transcript, findings, markers). Every handle points at the same
//! sequence. All access happens on a single thread, so the store uses
//! `Rc`/`RefCell` rather than locks.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

type Handler<T> = Rc<RefCell<dyn FnMut(&[T])>>;

struct Inner<T> {
    items: Vec<T>,
    subscribers: Vec<(u64, Handler<T>)>,
    next_id: u64,
    /// Snapshots waiting to be delivered, oldest first.
    pending: VecDeque<Vec<T>>,
    delivering: bool,
}

/// Ordered sequence with synchronous change notification.
///
/// Handlers run synchronously after each mutation and receive the sequence
/// as it stood right after that mutation, so subscribers see every change in
/// the order it was applied. Handlers may also mutate the store: the change
/// is applied at once, and its notification is queued and delivered to every
/// handler after the current one has reached them all.
pub struct SharedStore<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for SharedStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Default for SharedStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("SharedStore")
            .field("items", &inner.items)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + 'static> SharedStore<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                items: Vec::new(),
                subscribers: Vec::new(),
                next_id: 0,
                pending: VecDeque::new(),
                delivering: false,
            })),
        }
    }

    /// Snapshot of the current sequence.
    pub fn current(&self) -> Vec<T> {
        self.inner.borrow().items.clone()
    }

    /// Borrow the current sequence without cloning it.
    pub fn with_current<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.inner.borrow().items)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().items.is_empty()
    }

    /// Last element, if any.
    pub fn last(&self) -> Option<T> {
        self.inner.borrow().items.last().cloned()
    }

    /// Overwrite the whole sequence.
    pub fn replace(&self, items: Vec<T>) {
        self.inner.borrow_mut().items = items;
        self.notify();
    }

    /// Add one element at the end.
    pub fn append(&self, item: T) {
        self.inner.borrow_mut().items.push(item);
        self.notify();
    }

    /// Overwrite the tail element, or append when the store is empty.
    pub fn set_last(&self, item: T) {
        {
            let mut inner = self.inner.borrow_mut();
            match inner.items.last_mut() {
                Some(last) => *last = item,
                None => inner.items.push(item),
            }
        }
        self.notify();
    }

    /// A sink closure that appends to this store.
    pub fn appender(&self) -> impl FnMut(T) + 'static {
        let store = self.clone();
        move |item| store.append(item)
    }

    /// Register a handler invoked after every mutation.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// unsubscribed; call [`Subscription::detach`] to keep it for the life of
    /// the store.
    #[must_use = "dropping the Subscription keeps the handler registered; call detach() to make that explicit"]
    pub fn subscribe(&self, handler: impl FnMut(&[T]) + 'static) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .subscribers
            .push((id, Rc::new(RefCell::new(handler)) as Handler<T>));

        let weak: Weak<RefCell<Inner<T>>> = Rc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.borrow_mut().subscribers.retain(|(sid, _)| *sid != id);
                }
            })),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    fn notify(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.subscribers.is_empty() {
                return;
            }
            let snapshot = inner.items.clone();
            inner.pending.push_back(snapshot);
            // Raised from inside a handler: the outer call delivers it.
            if inner.delivering {
                return;
            }
            inner.delivering = true;
        }

        let _delivery = Delivery(&self.inner);
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                inner.pending.pop_front().map(|snapshot| {
                    let handlers: Vec<Handler<T>> =
                        inner.subscribers.iter().map(|(_, h)| Rc::clone(h)).collect();
                    (snapshot, handlers)
                })
            };
            let Some((snapshot, handlers)) = next else {
                break;
            };
            for handler in handlers {
                (handler.borrow_mut())(&snapshot);
            }
        }
    }
}

/// Ends a delivery loop, even when a handler panics.
struct Delivery<'a, T>(&'a RefCell<Inner<T>>);

impl<T> Drop for Delivery<'_, T> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.0.try_borrow_mut() {
            inner.delivering = false;
            inner.pending.clear();
        }
    }
}

/// Handle returned by [`SharedStore::subscribe`].
///
/// Dropping it keeps the subscription alive; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove the handler or
/// [`detach`](Subscription::detach) to keep it on purpose.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Give up the handle; the handler stays registered as long as the store
    /// lives.
    pub fn detach(self) {}
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
