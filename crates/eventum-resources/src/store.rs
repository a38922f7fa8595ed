//! Typed item stores, with and without predicate filtering.
//!
//! A [`Store`] holds up to `capacity` items of one type and hands them
//! out first-in first-out. A [`FilterStore`] lets each getter supply a
//! predicate; a getter receives the oldest item its predicate accepts.
//! Because each waiter has its own enabling condition, the filter store
//! scans its whole get queue on every state change instead of stopping
//! at the first blocked waiter, so a picky early getter cannot starve a
//! later one whose item is available.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ops::Deref;
use std::rc::Rc;

use tracing::trace;

use eventum_core::{Environment, Event, Value};

use crate::base::{walk, Attempt};

type Filter<T> = Box<dyn Fn(&T) -> bool>;

struct QueuedPut<T> {
    event: Event,
    item: Option<T>,
}

struct QueuedGet<T> {
    event: Event,
    filter: Option<Filter<T>>,
}

struct StoreState<T> {
    capacity: usize,
    filtered: bool,
    items: VecDeque<T>,
    put_queue: Vec<QueuedPut<T>>,
    get_queue: Vec<QueuedGet<T>>,
}

type Shared<T> = Rc<RefCell<StoreState<T>>>;

/// A FIFO store of typed items.
///
/// Get events deliver items as [`Value`]s; recover them with
/// `value.downcast::<T>()`.
pub struct Store<T: 'static> {
    env: Environment,
    state: Shared<T>,
}

impl<T: 'static> Store<T> {
    /// A store holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(env: &Environment, capacity: usize) -> Self {
        Self::with_policy(env, capacity, false)
    }

    /// A store without a capacity bound.
    #[must_use]
    pub fn unbounded(env: &Environment) -> Self {
        Self::new(env, usize::MAX)
    }

    fn with_policy(env: &Environment, capacity: usize, filtered: bool) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            env: env.clone(),
            state: Rc::new(RefCell::new(StoreState {
                capacity,
                filtered,
                items: VecDeque::new(),
                put_queue: Vec::new(),
                get_queue: Vec::new(),
            })),
        }
    }

    /// Put `item` into the store; succeeds once there is room.
    pub fn put(&self, item: T) -> StorePut<T> {
        let event = self.env.event();
        self.state.borrow_mut().put_queue.push(QueuedPut {
            event: event.clone(),
            item: Some(item),
        });
        {
            let state = self.state.clone();
            event.add_callback(move |_| get_pass(&state));
        }
        put_pass(&self.state);
        StorePut {
            event,
            state: self.state.clone(),
        }
    }

    /// Take the oldest item; succeeds once the store is non-empty.
    pub fn get(&self) -> StoreGet<T> {
        self.get_inner(None)
    }

    fn get_inner(&self, filter: Option<Filter<T>>) -> StoreGet<T> {
        let event = self.env.event();
        self.state.borrow_mut().get_queue.push(QueuedGet {
            event: event.clone(),
            filter,
        });
        {
            let state = self.state.clone();
            event.add_callback(move |_| put_pass(&state));
        }
        get_pass(&self.state);
        StoreGet {
            event,
            state: self.state.clone(),
        }
    }

    /// Number of items currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().items.len()
    }

    /// `true` when the store holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.borrow().items.is_empty()
    }

    /// Maximum number of items.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.borrow().capacity
    }
}

/// A [`Store`] whose getters select items by predicate.
pub struct FilterStore<T: 'static> {
    inner: Store<T>,
}

impl<T: 'static> FilterStore<T> {
    /// A filter store holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(env: &Environment, capacity: usize) -> Self {
        Self {
            inner: Store::with_policy(env, capacity, true),
        }
    }

    /// A filter store without a capacity bound.
    #[must_use]
    pub fn unbounded(env: &Environment) -> Self {
        Self {
            inner: Store::with_policy(env, usize::MAX, true),
        }
    }

    /// Take the oldest item accepted by `filter`.
    pub fn get_filtered(&self, filter: impl Fn(&T) -> bool + 'static) -> StoreGet<T> {
        self.inner.get_inner(Some(Box::new(filter)))
    }
}

impl<T: 'static> Deref for FilterStore<T> {
    type Target = Store<T>;

    fn deref(&self) -> &Store<T> {
        &self.inner
    }
}

/// A pending put; derefs to its [`Event`]. Withdraws from the queue if
/// dropped before completion.
pub struct StorePut<T: 'static> {
    event: Event,
    state: Shared<T>,
}

impl<T> Deref for StorePut<T> {
    type Target = Event;

    fn deref(&self) -> &Event {
        &self.event
    }
}

impl<T> AsRef<Event> for StorePut<T> {
    fn as_ref(&self) -> &Event {
        &self.event
    }
}

impl<T> Drop for StorePut<T> {
    fn drop(&mut self) {
        if !self.event.is_triggered() {
            self.state
                .borrow_mut()
                .put_queue
                .retain(|queued| queued.event != self.event);
        }
    }
}

/// A pending get; derefs to its [`Event`]. The success value wraps the
/// retrieved item. Withdraws from the queue if dropped before
/// completion.
pub struct StoreGet<T: 'static> {
    event: Event,
    state: Shared<T>,
}

impl<T> Deref for StoreGet<T> {
    type Target = Event;

    fn deref(&self) -> &Event {
        &self.event
    }
}

impl<T> AsRef<Event> for StoreGet<T> {
    fn as_ref(&self) -> &Event {
        &self.event
    }
}

impl<T> Drop for StoreGet<T> {
    fn drop(&mut self) {
        if !self.event.is_triggered() {
            self.state
                .borrow_mut()
                .get_queue
                .retain(|queued| queued.event != self.event);
        }
    }
}

fn put_pass<T: 'static>(state: &Shared<T>) {
    let mut st = state.borrow_mut();
    walk(
        &mut *st,
        |st| st.put_queue.len(),
        |st, idx| {
            if st.items.len() < st.capacity {
                if let Some(item) = st.put_queue[idx].item.take() {
                    st.items.push_back(item);
                }
                trace!(stored = st.items.len(), "store put");
                st.put_queue[idx].event.succeed(Value::unit());
                Attempt::Progressed
            } else {
                Attempt::Stalled
            }
        },
        |st, idx| {
            st.put_queue.remove(idx);
        },
        false,
    );
}

fn get_pass<T: 'static>(state: &Shared<T>) {
    let mut st = state.borrow_mut();
    let full_scan = st.filtered;
    walk(
        &mut *st,
        |st| st.get_queue.len(),
        |st, idx| {
            let found = match &st.get_queue[idx].filter {
                None => {
                    if st.items.is_empty() {
                        None
                    } else {
                        Some(0)
                    }
                }
                Some(filter) => st.items.iter().position(|item| filter(item)),
            };
            match found {
                Some(pos) => {
                    let item = st.items.remove(pos);
                    trace!(stored = st.items.len(), "store get");
                    if let Some(item) = item {
                        st.get_queue[idx].event.succeed(Value::new(item));
                    }
                    Attempt::Progressed
                }
                None => Attempt::Stalled,
            }
        },
        |st, idx| {
            st.get_queue.remove(idx);
        },
        full_scan,
    );
}
