//! Bulk-level containers.
//!
//! A [`Container`] holds a scalar level between zero and its capacity,
//! modelling an undifferentiated bulk such as fuel in a tank. Puts block
//! until the added amount fits; gets block until the requested amount is
//! available. Both queues are FIFO.

use std::cell::RefCell;
use std::ops::Deref;
use std::rc::Rc;

use tracing::trace;

use eventum_core::{Environment, Event, Value};

use crate::base::{walk, Attempt};

struct QueuedAmount {
    event: Event,
    amount: f64,
}

struct ContainerState {
    capacity: f64,
    level: f64,
    put_queue: Vec<QueuedAmount>,
    get_queue: Vec<QueuedAmount>,
}

type Shared = Rc<RefCell<ContainerState>>;

/// A scalar-level resource with bounded capacity.
pub struct Container {
    env: Environment,
    state: Shared,
}

impl Container {
    /// A container with the given capacity and initial level.
    ///
    /// `f64::INFINITY` is a valid capacity for an unbounded container.
    ///
    /// # Panics
    ///
    /// Panics unless `capacity > 0` and `0 <= init <= capacity`.
    #[must_use]
    pub fn new(env: &Environment, capacity: f64, init: f64) -> Self {
        assert!(capacity > 0.0, "capacity must be > 0");
        assert!(
            (0.0..=capacity).contains(&init),
            "init(={init}) must be within [0, capacity]"
        );
        Self {
            env: env.clone(),
            state: Rc::new(RefCell::new(ContainerState {
                capacity,
                level: init,
                put_queue: Vec::new(),
                get_queue: Vec::new(),
            })),
        }
    }

    /// Add `amount` to the container; succeeds once it fits.
    ///
    /// # Panics
    ///
    /// Panics unless `amount > 0`.
    pub fn put(&self, amount: f64) -> ContainerPut {
        assert!(amount > 0.0, "amount(={amount}) must be > 0");
        let event = self.env.event();
        self.state.borrow_mut().put_queue.push(QueuedAmount {
            event: event.clone(),
            amount,
        });
        {
            let state = self.state.clone();
            event.add_callback(move |_| get_pass(&state));
        }
        put_pass(&self.state);
        ContainerPut {
            event,
            state: self.state.clone(),
        }
    }

    /// Take `amount` out of the container; succeeds once available.
    ///
    /// # Panics
    ///
    /// Panics unless `amount > 0`.
    pub fn get(&self, amount: f64) -> ContainerGet {
        assert!(amount > 0.0, "amount(={amount}) must be > 0");
        let event = self.env.event();
        self.state.borrow_mut().get_queue.push(QueuedAmount {
            event: event.clone(),
            amount,
        });
        {
            let state = self.state.clone();
            event.add_callback(move |_| put_pass(&state));
        }
        get_pass(&self.state);
        ContainerGet {
            event,
            state: self.state.clone(),
        }
    }

    /// Current level, within `[0, capacity]`.
    #[must_use]
    pub fn level(&self) -> f64 {
        self.state.borrow().level
    }

    /// Maximum level.
    #[must_use]
    pub fn capacity(&self) -> f64 {
        self.state.borrow().capacity
    }
}

/// A pending put; derefs to its [`Event`]. Withdraws from the queue if
/// dropped before completion.
pub struct ContainerPut {
    event: Event,
    state: Shared,
}

impl Deref for ContainerPut {
    type Target = Event;

    fn deref(&self) -> &Event {
        &self.event
    }
}

impl AsRef<Event> for ContainerPut {
    fn as_ref(&self) -> &Event {
        &self.event
    }
}

impl Drop for ContainerPut {
    fn drop(&mut self) {
        if !self.event.is_triggered() {
            self.state
                .borrow_mut()
                .put_queue
                .retain(|queued| queued.event != self.event);
        }
    }
}

/// A pending get; derefs to its [`Event`]. Withdraws from the queue if
/// dropped before completion.
pub struct ContainerGet {
    event: Event,
    state: Shared,
}

impl Deref for ContainerGet {
    type Target = Event;

    fn deref(&self) -> &Event {
        &self.event
    }
}

impl AsRef<Event> for ContainerGet {
    fn as_ref(&self) -> &Event {
        &self.event
    }
}

impl Drop for ContainerGet {
    fn drop(&mut self) {
        if !self.event.is_triggered() {
            self.state
                .borrow_mut()
                .get_queue
                .retain(|queued| queued.event != self.event);
        }
    }
}

fn put_pass(state: &Shared) {
    let mut st = state.borrow_mut();
    walk(
        &mut *st,
        |st| st.put_queue.len(),
        |st, idx| {
            let amount = st.put_queue[idx].amount;
            if st.level + amount <= st.capacity {
                st.level += amount;
                trace!(level = st.level, "container put");
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

fn get_pass(state: &Shared) {
    let mut st = state.borrow_mut();
    walk(
        &mut *st,
        |st| st.get_queue.len(),
        |st, idx| {
            let amount = st.get_queue[idx].amount;
            if st.level >= amount {
                st.level -= amount;
                trace!(level = st.level, "container get");
                st.get_queue[idx].event.succeed(Value::unit());
                Attempt::Progressed
            } else {
                Attempt::Stalled
            }
        },
        |st, idx| {
            st.get_queue.remove(idx);
        },
        false,
    );
}
