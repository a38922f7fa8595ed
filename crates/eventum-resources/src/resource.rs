//! Capacity-limited resources: plain, prioritized and preemptive.
//!
//! A [`Resource`] is an N-slot semaphore. A request event succeeds when a
//! slot is free; releasing a slot admits the next waiter in the same
//! simulation instant. [`PriorityResource`] serves waiters by
//! `(priority, request time, sequence)` instead of plain arrival order,
//! and [`PreemptiveResource`] additionally lets a sufficiently urgent
//! request evict the worst current user, interrupting its process with a
//! [`Preempted`] cause.
//!
//! Requests are RAII handles: dropping a pending request withdraws it
//! from the queue (the cancellation path after an interrupt), and
//! dropping an acquired request releases the slot unless
//! [`Resource::release`] was already called. All exit paths give the slot
//! back.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::ops::Deref;
use std::rc::Rc;

use tracing::debug;

use eventum_core::{Environment, Event, Process, SimTime, Value};

use crate::base::{walk, Attempt};

/// Interrupt cause delivered to a preempted user's process.
///
/// Recovered from the interrupt with
/// `interrupt.cause().and_then(|v| v.downcast::<Preempted>())`.
#[derive(Clone, Debug)]
pub struct Preempted {
    /// The process whose request caused the preemption, if it was made
    /// from inside a process.
    pub by: Option<Process>,
    /// Simulation time at which the preempted user acquired the slot.
    pub usage_since: SimTime,
}

/// Service order key: smaller sorts earlier.
#[derive(Clone, Copy)]
struct RequestKey {
    priority: i64,
    time: SimTime,
    seq: u64,
}

impl PartialEq for RequestKey {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for RequestKey {}

impl PartialOrd for RequestKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RequestKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.time.total_cmp(&other.time))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Policy {
    Fifo,
    Priority,
    Preemptive,
}

struct UserEntry {
    event: Event,
    proc: Option<Process>,
    key: RequestKey,
    since: SimTime,
}

struct QueuedRequest {
    event: Event,
    proc: Option<Process>,
    key: RequestKey,
    preempt: bool,
}

struct QueuedRelease {
    event: Event,
    request: Event,
}

struct ResourceState {
    capacity: usize,
    policy: Policy,
    seq: u64,
    users: Vec<UserEntry>,
    put_queue: Vec<QueuedRequest>,
    get_queue: Vec<QueuedRelease>,
}

type Shared = Rc<RefCell<ResourceState>>;

/// An N-slot semaphore with FIFO service order.
pub struct Resource {
    env: Environment,
    state: Shared,
}

impl Resource {
    /// A resource with the given number of usage slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(env: &Environment, capacity: usize) -> Self {
        Self::with_policy(env, capacity, Policy::Fifo)
    }

    fn with_policy(env: &Environment, capacity: usize, policy: Policy) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            env: env.clone(),
            state: Rc::new(RefCell::new(ResourceState {
                capacity,
                policy,
                seq: 0,
                users: Vec::new(),
                put_queue: Vec::new(),
                get_queue: Vec::new(),
            })),
        }
    }

    /// Request a usage slot. The returned event succeeds once granted.
    pub fn request(&self) -> Request {
        request_with(&self.env, &self.state, 0, false)
    }

    /// Release the slot held by `request`.
    ///
    /// Releasing always succeeds immediately, whether or not the request
    /// actually held a slot; a freed slot is handed to the next waiter in
    /// the same instant.
    pub fn release(&self, request: &Request) -> Event {
        request.released.set(true);
        do_release(&self.env, &self.state, request.event.clone())
    }

    /// Number of slots currently in use.
    #[must_use]
    pub fn count(&self) -> usize {
        self.state.borrow().users.len()
    }

    /// Total number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.borrow().capacity
    }

    /// Request events of the current users, in admission order.
    #[must_use]
    pub fn users(&self) -> Vec<Event> {
        self.state
            .borrow()
            .users
            .iter()
            .map(|user| user.event.clone())
            .collect()
    }

    /// Pending request events, in service order.
    #[must_use]
    pub fn queue(&self) -> Vec<Event> {
        self.state
            .borrow()
            .put_queue
            .iter()
            .map(|queued| queued.event.clone())
            .collect()
    }
}

/// A [`Resource`] serving waiters by request priority.
///
/// Smaller priority values are served first; equal priorities are served
/// in arrival order.
pub struct PriorityResource {
    inner: Resource,
}

impl PriorityResource {
    /// A priority resource with the given number of slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(env: &Environment, capacity: usize) -> Self {
        Self {
            inner: Resource::with_policy(env, capacity, Policy::Priority),
        }
    }

    /// Request a slot with the given priority.
    pub fn request_priority(&self, priority: i64) -> Request {
        request_with(&self.inner.env, &self.inner.state, priority, false)
    }
}

impl Deref for PriorityResource {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.inner
    }
}

/// A [`PriorityResource`] whose urgent requests may evict current users.
///
/// Preemption only happens for a request at the head of the waiting
/// queue whose `preempt` flag is set and whose key is strictly better
/// than the worst current user's key. A blocked earlier waiter therefore
/// shields the users from later arrivals, however urgent.
pub struct PreemptiveResource {
    inner: Resource,
}

impl PreemptiveResource {
    /// A preemptive resource with the given number of slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(env: &Environment, capacity: usize) -> Self {
        Self {
            inner: Resource::with_policy(env, capacity, Policy::Preemptive),
        }
    }

    /// Request a slot with the given priority and preemption flag.
    pub fn request_priority(&self, priority: i64, preempt: bool) -> Request {
        request_with(&self.inner.env, &self.inner.state, priority, preempt)
    }
}

impl Deref for PreemptiveResource {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.inner
    }
}

/// A pending or granted slot request.
///
/// Derefs to [`Event`]; wait on it to suspend until the slot is granted.
/// On drop, a pending request withdraws from the queue and a granted one
/// releases its slot, unless already released explicitly.
pub struct Request {
    event: Event,
    state: Shared,
    released: Cell<bool>,
}

impl Deref for Request {
    type Target = Event;

    fn deref(&self) -> &Event {
        &self.event
    }
}

impl AsRef<Event> for Request {
    fn as_ref(&self) -> &Event {
        &self.event
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        if self.released.get() {
            return;
        }
        if self.event.is_triggered() {
            let env = self.event.env();
            do_release(&env, &self.state, self.event.clone());
        } else {
            self.state
                .borrow_mut()
                .put_queue
                .retain(|queued| queued.event != self.event);
        }
    }
}

fn request_with(env: &Environment, state: &Shared, priority: i64, preempt: bool) -> Request {
    let event = env.event();
    let proc = env.active_process();
    let time = env.now();
    {
        let mut st = state.borrow_mut();
        let seq = st.seq;
        st.seq += 1;
        let entry = QueuedRequest {
            event: event.clone(),
            proc,
            key: RequestKey {
                priority,
                time,
                seq,
            },
            preempt,
        };
        match st.policy {
            Policy::Fifo => st.put_queue.push(entry),
            Policy::Priority | Policy::Preemptive => {
                let pos = st.put_queue.partition_point(|q| q.key <= entry.key);
                st.put_queue.insert(pos, entry);
            }
        }
    }
    {
        let state = state.clone();
        event.add_callback(move |_| get_pass(&state));
    }
    put_pass(state);
    Request {
        event,
        state: state.clone(),
        released: Cell::new(false),
    }
}

fn do_release(env: &Environment, state: &Shared, request: Event) -> Event {
    let event = env.event();
    state.borrow_mut().get_queue.push(QueuedRelease {
        event: event.clone(),
        request,
    });
    {
        let state = state.clone();
        event.add_callback(move |_| put_pass(&state));
    }
    get_pass(state);
    event
}

fn put_pass(state: &Shared) {
    let mut st = state.borrow_mut();
    walk(
        &mut *st,
        |st| st.put_queue.len(),
        do_put,
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
        do_get,
        |st, idx| {
            st.get_queue.remove(idx);
        },
        false,
    );
}

fn do_put(st: &mut ResourceState, idx: usize) -> Attempt {
    if st.policy == Policy::Preemptive && st.users.len() >= st.capacity && st.put_queue[idx].preempt
    {
        maybe_preempt(st, idx);
    }
    if st.users.len() < st.capacity {
        let entry = &st.put_queue[idx];
        let since = entry.event.env().now();
        debug!(now = since, "slot granted");
        st.users.push(UserEntry {
            event: entry.event.clone(),
            proc: entry.proc.clone(),
            key: entry.key,
            since,
        });
        entry.event.succeed(Value::unit());
        Attempt::Progressed
    } else {
        Attempt::Stalled
    }
}

fn maybe_preempt(st: &mut ResourceState, idx: usize) {
    let key = st.put_queue[idx].key;
    let Some(worst_idx) = st
        .users
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.key.cmp(&b.key))
        .map(|(i, _)| i)
    else {
        return;
    };
    if st.users[worst_idx].key > key {
        let victim = st.users.remove(worst_idx);
        debug!(usage_since = victim.since, "user preempted");
        if let Some(proc) = victim.proc {
            let by = st.put_queue[idx].proc.clone();
            proc.interrupt(Some(Value::new(Preempted {
                by,
                usage_since: victim.since,
            })));
        }
    }
}

fn do_get(st: &mut ResourceState, idx: usize) -> Attempt {
    let release = &st.get_queue[idx];
    if let Some(pos) = st
        .users
        .iter()
        .position(|user| user.event == release.request)
    {
        st.users.remove(pos);
    }
    release.event.succeed(Value::unit());
    Attempt::Progressed
}
