//! Processes: suspendable routines driven by event callbacks.
//!
//! # Model
//!
//! A process wraps an `async` routine. The routine runs to a suspension
//! point, [`Context::wait`], which registers the process's resume hook on
//! the awaited event and parks the routine. When the scheduler processes
//! that event, the hook injects the event's outcome (value or failure)
//! back into the suspension point and advances the routine to its next
//! suspension point or to termination.
//!
//! The routine is polled only by this driver, never by an external
//! executor; the waker is a no-op. A process therefore advances atomically
//! with respect to every other process, and `await` on a [`WaitFuture`] is
//! the engine's single suspension point.
//!
//! # Termination
//!
//! A process is itself an event. Returning `Ok(value)` from the routine
//! succeeds it; returning `Err(failure)` (usually via `?` on a suspension
//! point) fails it, propagating the failure to anyone waiting on the
//! process, or out of the simulation loop if nobody is.
//!
//! # Interrupts
//!
//! [`Process::interrupt`] schedules an urgent interruption event. When it
//! fires, the victim's resume hook is removed from its current target and
//! the routine is resumed with `Err(Failure::Interrupted(..))` at the
//! current simulation time. The routine may handle the failure and keep
//! going; the abandoned target stays valid and fires on its own schedule
//! with no one listening.

use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use futures::task::noop_waker;
use tracing::debug;

use crate::clock::{Priority, SimTime};
use crate::error::Failure;
use crate::event::{Callback, Event, EventPayload, Outcome};
use crate::simulation::Environment;
use crate::value::Value;

type Routine = Pin<Box<dyn Future<Output = Outcome>>>;

pub(crate) struct ProcessState {
    routine: Option<Routine>,
    target: Option<Event>,
    injected: Option<Outcome>,
}

/// A running simulation activity, itself an event.
///
/// Derefs to [`Event`], so waiting on a process suspends the waiter until
/// the process terminates and delivers its return value or propagated
/// failure. `Process` handles are cheap clones of the same process.
#[derive(Clone, PartialEq, Eq)]
pub struct Process {
    event: Event,
}

impl Process {
    /// The event facet of this process.
    #[must_use]
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// `true` until the routine has terminated.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.event.is_triggered()
    }

    /// The event the process is currently waiting on.
    #[must_use]
    pub fn target(&self) -> Option<Event> {
        self.with_state(|state| state.target.clone())
    }

    /// Inject an interrupt into this process at the current instant.
    ///
    /// Does nothing if the process has already terminated. The interrupt
    /// schedules urgently, so when target and interrupt fall on the same
    /// instant with the interrupt scheduled later, the interrupt still
    /// wins. Several interrupts in one instant are delivered one per
    /// resumption, in scheduling order, to whatever suspension point the
    /// routine reaches next.
    pub fn interrupt(&self, cause: Option<Value>) {
        if !self.is_alive() {
            return;
        }
        let env = self.event.env();
        debug!(now = env.now(), "interrupt scheduled");

        let interruption = Event::new(env.clone(), "interruption", EventPayload::Plain);
        // Interrupts never crash the simulation on their own.
        interruption.preset(Err(Failure::interrupt(cause)), true);

        let victim = self.clone();
        interruption.add_callback(move |fired| {
            if !victim.is_alive() {
                // Died while the interrupt was in flight; discard.
                return;
            }
            if let Some(target) = victim.target() {
                target.remove_resume(&victim);
            }
            if let Some(outcome) = fired.outcome() {
                deliver(&victim, outcome);
            }
        });
        env.schedule(&interruption, Priority::Urgent, 0.0);
    }

    pub(crate) fn same(&self, other: &Process) -> bool {
        self.event == other.event
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ProcessState) -> R) -> R {
        let mut inner = self.event.borrow_inner_mut();
        match &mut inner.payload {
            EventPayload::Process(state) => f(state),
            _ => unreachable!("process payload on a non-process event"),
        }
    }
}

impl Deref for Process {
    type Target = Event;

    fn deref(&self) -> &Event {
        &self.event
    }
}

impl AsRef<Event> for Process {
    fn as_ref(&self) -> &Event {
        &self.event
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Process({:?})", self.event)
    }
}

/// Capabilities handed to a routine: its environment, its own process
/// handle, and the ability to suspend.
#[derive(Clone)]
pub struct Context {
    process: Process,
}

impl Context {
    /// The environment the process runs in.
    #[must_use]
    pub fn env(&self) -> Environment {
        self.process.event.env()
    }

    /// Current simulation time.
    #[must_use]
    pub fn now(&self) -> SimTime {
        self.env().now()
    }

    /// This routine's own process handle.
    #[must_use]
    pub fn process(&self) -> &Process {
        &self.process
    }

    /// Suspend until `event` is processed; resolves to its outcome.
    ///
    /// Waiting on an already-processed event resolves immediately to a
    /// fault: its outcome is available on the event itself and there is
    /// nothing left to wait for.
    pub fn wait<E: AsRef<Event>>(&self, event: &E) -> WaitFuture {
        WaitFuture {
            process: self.process.clone(),
            event: event.as_ref().clone(),
            registered: false,
        }
    }

    /// Suspend for `delay` units of simulation time.
    pub fn sleep(&self, delay: SimTime) -> WaitFuture {
        let timeout = self.env().timeout(delay);
        self.wait(&timeout)
    }

    /// Suspend for `delay`, resolving to `value`.
    pub fn sleep_value(&self, delay: SimTime, value: Value) -> WaitFuture {
        let timeout = self.env().timeout_value(delay, value);
        self.wait(&timeout)
    }
}

/// The suspension point of a routine; resolves to the awaited event's
/// outcome, or to the injected failure if the process is interrupted
/// while waiting.
pub struct WaitFuture {
    process: Process,
    event: Event,
    registered: bool,
}

impl Future for WaitFuture {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<Outcome> {
        let this = self.get_mut();
        if !this.registered {
            if this.event.is_processed() {
                return Poll::Ready(Err(Failure::fault(
                    "cannot wait on an already-processed event",
                )));
            }
            this.process.with_state(|state| {
                state.injected = None;
                state.target = Some(this.event.clone());
            });
            this.event
                .push_callback(Callback::Resume(this.process.clone()));
            this.registered = true;
            return Poll::Pending;
        }
        match this.process.with_state(|state| state.injected.take()) {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

/// Create a process and schedule its first step.
pub(crate) fn spawn<F, Fut>(env: &Environment, f: F) -> Process
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = Outcome> + 'static,
{
    let event = Event::new(
        env.clone(),
        "process",
        EventPayload::Process(ProcessState {
            routine: None,
            target: None,
            injected: None,
        }),
    );
    let process = Process { event };

    let routine: Routine = Box::pin(f(Context {
        process: process.clone(),
    }));
    process.with_state(|state| state.routine = Some(routine));

    // The first step runs urgently so the routine reaches its first
    // suspension point before any same-instant interrupt.
    let init = Event::new(env.clone(), "initialize", EventPayload::Plain);
    init.preset(Ok(Value::unit()), false);
    init.push_callback(Callback::Resume(process.clone()));
    process.with_state(|state| state.target = Some(init.clone()));
    env.schedule(&init, Priority::Urgent, 0.0);

    process
}

/// Resume hook: the process's registered target was processed.
pub(crate) fn resume(process: &Process, fired: &Event) {
    if !process.is_alive() {
        // Terminated while queued for resumption (a same-instant
        // interrupt killed it first); discard.
        return;
    }
    let Some(outcome) = fired.outcome() else {
        return;
    };
    if outcome.is_err() {
        // The routine is about to observe the failure; it no longer
        // crashes the simulation by itself.
        fired.defuse();
    }
    deliver(process, outcome);
}

/// Advance the routine one step with `outcome` injected at its suspension
/// point.
fn deliver(process: &Process, outcome: Outcome) {
    let env = process.event.env();
    env.set_active(Some(process.clone()));

    let routine = process.with_state(|state| {
        state.target = None;
        state.injected = Some(outcome);
        state.routine.take()
    });
    let Some(mut routine) = routine else {
        env.set_active(None);
        return;
    };

    let waker = noop_waker();
    let mut cx = TaskContext::from_waker(&waker);
    match routine.as_mut().poll(&mut cx) {
        Poll::Pending => {
            // Suspended again; the wait future has re-registered.
            process.with_state(|state| state.routine = Some(routine));
        }
        Poll::Ready(Ok(value)) => {
            debug!(now = env.now(), "process terminated");
            process.event.succeed(value);
        }
        Poll::Ready(Err(failure)) => {
            debug!(now = env.now(), %failure, "process failed");
            process.event.fail(failure);
        }
    }

    env.set_active(None);
}
