//! The execution environment: virtual time, the scheduler loop and the
//! event factories.
//!
//! # Step semantics
//!
//! [`Environment::step`] pops the smallest `(time, priority, seq)` entry,
//! advances `now` to its time, marks the event processed by taking its
//! callback list, and invokes every callback in insertion order. If the
//! event carried a failure and no callback defused it, the failure is
//! returned as [`SimError::UnhandledFailure`]; nothing is ever silently
//! dropped.
//!
//! # Run semantics
//!
//! [`Environment::run`] drives the loop until one of:
//!
//! - [`Until::Forever`]: the heap runs dry;
//! - [`Until::At`]: an internal, urgently scheduled stop event fires at
//!   the given time, so `now` lands exactly there and events scheduled at
//!   exactly that time do not execute;
//! - [`Until::Event`]: the given event is processed, returning its value
//!   or re-raising its failure.
//!
//! # Ownership
//!
//! `Environment` is a cheap-clone handle; all scheduler state, the active
//! process slot and every event created through the factories share one
//! underlying core. State is never shared across environments.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use tracing::trace;

use crate::clock::{EventHeap, Priority, SimTime};
use crate::error::SimError;
use crate::event::condition::{self, ConditionPredicate};
use crate::event::{Callback, Event, EventPayload, Outcome};
use crate::process::{self, Context, Process};
use crate::value::Value;

pub(crate) struct EnvCore {
    clock: RefCell<EventHeap>,
    active: RefCell<Option<Process>>,
    stepping: Cell<bool>,
}

/// Owner of the scheduler, virtual time and the currently active process;
/// factory for every event type.
#[derive(Clone)]
pub struct Environment {
    core: Rc<EnvCore>,
}

impl Environment {
    /// An environment starting at time `0`.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(0.0)
    }

    /// An environment starting at the given initial time.
    #[must_use]
    pub fn starting_at(initial_time: SimTime) -> Self {
        Self {
            core: Rc::new(EnvCore {
                clock: RefCell::new(EventHeap::new(initial_time)),
                active: RefCell::new(None),
                stepping: Cell::new(false),
            }),
        }
    }

    /// Current simulation time. Monotonically non-decreasing.
    #[must_use]
    pub fn now(&self) -> SimTime {
        self.core.clock.borrow().now()
    }

    /// The process whose routine is currently executing, if any.
    #[must_use]
    pub fn active_process(&self) -> Option<Process> {
        self.core.active.borrow().clone()
    }

    pub(crate) fn set_active(&self, process: Option<Process>) {
        *self.core.active.borrow_mut() = process;
    }

    pub(crate) fn same(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    // ------------------------------------------------------------------
    // Factories
    // ------------------------------------------------------------------

    /// A fresh untriggered event.
    #[must_use]
    pub fn event(&self) -> Event {
        Event::new(self.clone(), "event", EventPayload::Plain)
    }

    /// An event that fires `delay` time units from now with a unit value.
    ///
    /// # Panics
    ///
    /// Panics on a negative delay.
    #[must_use]
    pub fn timeout(&self, delay: SimTime) -> Event {
        self.timeout_value(delay, Value::unit())
    }

    /// An event that fires `delay` time units from now carrying `value`.
    ///
    /// A timeout is already triggered from construction; its only
    /// remaining lifecycle step is being processed.
    ///
    /// # Panics
    ///
    /// Panics on a negative delay.
    #[must_use]
    pub fn timeout_value(&self, delay: SimTime, value: Value) -> Event {
        let event = Event::new(self.clone(), "timeout", EventPayload::Plain);
        event.preset(Ok(value), false);
        self.schedule(&event, Priority::Normal, delay);
        event
    }

    /// Start a process for the given routine.
    ///
    /// The routine receives a [`Context`] and runs to its first suspension
    /// point at the current instant, before any ordinary event scheduled
    /// at the same time.
    pub fn process<F, Fut>(&self, routine: F) -> Process
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Outcome> + 'static,
    {
        process::spawn(self, routine)
    }

    /// A condition that fires once all of `events` have triggered.
    #[must_use]
    pub fn all_of(&self, events: impl IntoIterator<Item = Event>) -> Event {
        condition::new_condition(self, events.into_iter().collect(), condition::all_events)
    }

    /// A condition that fires once any of `events` has triggered.
    #[must_use]
    pub fn any_of(&self, events: impl IntoIterator<Item = Event>) -> Event {
        condition::new_condition(self, events.into_iter().collect(), condition::any_events)
    }

    /// A condition with a custom predicate over
    /// `(child count, triggered count)`.
    #[must_use]
    pub fn condition(
        &self,
        events: impl IntoIterator<Item = Event>,
        predicate: ConditionPredicate,
    ) -> Event {
        condition::new_condition(self, events.into_iter().collect(), predicate)
    }

    // ------------------------------------------------------------------
    // Scheduler loop
    // ------------------------------------------------------------------

    /// Push `event` onto the heap at `now + delay`.
    ///
    /// Low-level entry point; ordinary code triggers events instead and
    /// lets them schedule themselves.
    ///
    /// # Panics
    ///
    /// Panics on a negative delay.
    pub fn schedule(&self, event: &Event, priority: Priority, delay: SimTime) {
        self.core
            .clock
            .borrow_mut()
            .schedule(event.clone(), priority, delay);
    }

    /// Time of the next scheduled event, or infinity if there is none.
    #[must_use]
    pub fn peek(&self) -> SimTime {
        self.core.clock.borrow().peek()
    }

    /// Process exactly one event.
    ///
    /// # Errors
    ///
    /// [`SimError::EmptySchedule`] when nothing is scheduled;
    /// [`SimError::UnhandledFailure`] when the processed event carried a
    /// failure no callback defused.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a callback: the loop is not
    /// reentrant.
    pub fn step(&self) -> Result<(), SimError> {
        assert!(
            !self.core.stepping.get(),
            "step() called from inside a callback"
        );
        let entry = {
            let mut clock = self.core.clock.borrow_mut();
            clock.tick().ok_or(SimError::EmptySchedule)?
        };
        let event = entry.event;
        trace!(now = entry.time, kind = event.kind(), "step");

        // Taking the callbacks marks the event processed before any of
        // them runs, so late registration is caught.
        let callbacks = event.take_callbacks();
        self.core.stepping.set(true);
        for callback in callbacks {
            match callback {
                Callback::Resume(process) => process::resume(&process, &event),
                Callback::Hook(hook) => hook(&event),
            }
        }
        self.core.stepping.set(false);

        if let Some(Err(failure)) = event.outcome() {
            if !event.is_defused() {
                return Err(SimError::UnhandledFailure {
                    now: self.now(),
                    failure,
                });
            }
        }
        Ok(())
    }

    /// Drive the loop until the given criterion is met.
    ///
    /// Accepts anything convertible to [`Until`]: a time, an event, a
    /// process, or [`Until::Forever`]. Returns the until-event's value
    /// when there is one.
    ///
    /// # Errors
    ///
    /// Propagates [`SimError::UnhandledFailure`] from any step, re-raises
    /// the until-event's own failure, and reports
    /// [`SimError::UntilNotProcessed`] if the heap runs dry before an
    /// until-event fires.
    ///
    /// # Panics
    ///
    /// Panics if a target time is not strictly after `now`.
    pub fn run(&self, until: impl Into<Until>) -> Result<Option<Value>, SimError> {
        match until.into() {
            Until::Forever => loop {
                match self.step() {
                    Ok(()) => {}
                    Err(SimError::EmptySchedule) => return Ok(None),
                    Err(err) => return Err(err),
                }
            },
            Until::At(at) => {
                assert!(
                    at > self.now(),
                    "until(={at}) must be greater than the current simulation time"
                );
                // Urgent, so nothing else scheduled at exactly `at` runs.
                let stop = self.event();
                stop.preset(Ok(Value::unit()), false);
                self.schedule(&stop, Priority::Urgent, at - self.now());
                while !stop.is_processed() {
                    self.step()?;
                }
                Ok(None)
            }
            Until::Event(event) => {
                while !event.is_processed() {
                    match self.step() {
                        Ok(()) => {}
                        Err(SimError::EmptySchedule) => {
                            return Err(SimError::UntilNotProcessed)
                        }
                        Err(err) => return Err(err),
                    }
                }
                match event.outcome() {
                    Some(Ok(value)) => Ok(Some(value)),
                    Some(Err(failure)) => Err(SimError::UnhandledFailure {
                        now: self.now(),
                        failure,
                    }),
                    None => Err(SimError::UntilNotProcessed),
                }
            }
        }
    }

    /// Run until no events remain.
    ///
    /// # Errors
    ///
    /// Propagates any [`SimError::UnhandledFailure`].
    pub fn run_until_idle(&self) -> Result<(), SimError> {
        self.run(Until::Forever).map(|_| ())
    }

    /// Number of currently scheduled entries.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.core.clock.borrow().len()
    }

    /// `true` when nothing is scheduled.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.core.clock.borrow().is_empty()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("now", &self.now())
            .field("pending", &self.pending_events())
            .finish()
    }
}

/// Stop criterion for [`Environment::run`].
pub enum Until {
    /// Run until the heap is empty.
    Forever,
    /// Run until the given simulation time, exactly.
    At(SimTime),
    /// Run until the given event is processed.
    Event(Event),
}

impl From<SimTime> for Until {
    fn from(at: SimTime) -> Self {
        Until::At(at)
    }
}

impl From<Event> for Until {
    fn from(event: Event) -> Self {
        Until::Event(event)
    }
}

impl From<&Event> for Until {
    fn from(event: &Event) -> Self {
        Until::Event(event.clone())
    }
}

impl From<Process> for Until {
    fn from(process: Process) -> Self {
        Until::Event(process.event().clone())
    }
}

impl From<&Process> for Until {
    fn from(process: &Process) -> Self {
        Until::Event(process.event().clone())
    }
}
