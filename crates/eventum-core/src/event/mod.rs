//! The event object and its lifecycle.
//!
//! # Lifecycle
//!
//! An event moves through exactly three states, in order:
//!
//! ```text
//! untriggered ──succeed()/fail()──▶ triggered ──step()──▶ processed
//!   value: None                      value: Some           callbacks: None
//! ```
//!
//! Triggering assigns the outcome and schedules the event; processing
//! happens when the scheduler pops it and invokes its callbacks in
//! insertion order. Both transitions are one-way and one-shot:
//!
//! - an event can be succeeded or failed exactly once;
//! - once processed, the callback list is gone and further registration
//!   is a bug.
//!
//! # Handles
//!
//! [`Event`] is a cheap-clone handle over reference-counted interior
//! state; equality is identity. Subtypes of the closed hierarchy
//! (timeouts, processes, conditions, the internal initialize and
//! interruption events) are all `Event`s with a tagged payload, so they
//! compose freely: a process waits on a condition over timeouts exactly
//! the way it waits on a plain event.

pub mod condition;

use std::cell::{RefCell, RefMut};
use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::rc::Rc;

use crate::error::Failure;
use crate::process::{Process, ProcessState};
use crate::simulation::Environment;
use crate::value::Value;

use self::condition::ConditionState;

/// The outcome a triggered event carries: a payload or a failure.
pub type Outcome = Result<Value, Failure>;

/// A registered reaction to an event being processed.
///
/// The set is closed on purpose: process resumption needs identity (an
/// interrupt removes exactly its victim's resume hook), while everything
/// else (condition observers, resource passes, user callbacks) is an
/// opaque one-shot closure.
pub(crate) enum Callback {
    /// Resume the given process with this event's outcome.
    Resume(Process),
    /// Run an arbitrary one-shot closure.
    Hook(Box<dyn FnOnce(&Event)>),
}

/// Variant payload of the tagged event hierarchy.
pub(crate) enum EventPayload {
    /// No extra state: plain events, timeouts, internal helpers.
    Plain,
    /// A process: the suspended routine and its wait target.
    Process(ProcessState),
    /// A condition: children, predicate and recorded outcomes.
    Condition(ConditionState),
}

pub(crate) struct EventInner {
    pub env: Environment,
    pub kind: &'static str,
    pub outcome: Option<Outcome>,
    pub callbacks: Option<Vec<Callback>>,
    pub defused: bool,
    pub payload: EventPayload,
}

/// A triggerable value-or-failure carrier with an ordered callback list.
///
/// Created by [`Environment`] factories (or by resources). Cloning the
/// handle is cheap and aliases the same event; `==` compares identity.
#[derive(Clone)]
pub struct Event {
    pub(crate) inner: Rc<RefCell<EventInner>>,
}

impl Event {
    pub(crate) fn new(env: Environment, kind: &'static str, payload: EventPayload) -> Self {
        Self {
            inner: Rc::new(RefCell::new(EventInner {
                env,
                kind,
                outcome: None,
                callbacks: Some(Vec::new()),
                defused: false,
                payload,
            })),
        }
    }

    /// The environment this event lives in.
    #[must_use]
    pub fn env(&self) -> Environment {
        self.inner.borrow().env.clone()
    }

    /// `true` once the event has been succeeded or failed.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.inner.borrow().outcome.is_some()
    }

    /// `true` once the scheduler has invoked all callbacks.
    #[must_use]
    pub fn is_processed(&self) -> bool {
        self.inner.borrow().callbacks.is_none()
    }

    /// `Some(true)` after success, `Some(false)` after failure, `None`
    /// while untriggered.
    #[must_use]
    pub fn ok(&self) -> Option<bool> {
        self.inner
            .borrow()
            .outcome
            .as_ref()
            .map(|outcome| outcome.is_ok())
    }

    /// The outcome, if the event has been triggered.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        self.inner.borrow().outcome.clone()
    }

    /// The success value, if the event succeeded.
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        match self.inner.borrow().outcome.as_ref() {
            Some(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Mark the event successful and schedule it at the current time.
    ///
    /// # Panics
    ///
    /// Panics if the event has already been triggered.
    pub fn succeed(&self, value: Value) {
        self.trigger(Ok(value));
    }

    /// Mark the event failed and schedule it at the current time.
    ///
    /// Unless some callback [`defuse`](Self::defuse)s it, the failure is
    /// re-raised out of `step()` when the event is processed.
    ///
    /// # Panics
    ///
    /// Panics if the event has already been triggered.
    pub fn fail(&self, failure: Failure) {
        self.trigger(Err(failure));
    }

    /// Copy another event's outcome onto this one and schedule it.
    ///
    /// Useful for forwarding: chain an event to fire with whatever a
    /// source event produced.
    ///
    /// # Panics
    ///
    /// Panics if `source` is untriggered or this event is triggered.
    pub fn trigger_from(&self, source: &Event) {
        let Some(outcome) = source.outcome() else {
            panic!("cannot forward an untriggered event");
        };
        self.trigger(outcome);
    }

    fn trigger(&self, outcome: Outcome) {
        {
            let mut inner = self.inner.borrow_mut();
            assert!(
                inner.outcome.is_none(),
                "{} has already been triggered",
                inner.kind
            );
            inner.outcome = Some(outcome);
        }
        let env = self.env();
        env.schedule(self, crate::clock::Priority::Normal, 0.0);
    }

    /// Mark a failure as handled so the scheduler does not re-raise it.
    pub fn defuse(&self) {
        self.inner.borrow_mut().defused = true;
    }

    pub(crate) fn is_defused(&self) -> bool {
        self.inner.borrow().defused
    }

    /// Append a callback, invoked with this event when it is processed.
    ///
    /// Callbacks run in insertion order. This is the hook resources and
    /// observers use to react to completion; waiting processes register
    /// through it implicitly.
    ///
    /// # Panics
    ///
    /// Panics if the event has already been processed.
    pub fn add_callback(&self, callback: impl FnOnce(&Event) + 'static) {
        self.push_callback(Callback::Hook(Box::new(callback)));
    }

    pub(crate) fn push_callback(&self, callback: Callback) {
        let mut inner = self.inner.borrow_mut();
        match inner.callbacks.as_mut() {
            Some(callbacks) => callbacks.push(callback),
            None => panic!("cannot add a callback to a processed {}", inner.kind),
        }
    }

    /// Take the callback list, marking the event processed.
    pub(crate) fn take_callbacks(&self) -> Vec<Callback> {
        self.inner
            .borrow_mut()
            .callbacks
            .take()
            .unwrap_or_default()
    }

    /// Remove the resume hook of `process`, if registered.
    ///
    /// Exactly one such hook exists per waiting process; interrupts use
    /// this to unhook a victim from its current target.
    pub(crate) fn remove_resume(&self, process: &Process) {
        let mut inner = self.inner.borrow_mut();
        if let Some(callbacks) = inner.callbacks.as_mut() {
            if let Some(pos) = callbacks
                .iter()
                .position(|cb| matches!(cb, Callback::Resume(p) if p.same(process)))
            {
                callbacks.remove(pos);
            }
        }
    }

    /// Assign an outcome without scheduling.
    ///
    /// Internal construction path for events born triggered: timeouts,
    /// initialize events, interruptions and the stop event of a bounded
    /// run. The caller schedules explicitly.
    pub(crate) fn preset(&self, outcome: Outcome, defused: bool) {
        let mut inner = self.inner.borrow_mut();
        debug_assert!(inner.outcome.is_none());
        inner.outcome = Some(outcome);
        inner.defused = defused;
    }

    /// Swap the payload of an already-successful outcome in place.
    ///
    /// Conditions assemble their result mapping at processed-time and use
    /// this to replace the placeholder they succeeded with.
    pub(crate) fn replace_value(&self, value: Value) {
        let mut inner = self.inner.borrow_mut();
        if let Some(Ok(slot)) = inner.outcome.as_mut() {
            *slot = value;
        }
    }

    pub(crate) fn borrow_inner_mut(&self) -> RefMut<'_, EventInner> {
        self.inner.borrow_mut()
    }

    pub(crate) fn kind(&self) -> &'static str {
        self.inner.borrow().kind
    }

    pub(crate) fn is_condition(&self) -> bool {
        matches!(self.inner.borrow().payload, EventPayload::Condition(_))
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Event {}

impl AsRef<Event> for Event {
    fn as_ref(&self) -> &Event {
        self
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let state = if inner.callbacks.is_none() {
            "processed"
        } else if inner.outcome.is_some() {
            "triggered"
        } else {
            "untriggered"
        };
        write!(f, "<{} {state} at {:p}>", inner.kind, Rc::as_ptr(&self.inner))
    }
}

/// `a & b` waits for both events.
impl BitAnd for &Event {
    type Output = Event;

    fn bitand(self, rhs: &Event) -> Event {
        self.env().all_of([self.clone(), rhs.clone()])
    }
}

/// `a | b` waits for whichever event fires first.
impl BitOr for &Event {
    type Output = Event;

    fn bitor(self, rhs: &Event) -> Event {
        self.env().any_of([self.clone(), rhs.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::Environment;

    #[test]
    fn test_lifecycle_flags() {
        let env = Environment::new();
        let ev = env.event();
        assert!(!ev.is_triggered());
        assert!(!ev.is_processed());
        assert_eq!(ev.ok(), None);

        ev.succeed(Value::new(3u8));
        assert!(ev.is_triggered());
        assert!(!ev.is_processed());
        assert_eq!(ev.ok(), Some(true));

        env.step().unwrap();
        assert!(ev.is_processed());
        assert_eq!(*ev.value().unwrap().downcast::<u8>().unwrap(), 3);
    }

    #[test]
    #[should_panic(expected = "already been triggered")]
    fn test_double_trigger_panics() {
        let env = Environment::new();
        let ev = env.event();
        ev.succeed(Value::unit());
        ev.fail(Failure::fault("late"));
    }

    #[test]
    #[should_panic(expected = "cannot add a callback to a processed")]
    fn test_callback_after_processed_panics() {
        let env = Environment::new();
        let ev = env.event();
        ev.succeed(Value::unit());
        env.step().unwrap();
        ev.add_callback(|_| {});
    }

    #[test]
    fn test_callbacks_fire_in_insertion_order() {
        let env = Environment::new();
        let ev = env.event();
        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let log = log.clone();
            ev.add_callback(move |_| log.borrow_mut().push(tag));
        }
        ev.succeed(Value::unit());
        env.step().unwrap();
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_trigger_from_forwards_outcome() {
        let env = Environment::new();
        let source = env.event();
        let sink = env.event();
        source.succeed(Value::new("payload"));
        sink.trigger_from(&source);
        assert_eq!(
            *sink.value().unwrap().downcast::<&str>().unwrap(),
            "payload"
        );
    }

    #[test]
    fn test_identity_equality() {
        let env = Environment::new();
        let a = env.event();
        let b = env.event();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
