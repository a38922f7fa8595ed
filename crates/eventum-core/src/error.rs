//! Failure values and driver errors.
//!
//! Two layers of "going wrong" exist and must not be confused:
//!
//! - [`Failure`] is an in-simulation value. It is what a failed event
//!   carries, what a routine receives at its suspension point, and what a
//!   process propagates when it terminates abnormally. Failures are part of
//!   the model, are clonable and can be handled by routines.
//! - [`SimError`] is a driver-level error returned by
//!   [`Environment::step`](crate::Environment::step) and
//!   [`Environment::run`](crate::Environment::run): an empty schedule, a
//!   missing `until` event, or a failure nobody defused.
//!
//! API-contract violations (triggering an event twice, adding a callback to
//! a processed event, negative delays, zero capacities) are panics, not
//! errors. They are modelling bugs, documented under `# Panics` on the
//! offending methods.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::clock::SimTime;
use crate::value::Value;

/// The failure payload of a failed event.
///
/// A routine observes a `Failure` as the `Err` arm of its suspension point
/// and may handle it locally or propagate it with `?`, failing the process.
#[derive(Debug, Clone, Error)]
pub enum Failure {
    /// An out-of-band interrupt delivered to a process.
    #[error("{0}")]
    Interrupted(Interrupt),
    /// A model-defined or engine-raised fault.
    #[error("{0}")]
    Fault(Fault),
}

impl Failure {
    /// Shorthand for a message-only fault.
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(Fault::new(message))
    }

    /// Shorthand for an interrupt with an optional cause.
    #[must_use]
    pub fn interrupt(cause: Option<Value>) -> Self {
        Self::Interrupted(Interrupt::new(cause))
    }
}

/// The cause-carrying signal injected into a process by
/// [`Process::interrupt`](crate::Process::interrupt).
///
/// The cause is whatever the interrupting party supplied, or `None`.
/// Preemptive resources use it to deliver preemption details.
#[derive(Clone)]
pub struct Interrupt {
    cause: Option<Value>,
}

impl Interrupt {
    /// Build an interrupt with an optional cause.
    #[must_use]
    pub fn new(cause: Option<Value>) -> Self {
        Self { cause }
    }

    /// The cause supplied by the interrupting party, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&Value> {
        self.cause.as_ref()
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(_) => write!(f, "Interrupt(..)"),
            None => write!(f, "Interrupt(None)"),
        }
    }
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A model-defined failure: a message plus an optional payload.
///
/// The engine itself raises faults in one place only, when a routine waits
/// on an already-processed event.
#[derive(Clone)]
pub struct Fault {
    message: Rc<str>,
    payload: Option<Value>,
}

impl Fault {
    /// Build a fault from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into().into(),
            payload: None,
        }
    }

    /// Attach a payload to the fault.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// The fault message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The attached payload, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fault({:?})", self.message)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Errors surfaced by the simulation driver.
#[derive(Debug, Error)]
pub enum SimError {
    /// `step()` was called with nothing left on the heap.
    #[error("no scheduled events remain")]
    EmptySchedule,

    /// `run(until=event)` ran out of events before the event was processed.
    #[error("no scheduled events left but the until event was never processed")]
    UntilNotProcessed,

    /// An event failed, was processed, and no callback defused the failure.
    #[error("unhandled failure at t={now}: {failure}")]
    UnhandledFailure {
        /// Simulation time at which the failure was processed.
        now: SimTime,
        /// The failure itself.
        failure: Failure,
    },

    /// A strict real-time environment fell too far behind the wall clock.
    #[error("simulation too slow for real time ({behind:.3}s behind)")]
    RealTimeOverrun {
        /// How many wall-clock seconds the step lagged.
        behind: f64,
    },
}
