//! Wall-clock pacing for interactive and hardware-in-the-loop runs.
//!
//! [`RealtimeEnvironment`] wraps an ordinary [`Environment`] and delays
//! each step until the wall clock has caught up with the next event's
//! virtual time, scaled by a `factor` (wall seconds per unit of virtual
//! time). The virtual-time semantics are untouched: the same events fire
//! in the same order with the same `now` values, just not before their
//! wall-clock deadline.

use std::time::{Duration, Instant};

use tracing::trace;

use crate::clock::{Priority, SimTime};
use crate::error::SimError;
use crate::simulation::{Environment, Until};
use crate::value::Value;

/// An environment whose `step()` is synchronized with the wall clock.
pub struct RealtimeEnvironment {
    env: Environment,
    factor: f64,
    strict: bool,
    start_wall: Instant,
    start_sim: SimTime,
}

impl RealtimeEnvironment {
    /// Wrap `env`, pacing it at `factor` wall seconds per virtual time
    /// unit.
    ///
    /// Strict mode is on by default: a step that falls behind by more
    /// than one `factor` reports [`SimError::RealTimeOverrun`].
    ///
    /// # Panics
    ///
    /// Panics unless `factor > 0`.
    #[must_use]
    pub fn new(env: Environment, factor: f64) -> Self {
        assert!(factor > 0.0, "factor(={factor}) must be > 0");
        let start_sim = env.now();
        Self {
            env,
            factor,
            strict: true,
            start_wall: Instant::now(),
            start_sim,
        }
    }

    /// Disable or re-enable the overrun check.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// The wrapped environment.
    #[must_use]
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Re-anchor the wall-clock reference to the present.
    ///
    /// Call after a pause so the backlog is not treated as lag.
    pub fn sync(&mut self) {
        self.start_wall = Instant::now();
        self.start_sim = self.env.now();
    }

    /// Process one event, no earlier than its wall-clock deadline.
    ///
    /// # Errors
    ///
    /// [`SimError::RealTimeOverrun`] in strict mode when more than one
    /// `factor` behind; otherwise whatever the underlying step reports.
    pub fn step(&mut self) -> Result<(), SimError> {
        let next = self.env.peek();
        if next.is_finite() {
            let sim_delta = next - self.start_sim;
            let elapsed = self.start_wall.elapsed().as_secs_f64();
            let wait = sim_delta * self.factor - elapsed;
            if wait > 0.0 {
                trace!(wait, "pacing");
                std::thread::sleep(Duration::from_secs_f64(wait));
            } else if self.strict && -wait > self.factor {
                return Err(SimError::RealTimeOverrun { behind: -wait });
            }
        }
        self.env.step()
    }

    /// Drive the paced loop until the given criterion is met.
    ///
    /// Mirrors [`Environment::run`], substituting the paced step.
    ///
    /// # Errors
    ///
    /// As for [`Environment::run`], plus [`SimError::RealTimeOverrun`].
    ///
    /// # Panics
    ///
    /// Panics if a target time is not strictly after `now`.
    pub fn run(&mut self, until: impl Into<Until>) -> Result<Option<Value>, SimError> {
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
                    at > self.env.now(),
                    "until(={at}) must be greater than the current simulation time"
                );
                let stop = self.env.event();
                stop.preset(Ok(Value::unit()), false);
                self.env
                    .schedule(&stop, Priority::Urgent, at - self.env.now());
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
                        now: self.env.now(),
                        failure,
                    }),
                    None => Err(SimError::UntilNotProcessed),
                }
            }
        }
    }
}
