//! Small modelling helpers on top of the core primitives.

use std::future::Future;

use crate::clock::SimTime;
use crate::event::Outcome;
use crate::process::{Context, Process};
use crate::simulation::Environment;
use crate::value::Value;

/// Start a process for `routine` after `delay` time units.
///
/// Returns the starter process; its value is the started [`Process`],
/// recoverable with `Value::downcast::<Process>()` once the starter has
/// terminated.
///
/// # Panics
///
/// Panics unless `delay > 0`; with a zero delay, call
/// [`Environment::process`] directly.
pub fn start_delayed<F, Fut>(env: &Environment, delay: SimTime, routine: F) -> Process
where
    F: FnOnce(Context) -> Fut + 'static,
    Fut: Future<Output = Outcome> + 'static,
{
    assert!(delay > 0.0, "delay(={delay}) must be > 0");
    let env = env.clone();
    env.clone().process(move |ctx| async move {
        ctx.sleep(delay).await?;
        let started = env.process(routine);
        Ok(Value::new(started))
    })
}
