//! Eventum: a process-based discrete-event simulation engine.
//!
//! # Overview
//!
//! Models are written as cooperative, long-lived activities (processes)
//! that advance virtual time by suspending on *events*. The engine
//! schedules events on a time- and priority-ordered heap, resumes waiting
//! processes in a deterministic order, and supports composition
//! (wait-for-all, wait-for-any) and out-of-band interruption. Shared
//! resources (semaphores, bulk containers, typed stores) live in the
//! companion `eventum-resources` crate.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Environment                         │
//! ├──────────────────────────┬──────────────────────────────┤
//! │  clock                   │  event                       │
//! │  ├─ EventHeap            │  ├─ Event (handle)           │
//! │  └─ (time, prio, seq)    │  ├─ Timeout / Condition      │
//! │                          │  └─ callbacks, outcomes      │
//! ├──────────────────────────┴──────────────────────────────┤
//! │  process: async routines driven by resume callbacks     │
//! │  rt:      wall-clock pacing around step()               │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Laws
//!
//! The engine enforces these invariants; tests cover each one:
//!
//! - **T-001 Time monotonicity** — `now` never decreases; the heap
//!   asserts it on every pop.
//! - **T-002 Deterministic order** — equal `(time, priority)` entries
//!   fire in insertion order; callbacks of one event fire in insertion
//!   order.
//! - **E-001 Single trigger** — an event is succeeded or failed at most
//!   once; a second trigger panics.
//! - **E-002 Processed terminality** — once processed, an event accepts
//!   no further callbacks.
//! - **P-001 Loss-free failures** — a failure nobody defused aborts
//!   `step()` and surfaces from `run()`.
//!
//! # Example
//!
//! Two clock processes ticking at different rates:
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use eventum_core::Environment;
//!
//! let env = Environment::new();
//! let log = Rc::new(RefCell::new(Vec::new()));
//!
//! for (name, tick) in [("fast", 0.5), ("slow", 1.0)] {
//!     let log = log.clone();
//!     env.process(move |ctx| async move {
//!         loop {
//!             log.borrow_mut().push(format!("{name} {}", ctx.now()));
//!             ctx.sleep(tick).await?;
//!         }
//!     });
//! }
//!
//! env.run(2.0).unwrap();
//! assert_eq!(
//!     *log.borrow(),
//!     vec!["fast 0", "slow 0", "fast 0.5", "slow 1", "fast 1", "fast 1.5"]
//! );
//! ```
//!
//! # Single-threaded by design
//!
//! The engine is cooperative and single-threaded: a process runs to its
//! next suspension point atomically with respect to all other processes,
//! callbacks never suspend, and no synchronization primitives exist in
//! the core. Handles (`Environment`, `Event`, `Process`) are cheap
//! `Rc`-based clones and must stay on the creating thread.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod error;
pub mod event;
pub mod process;
pub mod rt;
pub mod simulation;
pub mod util;
pub mod value;

pub use clock::{EventSeq, Priority, SimTime};
pub use error::{Failure, Fault, Interrupt, SimError};
pub use event::condition::{ConditionPredicate, ConditionValue};
pub use event::{Event, Outcome};
pub use process::{Context, Process, WaitFuture};
pub use rt::RealtimeEnvironment;
pub use simulation::{Environment, Until};
pub use util::start_delayed;
pub use value::Value;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
