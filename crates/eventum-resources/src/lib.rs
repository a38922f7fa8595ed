//! Shared-resource primitives for the eventum simulation engine.
//!
//! # Overview
//!
//! Three resource families cover the common contention patterns of
//! process-based models:
//!
//! - [`Resource`] / [`PriorityResource`] / [`PreemptiveResource`] — an
//!   N-slot semaphore, optionally serving waiters by priority and
//!   optionally evicting users for sufficiently urgent requests;
//! - [`Container`] — a scalar bulk level bounded by a capacity;
//! - [`Store`] / [`FilterStore`] — typed FIFO item queues, optionally
//!   with per-getter predicates.
//!
//! All of them share one mechanism: an operation returns an event that
//! succeeds when the resource's invariant admits it, pending operations
//! wait in put/get queues, and every completed operation re-runs the
//! opposite queue in the same simulation instant, so nothing that could
//! be satisfied stays blocked.
//!
//! # Laws
//!
//! - **R-001 Capacity safety** — user count, container level and item
//!   count never exceed the configured capacity.
//! - **R-002 Queue liveness** — after any state change, every pending
//!   operation that could be satisfied is satisfied in the same instant.
//! - **R-003 No overtaking** — a blocked waiter at the head of the
//!   service order shields later waiters from slipping past it
//!   (filter-store getters excepted by design).
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use eventum_core::{Environment, Value};
//! use eventum_resources::Resource;
//!
//! let env = Environment::new();
//! let pump = Rc::new(Resource::new(&env, 1));
//! let log = Rc::new(RefCell::new(Vec::new()));
//!
//! for (name, arrival) in [("car A", 0.0), ("car B", 0.5)] {
//!     let pump = pump.clone();
//!     let log = log.clone();
//!     env.process(move |ctx| async move {
//!         ctx.sleep(arrival).await?;
//!         let slot = pump.request();
//!         ctx.wait(&slot).await?;
//!         log.borrow_mut().push(format!("{name} fueling at {}", ctx.now()));
//!         ctx.sleep(2.0).await?;
//!         pump.release(&slot);
//!         Ok(Value::unit())
//!     });
//! }
//!
//! env.run_until_idle().unwrap();
//! assert_eq!(
//!     *log.borrow(),
//!     vec!["car A fueling at 0", "car B fueling at 2"]
//! );
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod base;
pub mod container;
pub mod resource;
pub mod store;

pub use container::{Container, ContainerGet, ContainerPut};
pub use resource::{Preempted, PreemptiveResource, PriorityResource, Request, Resource};
pub use store::{FilterStore, Store, StoreGet, StorePut};
