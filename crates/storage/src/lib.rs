// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oxhv-storage: the single lock-guarded owner of all process-wide state.
//!
//! Everything the Lifecycle Manager and Selector need to coordinate across
//! requests — which projects have a running worker, who is mid-spawn, who
//! is waiting for readiness, inflight counts, idle timestamps — lives behind
//! one `parking_lot::Mutex` in [`StateManager`]. Callers take the lock for a
//! brief, synchronous critical section and never hold it across an `.await`.

mod health;
mod manager;
mod picker;
mod pool;

pub use health::HealthSnapshot;
pub use manager::StateManager;
pub use picker::{Picker, SingleWorkerPicker};
pub use pool::PoolEntry;
