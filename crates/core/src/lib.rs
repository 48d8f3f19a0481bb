// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oxhv-core: domain types shared across the hypervisor crates.
//!
//! Nothing in this crate touches I/O — no subprocess handles, no sockets, no
//! tokio. Everything here is a plain value the rest of the workspace agrees
//! on: project identity, the clock abstraction used for testable timeouts,
//! the selection/permission shapes produced by the Selector, and the error
//! taxonomy the public HTTP boundary translates into responses.

pub mod clock;
pub mod error;
pub mod id;
pub mod permissions;
pub mod selection;
pub mod worker;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::HypervisorError;
pub use id::{ProjectName, RequestId};
pub use permissions::Permissions;
pub use selection::SelectedProject;
pub use worker::WorkerHandle;
