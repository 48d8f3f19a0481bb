// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oxhv-engine: the Worker Spawner and Lifecycle Manager.
//!
//! This is the hard part of the hypervisor: turning a `SelectedProject`
//! into a running, health-checked worker process, and then keeping exactly
//! one such process alive per project — restarting it on crash or hot
//! reload, reaping it when idle, and coordinating everyone who's waiting
//! for it to become ready.

mod error;
mod importmap;
mod lifecycle;
mod permissions;
mod port;
mod process;
mod reaper;
mod spawner;

pub use error::EngineError;
pub use lifecycle::{LifecycleManager, SpawnCommand};
pub use reaper::{spawn_background, IdleReaper};
pub use spawner::WorkerSpawner;
