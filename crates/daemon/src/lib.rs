// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oxhv-daemon: the public HTTP boundary.
//!
//! Everything upstream of this crate (`oxhv-core`, `oxhv-config`,
//! `oxhv-adapters`, `oxhv-engine`, `oxhv-storage`) is pure domain logic or
//! process supervision with no opinion about HTTP. This crate is where a
//! `SelectedProject` becomes a routed request, a `HypervisorError` becomes a
//! status code and a JSON body, and the Request Queue/Proxy/Web
//! Handler/OTLP passthrough components described in the specification are
//! wired together behind one `axum::Router`.

mod admin;
mod otlp;
mod proxy;
mod queue;
mod response;
mod router;
mod select;
mod server;
mod state;
mod watcher;
mod web;

pub use response::error_response;
pub use router::build_router;
pub use server::{run, ServerHandles};
pub use state::{AppCapabilities, AppState};
