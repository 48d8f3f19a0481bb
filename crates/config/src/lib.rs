// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oxhv-config: on-disk configuration for the hypervisor.
//!
//! Parsed with `serde` + `toml`, then overlaid with CLI flag overrides in
//! `load::load`. Nothing in here talks to the network or the filesystem
//! beyond reading the one config file.

pub mod cli_overrides;
pub mod load;
pub mod model;
pub mod select;

pub use load::{load, ConfigError};
pub use model::*;
