// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oxhv-adapters: the pluggable capabilities injected into the hypervisor at
//! startup.
//!
//! Three families of trait-object capability live here, all `async_trait`
//! based rather than closures-over-heap, per the config-layer redesign: a
//! user supplies an `Arc<dyn ProjectSelector>`, `Arc<dyn RequestTransformer>`
//! or `Arc<dyn ExportSink>` instead of a raw callback, and the rest of the
//! workspace only ever sees the trait object.
//!
//! Source resolution (`Resolver`) is the one capability the hypervisor
//! always needs a concrete answer for — every project has a source, even if
//! it's just the local filesystem — so this crate ships working
//! implementations (local, HTTP, GitHub) rather than leaving it purely
//! abstract.

pub mod resolver;
pub mod selector;
pub mod sink;
pub mod transformer;

pub use resolver::{GitHubResolver, HttpResolver, LocalResolver, Resolver, ResolverError};
pub use selector::ProjectSelector;
pub use sink::{ExportSink, OtlpContext, OtlpSignalKind};
pub use transformer::RequestTransformer;
