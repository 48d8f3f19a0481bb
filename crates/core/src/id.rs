// SPDX-License-Identifier: MIT

//! Identifiers used throughout the hypervisor.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::borrow::Borrow;
use std::fmt;

/// Name of a project, as selected by the Selector.
///
/// Projects are identified by a non-empty string name; `"default"` is the
/// fallback sentinel when neither a provider nor a rule produces a match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectName(SmolStr);

impl ProjectName {
    pub const DEFAULT: &'static str = "default";

    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    pub fn default_project() -> Self {
        Self(SmolStr::new_static(Self::DEFAULT))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_default(&self) -> bool {
        self.0.as_str() == Self::DEFAULT
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProjectName {
    fn from(s: String) -> Self {
        Self(SmolStr::new(s))
    }
}

impl From<&str> for ProjectName {
    fn from(s: &str) -> Self {
        Self(SmolStr::new(s))
    }
}

impl PartialEq<str> for ProjectName {
    fn eq(&self, other: &str) -> bool {
        self.0.as_str() == other
    }
}

impl Borrow<str> for ProjectName {
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

/// Opaque per-request identifier, generated when `passRequestId` is set and
/// the client did not already supply one in the configured request-id header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        Self(nanoid::nanoid!(21))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
