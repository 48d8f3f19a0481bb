// SPDX-License-Identifier: MIT

//! Permission shapes, translated by `oxhv-engine` into worker CLI flags.

use serde::{Deserialize, Serialize};

/// A single permission value as it can appear in config or a provider's
/// returned `SelectedProject`.
///
/// `permissions === undefined` grants all (the spawner's default when no
/// `Permissions` is present at all). Within a present `Permissions`, each
/// field independently follows: array → comma-joined allowlist, bool →
/// unqualified allow/deny, string → single-value allowlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionValue {
    Bool(bool),
    One(String),
    Many(Vec<String>),
}

impl PermissionValue {
    /// Render as the value portion of a `--allow-*`/`--deny-*` flag, or
    /// `None` when the flag should be entirely unqualified (bare bool grant
    /// with no allowlist, e.g. `--allow-net`).
    pub fn flag_value(&self) -> Option<String> {
        match self {
            PermissionValue::Bool(_) => None,
            PermissionValue::One(s) => Some(s.clone()),
            PermissionValue::Many(items) => Some(items.join(",")),
        }
    }

    /// Whether this value grants (true-ish) or denies (false-ish).
    ///
    /// A bool is its own polarity. A string/array value is always a grant —
    /// a denied capability with an allowlist is not a meaningful shape in
    /// this model, matching the worker CLI's flag semantics.
    pub fn is_grant(&self) -> bool {
        !matches!(self, PermissionValue::Bool(false))
    }
}

/// Per-capability permission settings translated into worker CLI flags.
///
/// Each field is optional: an absent field means "inherit the default for
/// this capability" rather than explicitly allow or deny it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<PermissionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write: Option<PermissionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net: Option<PermissionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<PermissionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<PermissionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffi: Option<PermissionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sys: Option<PermissionValue>,
}

impl Permissions {
    /// Iterate over `(capability, value)` pairs for every configured field,
    /// in a fixed order, so flag construction is deterministic.
    pub fn entries(&self) -> Vec<(&'static str, &PermissionValue)> {
        let mut out = Vec::with_capacity(7);
        if let Some(v) = &self.read {
            out.push(("read", v));
        }
        if let Some(v) = &self.write {
            out.push(("write", v));
        }
        if let Some(v) = &self.net {
            out.push(("net", v));
        }
        if let Some(v) = &self.env {
            out.push(("env", v));
        }
        if let Some(v) = &self.run {
            out.push(("run", v));
        }
        if let Some(v) = &self.ffi {
            out.push(("ffi", v));
        }
        if let Some(v) = &self.sys {
            out.push(("sys", v));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_true_has_no_flag_value() {
        assert_eq!(PermissionValue::Bool(true).flag_value(), None);
        assert!(PermissionValue::Bool(true).is_grant());
    }

    #[test]
    fn bool_false_is_a_deny() {
        assert!(!PermissionValue::Bool(false).is_grant());
    }

    #[test]
    fn many_joins_with_comma() {
        let v = PermissionValue::Many(vec!["a".into(), "b".into()]);
        assert_eq!(v.flag_value().as_deref(), Some("a,b"));
        assert!(v.is_grant());
    }

    #[test]
    fn entries_only_includes_configured_fields() {
        let perms = Permissions {
            net: Some(PermissionValue::Bool(true)),
            ..Default::default()
        };
        let entries = perms.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "net");
    }
}
