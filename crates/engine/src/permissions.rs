// SPDX-License-Identifier: MIT

//! Translating `Permissions` into worker command-line flags.

use oxhv_core::Permissions;

/// Build `--allow-*`/`--deny-*` flags for `permissions`. `None` (no
/// `Permissions` present at all) grants everything — a single
/// `--allow-all` flag, matching `permissions === undefined ⇒ grant all`.
pub fn to_flags(permissions: Option<&Permissions>) -> Vec<String> {
    let Some(permissions) = permissions else {
        return vec!["--allow-all".to_string()];
    };

    permissions
        .entries()
        .into_iter()
        .map(|(capability, value)| {
            let verb = if value.is_grant() { "allow" } else { "deny" };
            match value.flag_value() {
                Some(arg) => format!("--{verb}-{capability}={arg}"),
                None => format!("--{verb}-{capability}"),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxhv_core::permissions::PermissionValue;

    #[test]
    fn absent_permissions_grants_all() {
        assert_eq!(to_flags(None), vec!["--allow-all"]);
    }

    #[test]
    fn bool_grant_is_unqualified() {
        let perms = Permissions {
            net: Some(PermissionValue::Bool(true)),
            ..Default::default()
        };
        assert_eq!(to_flags(Some(&perms)), vec!["--allow-net"]);
    }

    #[test]
    fn bool_deny_renders_deny_flag() {
        let perms = Permissions {
            write: Some(PermissionValue::Bool(false)),
            ..Default::default()
        };
        assert_eq!(to_flags(Some(&perms)), vec!["--deny-write"]);
    }

    #[test]
    fn array_becomes_comma_joined_allowlist() {
        let perms = Permissions {
            read: Some(PermissionValue::Many(vec!["/tmp".into(), "/srv".into()])),
            ..Default::default()
        };
        assert_eq!(to_flags(Some(&perms)), vec!["--allow-read=/tmp,/srv"]);
    }

    #[test]
    fn single_string_becomes_single_value_allowlist() {
        let perms = Permissions {
            env: Some(PermissionValue::One("HOME".into())),
            ..Default::default()
        };
        assert_eq!(to_flags(Some(&perms)), vec!["--allow-env=HOME"]);
    }

    #[test]
    fn flags_follow_the_fixed_capability_order() {
        let perms = Permissions {
            sys: Some(PermissionValue::Bool(true)),
            read: Some(PermissionValue::Bool(true)),
            ..Default::default()
        };
        assert_eq!(to_flags(Some(&perms)), vec!["--allow-read", "--allow-sys"]);
    }
}
