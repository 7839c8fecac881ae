//! Deterministic ordering of permission-scoped screen rules.
//!
//! Rules are applied in ascending order and the last applied rule wins per
//! key. Rules in the `admin` namespace rank above every other rule; within
//! one rank, keys are ordered by name.

use crate::model::screen::{ScreenRules, WILDCARD_ROLE};
use crate::visibility::viewer::HeldPermissions;

const ADMIN_NAMESPACE: &str = "admin";

/// Rank of a rule key; higher ranks are applied later.
pub fn precedence_rank(key: &str) -> u8 {
    let is_admin = key == ADMIN_NAMESPACE
        || key
            .strip_prefix(ADMIN_NAMESPACE)
            .is_some_and(|rest| rest.starts_with('.'));
    u8::from(is_admin)
}

/// Rule keys granted to `held`, in application order. The wildcard key is
/// never included.
pub fn ordered_rule_keys<'a>(rules: &'a ScreenRules, held: &HeldPermissions) -> Vec<&'a str> {
    let mut keys: Vec<&str> = rules
        .keys()
        .map(String::as_str)
        .filter(|key| *key != WILDCARD_ROLE && held.grants(key))
        .collect();
    keys.sort_by(|left, right| {
        precedence_rank(left)
            .cmp(&precedence_rank(right))
            .then_with(|| left.cmp(right))
    });
    keys
}
