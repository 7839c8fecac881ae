//! Visibility merge engine.
//!
//! Merge order for one screen:
//! 1. Start from the `-all-` rule, or `shown: true` without hints.
//! 2. Overlay every rule granted to the viewer in
//!    [`ordered_rule_keys`](crate::visibility::precedence::ordered_rule_keys)
//!    order, key by key.
//!
//! Under [`VisibilityPolicy::WildcardAuthoritative`] step 2 may only fill
//! keys the wildcard left unset.

use crate::model::attribute::AttributeDefinition;
use crate::model::screen::{EffectiveVisibility, ScreenRules, WILDCARD_ROLE};
use crate::visibility::precedence::ordered_rule_keys;
use crate::visibility::viewer::{HeldPermissions, PermissionLookupError, PermissionSource};
use std::collections::BTreeMap;

/// How permission-scoped rules interact with the wildcard rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VisibilityPolicy {
    /// Wildcard is a baseline refined by granted rules.
    #[default]
    Refine,
    /// Keys set by the wildcard cannot be overridden.
    WildcardAuthoritative,
}

impl VisibilityPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Refine => "refine",
            Self::WildcardAuthoritative => "wildcard_authoritative",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "refine" => Some(Self::Refine),
            "wildcard_authoritative" => Some(Self::WildcardAuthoritative),
            _ => None,
        }
    }
}

/// Merges the rules of one screen for one viewer.
pub fn merge_screen_rules(
    rules: Option<&ScreenRules>,
    held: &HeldPermissions,
    policy: VisibilityPolicy,
) -> EffectiveVisibility {
    let mut effective = EffectiveVisibility::default();
    let Some(rules) = rules else {
        return effective;
    };

    let wildcard = rules.get(WILDCARD_ROLE);
    if let Some(wildcard) = wildcard {
        effective.overlay(wildcard, None);
    }

    let locked = match policy {
        VisibilityPolicy::Refine => None,
        VisibilityPolicy::WildcardAuthoritative => wildcard,
    };
    for key in ordered_rule_keys(rules, held) {
        if let Some(rule) = rules.get(key) {
            effective.overlay(rule, locked);
        }
    }
    effective
}

/// Effective rule of `definition` on `screen` for a resolved viewer.
pub fn effective_visibility(
    definition: &AttributeDefinition,
    screen: &str,
    held: &HeldPermissions,
    policy: VisibilityPolicy,
) -> EffectiveVisibility {
    merge_screen_rules(definition.screens.get(screen), held, policy)
}

/// Like [`effective_visibility`], resolving permissions from `source` first.
pub fn effective_visibility_for(
    definition: &AttributeDefinition,
    screen: &str,
    source: &impl PermissionSource,
    policy: VisibilityPolicy,
) -> Result<EffectiveVisibility, PermissionLookupError> {
    let held = HeldPermissions::resolve(source)?;
    Ok(effective_visibility(definition, screen, &held, policy))
}

/// Effective rules for every screen the definition declares.
pub fn effective_screens(
    definition: &AttributeDefinition,
    held: &HeldPermissions,
    policy: VisibilityPolicy,
) -> BTreeMap<String, EffectiveVisibility> {
    definition
        .screens
        .iter()
        .map(|(screen, rules)| {
            (
                screen.clone(),
                merge_screen_rules(Some(rules), held, policy),
            )
        })
        .collect()
}
