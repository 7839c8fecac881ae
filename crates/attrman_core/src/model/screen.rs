//! Screen visibility records.
//!
//! A definition stores `screens[screen][role_or_wildcard] = rule`. Rules are
//! partial: a key absent from a rule leaves the merged value untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Role key whose rule is applied before any permission-specific rule.
pub const WILDCARD_ROLE: &str = "-all-";

/// Partial display rule for one screen and one role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenVisibilityRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shown: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_class: Option<String>,
    /// Any other display hint (`required`, `null`, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ScreenVisibilityRule {
    pub fn shown(shown: bool) -> Self {
        Self {
            shown: Some(shown),
            ..Self::default()
        }
    }

    pub fn with_item_class(mut self, item_class: impl Into<String>) -> Self {
        self.item_class = Some(item_class.into());
        self
    }

    pub fn with_hint(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Rules of one screen keyed by permission name or [`WILDCARD_ROLE`].
pub type ScreenRules = BTreeMap<String, ScreenVisibilityRule>;

/// All screens of one attribute.
pub type Screens = BTreeMap<String, ScreenRules>;

/// Merged rule for one viewer. Computed on every read, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveVisibility {
    pub shown: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_class: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for EffectiveVisibility {
    fn default() -> Self {
        Self {
            shown: true,
            item_class: None,
            extra: BTreeMap::new(),
        }
    }
}

impl EffectiveVisibility {
    /// Overlays keys present in `rule`, skipping keys set by `locked`.
    pub(crate) fn overlay(
        &mut self,
        rule: &ScreenVisibilityRule,
        locked: Option<&ScreenVisibilityRule>,
    ) {
        if let Some(shown) = rule.shown {
            if locked.map_or(true, |locked| locked.shown.is_none()) {
                self.shown = shown;
            }
        }
        if let Some(item_class) = &rule.item_class {
            if locked.map_or(true, |locked| locked.item_class.is_none()) {
                self.item_class = Some(item_class.clone());
            }
        }
        for (key, value) in &rule.extra {
            if locked.map_or(true, |locked| !locked.extra.contains_key(key)) {
                self.extra.insert(key.clone(), value.clone());
            }
        }
    }
}
