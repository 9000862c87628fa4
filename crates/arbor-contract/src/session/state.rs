//! Prefix-based state scoping.
//!
//! State keys route to one of four stores by prefix: `app:` is shared across
//! all users of an app, `user:` across all sessions of one user, `temp:`
//! lives only for the current invocation and is never persisted, and
//! unprefixed keys are session-local.

use serde_json::Value;
use std::collections::HashMap;

/// Flat key/value state map.
pub type StateMap = HashMap<String, Value>;

pub const APP_PREFIX: &str = "app:";
pub const USER_PREFIX: &str = "user:";
pub const TEMP_PREFIX: &str = "temp:";

/// Storage scope of a state key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateScope {
    App,
    User,
    Temp,
    Session,
}

/// Resolve the scope of a key by prefix.
pub fn scope_of(key: &str) -> StateScope {
    if key.starts_with(APP_PREFIX) {
        StateScope::App
    } else if key.starts_with(USER_PREFIX) {
        StateScope::User
    } else if key.starts_with(TEMP_PREFIX) {
        StateScope::Temp
    } else {
        StateScope::Session
    }
}

/// A state delta sliced by scope, prefixes stripped. `temp:` keys are gone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopedDeltas {
    pub app: StateMap,
    pub user: StateMap,
    pub session: StateMap,
}

impl ScopedDeltas {
    pub fn is_empty(&self) -> bool {
        self.app.is_empty() && self.user.is_empty() && self.session.is_empty()
    }
}

/// Slice a delta into per-scope maps. App/user prefixes are stripped,
/// `temp:` keys are discarded, session keys pass through.
pub fn extract_deltas(delta: &StateMap) -> ScopedDeltas {
    let mut out = ScopedDeltas::default();
    for (key, value) in delta {
        match scope_of(key) {
            StateScope::App => {
                out.app
                    .insert(key[APP_PREFIX.len()..].to_string(), value.clone());
            }
            StateScope::User => {
                out.user
                    .insert(key[USER_PREFIX.len()..].to_string(), value.clone());
            }
            StateScope::Temp => {}
            StateScope::Session => {
                out.session.insert(key.clone(), value.clone());
            }
        }
    }
    out
}

/// Rebuild the merged view a session read exposes: prefixes re-attached,
/// session keys passing through. `temp:` keys never appear.
pub fn merge_states(app: &StateMap, user: &StateMap, session: &StateMap) -> StateMap {
    let mut merged = StateMap::with_capacity(app.len() + user.len() + session.len());
    for (key, value) in app {
        merged.insert(format!("{APP_PREFIX}{key}"), value.clone());
    }
    for (key, value) in user {
        merged.insert(format!("{USER_PREFIX}{key}"), value.clone());
    }
    for (key, value) in session {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// A copy of the delta with every `temp:` key removed.
pub fn trim_temp_delta(delta: &StateMap) -> StateMap {
    delta
        .iter()
        .filter(|(key, _)| scope_of(key) != StateScope::Temp)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> StateMap {
        [
            ("app:model".to_string(), json!("gpt")),
            ("user:plan".to_string(), json!("pro")),
            ("temp:scratch".to_string(), json!(42)),
            ("counter".to_string(), json!(1)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn scope_routing() {
        assert_eq!(scope_of("app:x"), StateScope::App);
        assert_eq!(scope_of("user:x"), StateScope::User);
        assert_eq!(scope_of("temp:x"), StateScope::Temp);
        assert_eq!(scope_of("x"), StateScope::Session);
    }

    #[test]
    fn extract_strips_prefixes_and_drops_temp() {
        let deltas = extract_deltas(&sample());
        assert_eq!(deltas.app["model"], json!("gpt"));
        assert_eq!(deltas.user["plan"], json!("pro"));
        assert_eq!(deltas.session["counter"], json!(1));
        assert_eq!(deltas.app.len(), 1);
        assert_eq!(deltas.user.len(), 1);
        assert_eq!(deltas.session.len(), 1);
    }

    #[test]
    fn merge_reattaches_prefixes() {
        let deltas = extract_deltas(&sample());
        let merged = merge_states(&deltas.app, &deltas.user, &deltas.session);
        assert_eq!(merged["app:model"], json!("gpt"));
        assert_eq!(merged["user:plan"], json!("pro"));
        assert_eq!(merged["counter"], json!(1));
        assert!(!merged.contains_key("temp:scratch"));
    }

    #[test]
    fn extract_merge_round_trip_minus_temp() {
        let input = sample();
        let deltas = extract_deltas(&input);
        let merged = merge_states(&deltas.app, &deltas.user, &deltas.session);
        let expected = trim_temp_delta(&input);
        assert_eq!(merged, expected);
    }

    #[test]
    fn trim_removes_only_temp() {
        let trimmed = trim_temp_delta(&sample());
        assert_eq!(trimmed.len(), 3);
        assert!(!trimmed.contains_key("temp:scratch"));
        assert!(trimmed.contains_key("app:model"));
    }
}
