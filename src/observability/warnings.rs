//! One-time warnings.
//!
//! A warning is emitted at most once per `(category, key)` for the life of
//! the process. Categories listed in `disable_warnings` are never emitted.

use std::sync::OnceLock;

use dashmap::DashSet;

use crate::config;

/// Category silenced by `disable_warnings = ["deprecations"]`.
pub const DEPRECATIONS: &str = "deprecations";

fn issued() -> &'static DashSet<String> {
    static ISSUED: OnceLock<DashSet<String>> = OnceLock::new();
    ISSUED.get_or_init(DashSet::new)
}

/// Warn once for this category and key. Returns true if the warning was emitted.
pub fn warn_once(category: &str, key: &str, message: &str) -> bool {
    if config::current().warnings_disabled(category) {
        return false;
    }
    if !issued().insert(format!("{category}:{key}")) {
        return false;
    }
    tracing::warn!(category = %category, "{}", message);
    true
}

/// Deprecation notice, emitted once per key.
pub fn deprecation_warning(key: &str, message: &str) -> bool {
    warn_once(DEPRECATIONS, key, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warns_only_once() {
        assert!(warn_once("test", "warns-once", "first"));
        assert!(!warn_once("test", "warns-once", "second"));
        assert!(warn_once("test", "warns-once-other", "other key"));
    }

    #[test]
    fn test_disabled_category_is_silent() {
        let mut settings = config::Settings::default();
        settings.disable_warnings = vec![DEPRECATIONS.to_string()];
        let _guard = config::override_for_thread(settings);

        assert!(!deprecation_warning("disabled-category", "hidden"));
    }
}
