//! Property-Based Tests for runkit
//!
//! Uses proptest for config parser invariants:
//! - Parsing never panics
//! - The last assignment of a key wins
//! - Comment and blank lines never produce entries

use proptest::prelude::*;
use std::collections::HashMap;

use runkit::ConfigMap;

/// Keys that survive parsing: non-empty, no `=`, no leading `#`, no whitespace
fn key_strategy() -> impl Strategy<Value = String> {
    "[A-Z][A-Z0-9_]{0,8}"
}

/// Values without line breaks; `=` allowed
fn value_strategy() -> impl Strategy<Value = String> {
    "[ -~]{0,16}"
}

proptest! {
    /// Arbitrary input never panics
    #[test]
    fn parse_never_panics(content in "\\PC*") {
        let _ = ConfigMap::parse(&content);
    }

    /// Last write wins for every key
    #[test]
    fn last_write_wins(pairs in prop::collection::vec((key_strategy(), value_strategy()), 0..20)) {
        let content: String = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}\n"))
            .collect();
        let map = ConfigMap::parse(&content);

        let mut expected: HashMap<&str, &str> = HashMap::new();
        for (k, v) in &pairs {
            expected.insert(k.as_str(), v.as_str());
        }
        prop_assert_eq!(map.len(), expected.len());
        for (k, v) in expected {
            prop_assert_eq!(map.get(k), Some(v));
        }
    }

    /// Comment lines contribute nothing
    #[test]
    fn comments_ignored(pairs in prop::collection::vec((key_strategy(), value_strategy()), 0..10)) {
        let content: String = pairs
            .iter()
            .map(|(k, v)| format!("#{k}={v}\n\n"))
            .collect();
        prop_assert!(ConfigMap::parse(&content).is_empty());
    }
}
