//! Process-wide configuration store.
//!
//! A key-value snapshot of compiler options, loaded once by the hosting
//! process and read only at session initialization time. Typed getters fall
//! back to a caller-supplied default; the orchestrator keeps every numeric
//! threshold here rather than in literals at the use sites.

use rustc_hash::FxHashMap;

/// Immutable-after-construction key-value option store.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    values: FxHashMap<String, String>,
}

impl ConfigStore {
    /// Create an empty store (every getter returns its default).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option. Intended for host setup and tests, before any
    /// compilation starts.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Raw string lookup.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Unsigned integer option with default.
    #[must_use]
    pub fn get_u32(&self, key: &str, default: u32) -> u32 {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// `usize` option with default.
    #[must_use]
    pub fn get_usize(&self, key: &str, default: usize) -> usize {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Boolean option with default. Accepts `1`/`0`/`true`/`false`.
    #[must_use]
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some("1") | Some("true") => true,
            Some("0") | Some("false") => false,
            _ => default,
        }
    }

    /// Number of options set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no options are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
