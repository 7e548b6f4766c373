use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// One locale's string table plus an optional fallback.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocaleDefinition {
    pub code: String,
    pub strings: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_code: Option<String>,
}

/// Fallback-chain string lookup. An explicit object, not a global:
/// embedders own one per application and `clear()` it between tests.
#[derive(Debug, Default)]
pub struct LocaleRegistry {
    locales: HashMap<String, LocaleDefinition>,
}

impl LocaleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a locale.
    pub fn register(&mut self, definition: LocaleDefinition) {
        self.locales.insert(definition.code.clone(), definition);
    }

    /// Walk `code` and its fallback chain until a locale defines `key`.
    /// A visited set guards against fallback cycles.
    pub fn lookup(&self, code: &str, key: &str) -> Option<&str> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut current = Some(code);

        while let Some(code) = current {
            if !visited.insert(code) {
                break;
            }
            let definition = self.locales.get(code)?;
            if let Some(value) = definition.strings.get(key) {
                return Some(value.as_str());
            }
            current = definition.fallback_code.as_deref();
        }

        None
    }

    pub fn contains(&self, code: &str) -> bool {
        self.locales.contains_key(code)
    }

    pub fn clear(&mut self) {
        self.locales.clear();
    }
}
