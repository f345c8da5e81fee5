//! Fixed prompts that map straight to static audio assets.
//!
//! Matching is case-insensitive and ignores surrounding and repeated
//! whitespace, so `"Rain"`, `" rain "` and `"RAIN"` all hit the same entry.

use std::collections::BTreeMap;

use crate::util::collapse_whitespace;

/// Built-in entries used when no table is configured.
pub const DEFAULT_PREDEFINED: [(&str, &str); 3] = [
    (
        "rain",
        "https://assets.mixkit.co/music/preview/mixkit-rain-and-thunder-1255.mp3",
    ),
    (
        "ocean",
        "https://assets.mixkit.co/music/preview/mixkit-ocean-waves-1192.mp3",
    ),
    (
        "forest",
        "https://assets.mixkit.co/music/preview/mixkit-forest-birds-1217.mp3",
    ),
];

/// Lookup table from normalized prompt to static asset URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredefinedTable {
    entries: BTreeMap<String, String>,
}

impl PredefinedTable {
    /// Create an empty table.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Normalize a prompt for matching: trim, collapse whitespace, lowercase.
    #[must_use]
    pub fn normalize(prompt: &str) -> String {
        collapse_whitespace(prompt).to_lowercase()
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, prompt: &str, audio_url: impl Into<String>) {
        self.entries.insert(Self::normalize(prompt), audio_url.into());
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with_entry(mut self, prompt: &str, audio_url: impl Into<String>) -> Self {
        self.insert(prompt, audio_url);
        self
    }

    /// Find the static URL for a prompt.
    #[must_use]
    pub fn lookup(&self, prompt: &str) -> Option<&str> {
        self.entries.get(&Self::normalize(prompt)).map(String::as_str)
    }

    /// Whether the prompt has a fixed asset.
    #[must_use]
    pub fn contains(&self, prompt: &str) -> bool {
        self.lookup(prompt).is_some()
    }

    /// Iterate over `(normalized prompt, url)` pairs in prompt order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PredefinedTable {
    fn default() -> Self {
        DEFAULT_PREDEFINED.into_iter().collect()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for PredefinedTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = Self::empty();
        for (prompt, url) in iter {
            table.insert(prompt.as_ref(), url);
        }
        table
    }
}
