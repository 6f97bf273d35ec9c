//! Forbidden leading-token prefixes.

/// Ordered set of lowercase command prefixes that must never be dispatched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blocklist {
    prefixes: Vec<String>,
}

impl Blocklist {
    /// Build from configured entries. Entries are lowercased, blank entries
    /// and duplicates are dropped, order is kept.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut prefixes: Vec<String> = Vec::new();
        for entry in entries {
            let prefix = entry.as_ref().trim().to_lowercase();
            if !prefix.is_empty() && !prefixes.contains(&prefix) {
                prefixes.push(prefix);
            }
        }
        Self { prefixes }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// True if any entry is a prefix of the command's lowercased first token.
    pub fn is_blocked(&self, command: &str) -> bool {
        let token = leading_token(command);
        self.prefixes
            .iter()
            .any(|prefix| token.starts_with(prefix.as_str()))
    }
}

/// First whitespace-delimited token of `command`, lowercased.
pub fn leading_token(command: &str) -> String {
    command
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase()
}
