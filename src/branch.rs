//! Branch name resolution.
//!
//! Callers (and the voice agent in particular) send free-text office
//! names like "los banos" or "the Modesto office". The portal's office
//! picker only accepts its exact label, bracketed office code included,
//! so every request goes through this directory first.

use tracing::warn;

/// Alias -> canonical office label, stored exactly as the office picker
/// renders them, trailing space included.
const DEFAULT_BRANCHES: &[(&str, &str)] = &[
    ("livingston", "Suave Dental Livingston [105] "),
    ("los banos", "Suave Dental Los Banos [101] "),
    ("merced", "Suave Dental Merced [110] "),
    ("modesto", "Suave Dental Modesto [103] "),
    ("riverbank", "Suave Dental Riverbank [104] "),
    ("roseville", "Suave Dental Roseville [109] "),
    ("stockton", "Suave Dental Stockton [102] "),
    ("west sacramento", "Suave Dental West Sacramento [106] "),
    ("sacramento", "Suave Dental West Sacramento [106] "),
];

/// Read-only alias table, built once at startup and shared by handlers.
#[derive(Debug)]
pub struct BranchDirectory {
    /// (alias, label) pairs sorted longest-alias-first so substring
    /// matching prefers "west sacramento" over "sacramento".
    entries: Vec<(String, String)>,
}

impl BranchDirectory {
    /// Directory over the built-in office table.
    pub fn new() -> Self {
        Self::from_entries(DEFAULT_BRANCHES.iter().map(|(a, l)| (*a, *l)))
    }

    fn from_entries<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut entries: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(alias, label)| (normalize_alias(alias), label.to_string()))
            .collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { entries }
    }

    /// Resolve a free-text branch name to its canonical office label.
    ///
    /// Input that already carries a bracketed office code is treated as
    /// canonical and passed through unchanged. Unknown names also pass
    /// through (with a warning) so the office-picker step fails visibly
    /// rather than here.
    pub fn resolve(&self, input: &str) -> String {
        if input.contains('[') {
            return input.to_string();
        }

        let normalized = normalize_alias(input);

        if let Some((_, label)) = self.entries.iter().find(|(alias, _)| *alias == normalized) {
            return label.clone();
        }

        // Longest alias first: containment, not equality.
        if let Some((_, label)) = self
            .entries
            .iter()
            .find(|(alias, _)| normalized.contains(alias.as_str()))
        {
            return label.clone();
        }

        warn!("No branch mapping found for: {}", input);
        input.to_string()
    }
}

impl Default for BranchDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase, trim, drop punctuation, collapse runs of whitespace.
fn normalize_alias(input: &str) -> String {
    let cleaned: String = input
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
