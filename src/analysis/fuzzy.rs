//! Fuzzy comparison of a recognized line against one ingredient name

use crate::config::MatchingConfig;

/// Edit distance with unit cost for insertion, deletion and substitution
///
/// Distances are counted in characters, not bytes.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// Compare `line` against `name` with the default tolerances
pub fn fuzzy_match(line: &str, name: &str) -> bool {
    FuzzyMatcher::default().matches(line, name)
}

/// Length-aware fuzzy comparison
///
/// Short names only match as whole words; longer names match as substrings
/// or within an edit distance that grows with the name length.
#[derive(Debug, Clone, Copy, Default)]
pub struct FuzzyMatcher {
    config: MatchingConfig,
}

impl FuzzyMatcher {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    /// Maximum edit distance tolerated for a name of `name_len` characters
    pub fn distance_threshold(&self, name_len: usize) -> usize {
        if name_len >= self.config.long_name_len {
            self.config.long_name_tolerance
        } else if name_len >= self.config.short_name_len {
            self.config.medium_name_tolerance
        } else {
            0
        }
    }

    /// Whether `line` plausibly contains the ingredient `name`
    pub fn matches(&self, line: &str, name: &str) -> bool {
        let line = line.to_lowercase();
        let name = name.to_lowercase();

        if line == name {
            return true;
        }

        let name_len = name.chars().count();
        if name_len < self.config.short_name_len {
            return contains_whole_word(&line, &name);
        }

        if line.contains(&name) {
            return true;
        }

        levenshtein_distance(&line, &name) <= self.distance_threshold(name_len)
    }
}

/// True if `needle` occurs in `haystack` bounded by non-letters on both sides
fn contains_whole_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }

    // Occurrences may overlap, so resume one character past each candidate
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(needle) {
        let start = from + offset;
        let end = start + needle.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        if !before.is_some_and(char::is_alphabetic) && !after.is_some_and(char::is_alphabetic) {
            return true;
        }
        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }
    false
}
