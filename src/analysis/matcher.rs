//! Batch matching of recognized lines against the catalog

use std::collections::HashSet;

use crate::analysis::fuzzy::FuzzyMatcher;
use crate::catalog::ReferenceIngredient;
use crate::config::MatchingConfig;

/// Match one batch of lines against `catalog` with default tolerances
pub fn match_ingredients<S: AsRef<str>>(
    lines: &[S],
    catalog: &[ReferenceIngredient],
) -> Vec<ReferenceIngredient> {
    IngredientMatcher::default().match_lines(lines, catalog)
}

/// Stateless matcher producing the set of catalog entries found in a batch
#[derive(Debug, Clone, Copy, Default)]
pub struct IngredientMatcher {
    fuzzy: FuzzyMatcher,
}

impl IngredientMatcher {
    pub fn new(config: MatchingConfig) -> Self {
        Self {
            fuzzy: FuzzyMatcher::new(config),
        }
    }

    /// Entries of `catalog` that any of `lines` fuzzily matches
    ///
    /// Results are unique by canonical name; when the catalog repeats a name
    /// the first entry wins. Entries with blank names never match.
    pub fn match_lines<S: AsRef<str>>(
        &self,
        lines: &[S],
        catalog: &[ReferenceIngredient],
    ) -> Vec<ReferenceIngredient> {
        if lines.is_empty() {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut matches = Vec::new();

        for ingredient in catalog {
            if ingredient.name.trim().is_empty() || seen.contains(ingredient.name.as_str()) {
                continue;
            }
            let found = lines
                .iter()
                .any(|line| self.fuzzy.matches(line.as_ref(), &ingredient.name));
            if found {
                seen.insert(ingredient.name.as_str());
                matches.push(ingredient.clone());
            }
        }

        matches
    }
}
