//! Text analysis
//!
//! Tolerant comparison of noisy OCR lines against catalog ingredient names.
//! Everything in here is pure and safe to call from any thread.

pub mod fuzzy;
pub mod matcher;

pub use fuzzy::{fuzzy_match, levenshtein_distance, FuzzyMatcher};
pub use matcher::{match_ingredients, IngredientMatcher};
