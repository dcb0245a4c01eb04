//! Reference ingredient catalog
//!
//! Catalog entries are immutable once loaded. The coordinator reads a snapshot
//! of the catalog per batch; an external loader replaces it wholesale.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Result, ScanError};

/// Ordinal risk classification (HIGH > MEDIUM > LOW)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HazardLevel {
    Low,
    Medium,
    High,
}

impl HazardLevel {
    /// HIGH and MEDIUM findings must be acknowledged by the user
    pub fn is_harmful(self) -> bool {
        matches!(self, HazardLevel::High | HazardLevel::Medium)
    }
}

impl fmt::Display for HazardLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HazardLevel::High => "HIGH",
            HazardLevel::Medium => "MEDIUM",
            HazardLevel::Low => "LOW",
        };
        f.write_str(label)
    }
}

/// Active ingredient-category filter of a scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    #[default]
    Food,
    Cosmetics,
}

impl ScanMode {
    /// Category tag matched against `ReferenceIngredient::categories`
    pub fn category(self) -> &'static str {
        match self {
            ScanMode::Food => "FOOD",
            ScanMode::Cosmetics => "COSMETICS",
        }
    }

    /// Placeholder product label used for saved records
    pub fn product_label(self) -> &'static str {
        match self {
            ScanMode::Food => "Food Scan",
            ScanMode::Cosmetics => "Cosmetic Scan",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.category())
    }
}

/// A catalog entry describing one known hazardous ingredient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceIngredient {
    /// Canonical name, also the identity key
    pub name: String,
    pub hazard_level: HazardLevel,
    #[serde(default)]
    pub description: String,
    /// Category tags; empty means the ingredient applies to every mode
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functional_category: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub localized_names: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub localized_descriptions: HashMap<String, String>,
}

impl ReferenceIngredient {
    /// Create an entry with no categories and no translations
    pub fn new(name: impl Into<String>, hazard_level: HazardLevel) -> Self {
        Self {
            name: name.into(),
            hazard_level,
            description: String::new(),
            categories: Vec::new(),
            functional_category: None,
            localized_names: HashMap::new(),
            localized_descriptions: HashMap::new(),
        }
    }

    /// Builder-style helper to attach category tags
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this ingredient participates in matching for `mode`
    pub fn applies_to(&self, mode: ScanMode) -> bool {
        self.categories.is_empty()
            || self
                .categories
                .iter()
                .any(|c| c.trim().eq_ignore_ascii_case(mode.category()))
    }

    /// Display name for a locale, falling back to the canonical name
    pub fn display_name(&self, locale: &str) -> &str {
        self.localized_names
            .get(locale)
            .filter(|name| !name.trim().is_empty())
            .map(String::as_str)
            .unwrap_or(&self.name)
    }

    /// Description for a locale, falling back to the default description
    pub fn display_description(&self, locale: &str) -> &str {
        self.localized_descriptions
            .get(locale)
            .filter(|desc| !desc.trim().is_empty())
            .map(String::as_str)
            .unwrap_or(&self.description)
    }

    /// Canonical or any localized name contains `query`, ignoring case
    pub fn name_mentions(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.name.to_lowercase().contains(&query)
            || self
                .localized_names
                .values()
                .any(|name| name.to_lowercase().contains(&query))
    }

    /// Like [`name_mentions`](Self::name_mentions), also searching descriptions
    pub fn mentions(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.name_mentions(&query)
            || self.description.to_lowercase().contains(&query)
            || self
                .localized_descriptions
                .values()
                .any(|desc| desc.to_lowercase().contains(&query))
    }
}

/// Parse a catalog from JSON text
///
/// Accepts either a bare array or an object with an `ingredients` array.
/// Entries that fail to deserialize or carry a blank name are skipped.
pub fn parse_catalog(json: &str) -> Result<Vec<ReferenceIngredient>> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let entries = match value {
        serde_json::Value::Array(entries) => entries,
        serde_json::Value::Object(mut map) => match map.remove("ingredients") {
            Some(serde_json::Value::Array(entries)) => entries,
            _ => {
                return Err(ScanError::Catalog(
                    "expected an array or an object with an `ingredients` array".to_string(),
                ))
            }
        },
        _ => return Err(ScanError::Catalog("expected a JSON array".to_string())),
    };

    let mut ingredients = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<ReferenceIngredient>(entry) {
            Ok(ingredient) if !ingredient.name.trim().is_empty() => ingredients.push(ingredient),
            Ok(_) => warn!("Skipping catalog entry {} with blank name", index),
            Err(e) => warn!("Skipping malformed catalog entry {}: {}", index, e),
        }
    }
    Ok(ingredients)
}

/// Load a catalog from a JSON file
pub fn load_catalog(path: &Path) -> Result<Vec<ReferenceIngredient>> {
    let content = std::fs::read_to_string(path)?;
    let ingredients = parse_catalog(&content)?;
    info!("Loaded {} catalog entries from {:?}", ingredients.len(), path);
    Ok(ingredients)
}

/// Functional category filter value that keeps every entry
pub const ALL_CATEGORIES: &str = "All";

/// Library search over the catalog
///
/// `query` is matched case-insensitively against canonical and localized
/// names and descriptions; a blank query keeps everything. A functional
/// category of `None` or [`ALL_CATEGORIES`] disables that filter. Results are
/// sorted by canonical name.
pub fn search<'a>(
    catalog: &'a [ReferenceIngredient],
    query: &str,
    functional_category: Option<&str>,
) -> Vec<&'a ReferenceIngredient> {
    let query = query.trim().to_lowercase();
    let category = functional_category
        .map(str::trim)
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case(ALL_CATEGORIES));

    let mut hits: Vec<&ReferenceIngredient> = catalog
        .iter()
        .filter(|ingredient| query.is_empty() || ingredient.mentions(&query))
        .filter(|ingredient| match category {
            None => true,
            Some(category) => ingredient
                .functional_category
                .as_deref()
                .is_some_and(|own| own.trim().to_lowercase() == category.to_lowercase()),
        })
        .collect();
    hits.sort_by(|a, b| a.name.cmp(&b.name));
    hits
}

/// Distinct non-blank functional categories, sorted
pub fn functional_categories(catalog: &[ReferenceIngredient]) -> Vec<String> {
    let categories: BTreeSet<&str> = catalog
        .iter()
        .filter_map(|ingredient| ingredient.functional_category.as_deref())
        .map(str::trim)
        .filter(|category| !category.is_empty())
        .collect();
    categories.into_iter().map(str::to_string).collect()
}

/// Immutable view of the catalog at one point in time
pub type CatalogSnapshot = Arc<Vec<ReferenceIngredient>>;

/// Externally refreshed catalog shared with the coordinator
#[derive(Debug, Clone, Default)]
pub struct CatalogHandle {
    inner: Arc<RwLock<CatalogSnapshot>>,
}

impl CatalogHandle {
    /// Create a handle holding an initial set of entries
    pub fn new(ingredients: Vec<ReferenceIngredient>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(ingredients))),
        }
    }

    /// Replace the catalog contents
    pub fn replace(&self, ingredients: Vec<ReferenceIngredient>) {
        info!("Catalog refreshed: {} entries", ingredients.len());
        *self.inner.write() = Arc::new(ingredients);
    }

    /// Current snapshot; cheap to clone and safe to hold across a batch
    pub fn snapshot(&self) -> CatalogSnapshot {
        self.inner.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Entries of `catalog` that participate in matching for `mode`
pub fn filter_for_mode(catalog: &[ReferenceIngredient], mode: ScanMode) -> Vec<ReferenceIngredient> {
    catalog
        .iter()
        .filter(|ingredient| ingredient.applies_to(mode))
        .cloned()
        .collect()
}
