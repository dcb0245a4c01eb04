//! Storage Layer
//!
//! Persists finalized scan sessions. Only the write path is used by the
//! session coordinator; the read side backs the history listing.

pub mod database;

pub use database::SqliteHistory;

use anyhow::Result as AnyResult;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::catalog::ReferenceIngredient;
use crate::error::Result;

/// Externally persisted outcome of one saved scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Placeholder label derived from the scan mode
    pub product_name: String,
    /// Unix time in milliseconds
    pub timestamp_ms: i64,
    /// No HIGH or MEDIUM hazard ingredient was found
    pub is_clean: bool,
    /// Canonical names, sorted
    pub matched_ingredients: Vec<String>,
    /// Mode category ("FOOD" or "COSMETICS")
    pub category: String,
}

impl SessionRecord {
    /// Case-insensitive history search
    ///
    /// Matches the product name and the matched ingredient names. Names found
    /// in `catalog` are also searched under their localized names.
    pub fn matches_query(&self, query: &str, catalog: &[ReferenceIngredient]) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.product_name.to_lowercase().contains(&query)
            || self.matched_ingredients.iter().any(|name| {
                name.to_lowercase().contains(&query)
                    || catalog
                        .iter()
                        .find(|ingredient| &ingredient.name == name)
                        .is_some_and(|ingredient| ingredient.name_mentions(&query))
            })
    }
}

/// Persistence collaborator receiving saved sessions
pub trait HistoryStore: Send + Sync {
    fn save(&self, record: &SessionRecord) -> Result<()>;
}

/// In-memory history, newest last
#[derive(Debug, Default)]
pub struct MemoryHistory {
    records: Mutex<Vec<SessionRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SessionRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl HistoryStore for MemoryHistory {
    fn save(&self, record: &SessionRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

fn project_dirs() -> AnyResult<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "labelscan", "LabelScan")
        .ok_or_else(|| anyhow::anyhow!("Could not determine project directories"))
}

/// Get the application data directory
pub fn get_data_dir() -> AnyResult<PathBuf> {
    let data_dir = project_dirs()?.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}

/// Get the configuration directory
pub fn get_config_dir() -> AnyResult<PathBuf> {
    let config_dir = project_dirs()?.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;
    Ok(config_dir)
}
