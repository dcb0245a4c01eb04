//! LabelScan - hazardous ingredient detection for product label scanning
//!
//! Matches noisy OCR text against a reference ingredient catalog and groups
//! the stream of recognition results into one session per physical product.

pub mod analysis;
pub mod capture;
pub mod catalog;
pub mod config;
pub mod error;
pub mod session;
pub mod shared;
pub mod storage;

pub use analysis::{fuzzy_match, levenshtein_distance, match_ingredients, IngredientMatcher};
pub use capture::{FrameThrottle, LatestBatchSlot, RecognitionBatch};
pub use catalog::{CatalogHandle, HazardLevel, ReferenceIngredient, ScanMode};
pub use config::AppConfig;
pub use error::{Result, ScanError};
pub use session::{BatchOutcome, ScanPipeline, SessionCoordinator, SessionState};
pub use shared::{ClearReason, SessionSignal};
pub use storage::{HistoryStore, MemoryHistory, SessionRecord, SqliteHistory};
