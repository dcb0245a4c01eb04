//! Scan session aggregate and lifecycle states

use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::catalog::{ReferenceIngredient, ScanMode};
use crate::storage::SessionRecord;

/// Lifecycle state of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No active session, waiting for the first informative batch
    #[default]
    Idle,
    /// Session open, collecting matches
    Accumulating,
    /// Clean result on display; auto-clears
    SettledClean,
    /// Hazardous result on display; needs save or discard
    AwaitingDecision,
}

impl SessionState {
    /// Whether incoming batches are dropped in this state
    pub fn is_paused(self) -> bool {
        matches!(self, SessionState::SettledClean | SessionState::AwaitingDecision)
    }
}

/// Mutable aggregate for one physical scan
#[derive(Debug, Clone, Default)]
pub struct ScanSession {
    id: Option<Uuid>,
    state: SessionState,
    mode: ScanMode,
    /// Union of all batch matches, in discovery order
    accumulated: Vec<ReferenceIngredient>,
    last_batch_matches: Vec<ReferenceIngredient>,
    last_latency: Option<Duration>,
    recognized_text: String,
}

impl ScanSession {
    pub fn new(mode: ScanMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn accumulated(&self) -> &[ReferenceIngredient] {
        &self.accumulated
    }

    pub fn last_batch_matches(&self) -> &[ReferenceIngredient] {
        &self.last_batch_matches
    }

    /// Open a fresh session, dropping whatever was accumulated
    pub fn begin(&mut self) -> Uuid {
        let id = Uuid::new_v4();
        self.id = Some(id);
        self.state = SessionState::Accumulating;
        self.accumulated.clear();
        self.last_batch_matches.clear();
        id
    }

    /// Record per-batch diagnostics shown alongside the live view
    pub fn note_batch(&mut self, recognized_text: String, latency: Duration) {
        self.recognized_text = recognized_text;
        self.last_latency = Some(latency);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.accumulated.iter().any(|i| i.name == name)
    }

    /// Union `matches` into the session, returning the newly discovered ones
    pub fn absorb(&mut self, matches: &[ReferenceIngredient]) -> Vec<ReferenceIngredient> {
        let mut discovered = Vec::new();
        for ingredient in matches {
            if !self.contains(&ingredient.name) {
                self.accumulated.push(ingredient.clone());
                discovered.push(ingredient.clone());
            }
        }
        self.last_batch_matches = matches.to_vec();
        discovered
    }

    /// Any HIGH or MEDIUM hazard ingredient present
    pub fn has_harmful(&self) -> bool {
        self.accumulated.iter().any(|i| i.hazard_level.is_harmful())
    }

    pub fn is_clean(&self) -> bool {
        !self.has_harmful()
    }

    /// Empty the session and return to Idle, optionally switching mode
    pub fn reset(&mut self, mode: ScanMode) {
        self.id = None;
        self.state = SessionState::Idle;
        self.mode = mode;
        self.accumulated.clear();
        self.last_batch_matches.clear();
    }

    /// Build the persisted form of this session
    pub fn to_record(&self, timestamp_ms: i64) -> SessionRecord {
        let mut names: Vec<String> = self.accumulated.iter().map(|i| i.name.clone()).collect();
        names.sort();
        SessionRecord {
            product_name: self.mode.product_label().to_string(),
            timestamp_ms,
            is_clean: self.is_clean(),
            matched_ingredients: names,
            category: self.mode.category().to_string(),
        }
    }

    /// Point-in-time view for rendering
    pub fn snapshot(&self, catalog_size: usize) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            state: self.state,
            mode: self.mode,
            accumulated: self.accumulated.clone(),
            last_batch_matches: self.last_batch_matches.clone(),
            last_latency: self.last_latency,
            recognized_text: self.recognized_text.clone(),
            catalog_size,
        }
    }
}

/// Read-only copy of the session for the presentation layer
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: Option<Uuid>,
    pub state: SessionState,
    pub mode: ScanMode,
    pub accumulated: Vec<ReferenceIngredient>,
    pub last_batch_matches: Vec<ReferenceIngredient>,
    pub last_latency: Option<Duration>,
    pub recognized_text: String,
    pub catalog_size: usize,
}
