//! Message types sent from the session coordinator to the presentation layer

use uuid::Uuid;

use crate::catalog::{ReferenceIngredient, ScanMode};
use crate::storage::SessionRecord;

/// Session lifecycle signals
#[derive(Debug, Clone)]
pub enum SessionSignal {
    /// A non-empty batch opened a new session
    SessionStarted { session_id: Uuid, mode: ScanMode },
    /// Ingredients not seen before in this session; drives the haptic cue
    IngredientsDiscovered {
        session_id: Uuid,
        ingredients: Vec<ReferenceIngredient>,
    },
    /// Matches of the latest batch and the running session set, for rendering
    MatchesUpdated {
        batch_matches: Vec<ReferenceIngredient>,
        accumulated: Vec<ReferenceIngredient>,
    },
    /// Clean session settled; banner is shown while scanning is paused
    CompletionBannerShown { ingredients: Vec<ReferenceIngredient> },
    CompletionBannerHidden,
    /// Hazardous session settled; waits for save or discard
    ResultPopupShown { ingredients: Vec<ReferenceIngredient> },
    ResultPopupHidden,
    /// A record was handed to the persistence collaborator
    RecordSaved(SessionRecord),
    /// The session was emptied and the coordinator is idle again
    SessionCleared { reason: ClearReason },
}

/// Why a session was cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    /// Completion banner expired
    Settled,
    Saved,
    Discarded,
    ModeChanged,
}
