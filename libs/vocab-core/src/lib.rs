//! Core vocabulary trainer library shared by the client and the sync backend.
//!
//! Provides:
//! - Entities (words, word types, game logs) and their document envelope
//! - Level/modulus spaced repetition scheduling over review units
//! - Search options and deterministic view naming
//! - Answer grading for typed mode (Levenshtein distance)
//! - Game and word state machines
//! - Convergent merge strategies for conflicting revisions
//! - Replication wire types

pub mod algorithm;
pub mod document;
pub mod error;
pub mod game;
pub mod matching;
pub mod merge;
pub mod replication;
pub mod search;
pub mod types;

pub use algorithm::{
    required_distance_days, required_language, reoccur_at, DialogLine, DialogTextSearchResult,
    LanguageRole, ReviewUnit, SearchResult,
};
pub use document::{next_revision, winning_index, Document};
pub use error::{CoreError, Result};
pub use game::{
    GameAction, GameState, SessionGoal, StateChange, StopReason, WordAction, WordState,
};
pub use matching::{
    grade_answer, levenshtein_distance, normalize_answer, tokenize, Grade, GradeResult,
};
pub use merge::{merge_all, Mergeable};
pub use search::{LanguageDirection, SearchOptions, DUE_VIEW};
pub use types::{
    Entity, EntityKind, GameLogEntity, GameMode, GameProgress, Text, TranslatedWord, WordEntity,
    WordTypeEntity, NEVER_ANSWERED,
};
