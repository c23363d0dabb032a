//! Level-based spaced repetition scheduling.
//!
//! A level cycles through `0..modulus`; the position inside the cycle picks
//! the spacing and every full cycle flips the language that must be answered.

pub mod unit;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use unit::{DialogLine, DialogTextSearchResult, ReviewUnit, SearchResult};

/// Upper bound of the scheduling jitter, in hours.
pub const MAX_JITTER_HOURS: u32 = 48;

/// Largest accepted cycle length; keeps the spacing within chrono's range.
pub const MAX_MODULUS: u32 = 16;

/// Which side of a language pair a language plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageRole {
    Source,
    Target,
}

impl LanguageRole {
    pub fn other(self) -> Self {
        match self {
            Self::Source => Self::Target,
            Self::Target => Self::Source,
        }
    }
}

fn cycle_position(level: i32, modulus: u32) -> u32 {
    if level < 0 {
        0
    } else {
        level as u32 % modulus.max(1)
    }
}

/// Days that must pass after the last answer before the pair is due again.
pub fn required_distance_days(level: i32, modulus: u32) -> u32 {
    match cycle_position(level, modulus) {
        0 => 0,
        position => 1 << (position - 1).min(30),
    }
}

/// Language that has to be answered at `level`; the sentinel behaves like 0.
pub fn required_language(level: i32, modulus: u32) -> LanguageRole {
    let modulus = modulus.max(1);
    let level = level.max(0) as u32;
    if level % (2 * modulus) < modulus {
        LanguageRole::Source
    } else {
        LanguageRole::Target
    }
}

/// Truncate a timestamp to 00:00 UTC of the same day.
pub fn midnight_utc(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Deterministic per-pair jitter in whole hours, `0..=MAX_JITTER_HOURS`.
pub fn jitter_hours(doc_id: &str, slot: usize, language: &str, level: i32) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(doc_id.as_bytes());
    hasher.update(slot.to_le_bytes());
    hasher.update(language.as_bytes());
    hasher.update(level.to_le_bytes());
    let digest = hasher.finalize();
    let value = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
    value % (MAX_JITTER_HOURS + 1)
}

/// Next eligible review time.
///
/// Never answered pairs (level -1 or no answer date) are due at the epoch so
/// they sort before everything else. Times past chrono's range saturate.
pub fn reoccur_at(
    level: i32,
    modulus: u32,
    last_answered: Option<DateTime<Utc>>,
    jitter_hours: u32,
) -> DateTime<Utc> {
    match last_answered {
        Some(date) if level >= 0 => midnight_utc(date)
            .checked_add_signed(Duration::days(i64::from(required_distance_days(level, modulus))))
            .and_then(|at| at.checked_add_signed(Duration::hours(i64::from(jitter_hours))))
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
        _ => DateTime::<Utc>::default(),
    }
}

/// Stable tie-break key for candidates with the same reoccur time.
pub fn order_key(answer: &str, doc_id: &str, slot: usize) -> String {
    let digest = format!("{:x}", Sha256::digest(answer.as_bytes()));
    format!("{}:{}:{:04}", &digest[..16], doc_id, slot)
}
