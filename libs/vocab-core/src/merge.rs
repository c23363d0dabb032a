//! Conflict merge strategies.
//!
//! Every merge is commutative on content and idempotent, so replicas that
//! reconcile the same conflict set in any order end up with equal bodies.
//! The merged value keeps the id and revision of `self`.

use crate::types::{
    GameLogEntity, GameProgress, Text, TranslatedWord, WordEntity, WordTypeEntity,
};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Separator of composite word type titles.
pub const TITLE_SEPARATOR: &str = " / ";

/// Pure per-entity merge function.
pub trait Mergeable {
    fn merge(&self, other: &Self) -> Self;
}

/// Fold a winner with every conflicting revision.
pub fn merge_all<E: Mergeable + Clone>(winning: &E, conflicting: &[E]) -> E {
    conflicting
        .iter()
        .fold(winning.clone(), |merged, other| merged.merge(other))
}

fn min_date(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn progress_key(p: &GameProgress) -> (Option<DateTime<Utc>>, i32, Option<&str>, Option<bool>) {
    (p.date, p.level, p.answer.as_deref(), p.correct)
}

fn merge_games(
    a: &BTreeMap<String, GameProgress>,
    b: &BTreeMap<String, GameProgress>,
) -> BTreeMap<String, GameProgress> {
    let mut merged = a.clone();
    for (mode, theirs) in b {
        match merged.get(mode) {
            Some(ours) if progress_key(ours) >= progress_key(theirs) => {}
            _ => {
                merged.insert(mode.clone(), theirs.clone());
            }
        }
    }
    merged
}

/// `Greater` when `a` is the later side of a text.
fn compare_sides(a: (&Option<DateTime<Utc>>, &Text), b: (&Option<DateTime<Utc>>, &Text)) -> Ordering {
    a.0.cmp(b.0).then_with(|| {
        let a_json = serde_json::to_string(a.1).unwrap_or_default();
        let b_json = serde_json::to_string(b.1).unwrap_or_default();
        a_json.cmp(&b_json)
    })
}

fn merge_text(later: &Text, earlier: &Text) -> Text {
    let mut words = BTreeMap::new();
    let languages: BTreeSet<&String> = later.words.keys().chain(earlier.words.keys()).collect();
    for language in languages {
        let word = match (later.words.get(language), earlier.words.get(language)) {
            (Some(l), Some(e)) => TranslatedWord {
                value: l.value.clone(),
                games: merge_games(&l.games, &e.games),
            },
            (Some(only), None) | (None, Some(only)) => only.clone(),
            (None, None) => continue,
        };
        words.insert(language.clone(), word);
    }
    Text {
        tags: later.tags.clone(),
        meta: later.meta.clone(),
        words,
    }
}

impl Mergeable for WordEntity {
    fn merge(&self, other: &Self) -> Self {
        let len = self.texts.len().max(other.texts.len());
        let texts = (0..len)
            .map(|i| match (self.texts.get(i), other.texts.get(i)) {
                (Some(ours), Some(theirs)) => {
                    if compare_sides((&self.updated_at, ours), (&other.updated_at, theirs))
                        == Ordering::Less
                    {
                        merge_text(theirs, ours)
                    } else {
                        merge_text(ours, theirs)
                    }
                }
                (Some(only), None) | (None, Some(only)) => only.clone(),
                (None, None) => Text::default(),
            })
            .collect();

        let word_type = match self.updated_at.cmp(&other.updated_at) {
            Ordering::Less => other.word_type.clone(),
            Ordering::Greater => self.word_type.clone(),
            Ordering::Equal => self.word_type.clone().max(other.word_type.clone()),
        };

        WordEntity {
            id: self.id.clone(),
            rev: self.rev.clone(),
            word_type,
            texts,
            created_at: min_date(self.created_at, other.created_at),
            updated_at: self.updated_at.max(other.updated_at),
        }
    }
}

/// Distinct title parts, sorted and joined.
pub fn composite_title<'a>(titles: impl IntoIterator<Item = &'a str>) -> String {
    let parts: BTreeSet<&str> = titles
        .into_iter()
        .flat_map(|title| title.split(TITLE_SEPARATOR.trim()))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    parts.into_iter().collect::<Vec<_>>().join(TITLE_SEPARATOR)
}

impl Mergeable for WordTypeEntity {
    fn merge(&self, other: &Self) -> Self {
        WordTypeEntity {
            id: self.id.clone(),
            rev: self.rev.clone(),
            title: composite_title([self.title.as_str(), other.title.as_str()]),
            tags: self.tags.union(&other.tags).cloned().collect(),
            updated_at: self.updated_at.max(other.updated_at),
        }
    }
}

impl Mergeable for GameLogEntity {
    fn merge(&self, other: &Self) -> Self {
        GameLogEntity {
            id: self.id.clone(),
            rev: self.rev.clone(),
            mode: self.mode.max(other.mode),
            start_time: self.start_time.min(other.start_time),
            end_time: self.end_time.max(other.end_time),
            duration_in_millis: self.duration_in_millis.max(other.duration_in_millis),
            count_correct: self.count_correct.max(other.count_correct),
            count_wrong: self.count_wrong.max(other.count_wrong),
            count_total: self.count_total.max(other.count_total),
        }
    }
}
