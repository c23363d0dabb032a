//! Review units: the things a session asks for.
//!
//! A single word pair and a whole dialog share one scheduling engine through
//! [`ReviewUnit`]; only candidate extraction and answer bookkeeping differ.

use super::{jitter_hours, order_key, reoccur_at, required_language, LanguageRole};
use crate::error::{CoreError, Result};
use crate::search::{LanguageDirection, SearchOptions};
use crate::types::{GameMode, Text, WordEntity, NEVER_ANSWERED};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A schedulable projection of a word entity.
pub trait ReviewUnit: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Unit name used in view names.
    const UNIT: &'static str;

    /// Every candidate the word yields for these options, due or not.
    fn candidates(word: &WordEntity, options: &SearchOptions) -> Vec<Self>;

    fn doc_id(&self) -> &str;

    /// Position of the unit inside its word.
    fn slot(&self) -> usize;

    fn reoccur_at(&self) -> DateTime<Utc>;

    fn answer_level(&self) -> i32;

    fn answer_language(&self) -> &str;

    fn expected_answer(&self) -> String;

    fn word(&self) -> Option<&WordEntity>;

    fn attach(&mut self, word: WordEntity);

    /// Record an answer on the progress entries this unit covers.
    fn apply_answer(
        &self,
        word: &mut WordEntity,
        mode: GameMode,
        correct: bool,
        answer: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Identity of the unit within a session.
    fn key(&self) -> String {
        format!("{}:{}", self.doc_id(), self.slot())
    }

    fn order_key(&self) -> String {
        order_key(&self.expected_answer(), self.doc_id(), self.slot())
    }
}

/// One word pair in one answer direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub doc_id: String,
    pub text_index: usize,
    pub reoccur_at: DateTime<Utc>,
    pub answer_level: i32,
    pub answer_role: LanguageRole,
    pub answer_language: String,
    pub answer: String,
    pub question_language: String,
    pub question: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub meta: String,
    #[serde(skip)]
    pub word: Option<WordEntity>,
}

/// One line of a dialog unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogLine {
    pub text_index: usize,
    pub question: String,
    pub answer: String,
}

/// All dialog lines of a word, answered together in one direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogTextSearchResult {
    pub doc_id: String,
    pub reoccur_at: DateTime<Utc>,
    pub answer_level: i32,
    pub answer_role: LanguageRole,
    pub answer_language: String,
    pub question_language: String,
    pub lines: Vec<DialogLine>,
    #[serde(default)]
    pub meta: String,
    #[serde(skip)]
    pub word: Option<WordEntity>,
}

fn role_slot(role: LanguageRole) -> usize {
    match role {
        LanguageRole::Source => 0,
        LanguageRole::Target => 1,
    }
}

fn language_for(options: &SearchOptions, role: LanguageRole) -> &str {
    match role {
        LanguageRole::Source => &options.source_language,
        LanguageRole::Target => &options.target_language,
    }
}

/// Answer directions that are open given both sides' levels.
///
/// Under `ByLevel` the higher of both levels drives the cycle; a side that
/// was never answered is always open.
fn open_directions(options: &SearchOptions, source_level: i32, target_level: i32) -> Vec<LanguageRole> {
    match options.search_languages_direction {
        LanguageDirection::Source => vec![LanguageRole::Source],
        LanguageDirection::Target => vec![LanguageRole::Target],
        LanguageDirection::ByLevel => {
            let cycle_level = source_level.max(target_level);
            let required = required_language(cycle_level, options.effective_modulus());
            [(LanguageRole::Source, source_level), (LanguageRole::Target, target_level)]
                .into_iter()
                .filter(|(role, level)| *level == NEVER_ANSWERED || *role == required)
                .map(|(role, _)| role)
                .collect()
        }
    }
}

fn schedulable(text: &Text) -> bool {
    !text.is_ignored() && !text.is_dialog_line()
}

fn record(
    text: &mut Text,
    language: &str,
    mode: GameMode,
    correct: bool,
    answer: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    let word = text
        .words
        .get_mut(language)
        .ok_or_else(|| CoreError::InvalidEntity(format!("no '{}' translation", language)))?;
    let progress = word.progress_mut(mode);
    if correct {
        progress.record_correct(answer.map(str::to_string), now);
    } else {
        progress.record_wrong(answer.map(str::to_string), now);
    }
    Ok(())
}

impl ReviewUnit for SearchResult {
    const UNIT: &'static str = "words";

    fn candidates(word: &WordEntity, options: &SearchOptions) -> Vec<Self> {
        let mode = options.mode;
        let modulus = options.effective_modulus();
        let mut results = Vec::new();

        for (text_index, text) in word.texts.iter().enumerate() {
            if !schedulable(text) {
                continue;
            }
            let (Some(source), Some(target)) = (
                text.word(&options.source_language),
                text.word(&options.target_language),
            ) else {
                continue;
            };

            for role in open_directions(options, source.level(mode), target.level(mode)) {
                let (answer, question) = match role {
                    LanguageRole::Source => (source, target),
                    LanguageRole::Target => (target, source),
                };
                let answer_language = language_for(options, role);
                let level = answer.level(mode);
                let slot = text_index * 2 + role_slot(role);
                let jitter = jitter_hours(&word.id, slot, answer_language, level);

                results.push(SearchResult {
                    doc_id: word.id.clone(),
                    text_index,
                    reoccur_at: reoccur_at(level, modulus, answer.last_answered(mode), jitter),
                    answer_level: level,
                    answer_role: role,
                    answer_language: answer_language.to_string(),
                    answer: answer.value.clone(),
                    question_language: language_for(options, role.other()).to_string(),
                    question: question.value.clone(),
                    tags: text.tags.clone(),
                    meta: text.meta.clone(),
                    word: None,
                });
            }
        }
        results
    }

    fn doc_id(&self) -> &str {
        &self.doc_id
    }

    fn slot(&self) -> usize {
        self.text_index * 2 + role_slot(self.answer_role)
    }

    fn reoccur_at(&self) -> DateTime<Utc> {
        self.reoccur_at
    }

    fn answer_level(&self) -> i32 {
        self.answer_level
    }

    fn answer_language(&self) -> &str {
        &self.answer_language
    }

    fn expected_answer(&self) -> String {
        self.answer.clone()
    }

    fn word(&self) -> Option<&WordEntity> {
        self.word.as_ref()
    }

    fn attach(&mut self, word: WordEntity) {
        self.word = Some(word);
    }

    fn apply_answer(
        &self,
        word: &mut WordEntity,
        mode: GameMode,
        correct: bool,
        answer: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let text = word.texts.get_mut(self.text_index).ok_or_else(|| {
            CoreError::InvalidEntity(format!("{} has no text {}", self.doc_id, self.text_index))
        })?;
        record(text, &self.answer_language, mode, correct, answer, now)
    }
}

impl ReviewUnit for DialogTextSearchResult {
    const UNIT: &'static str = "dialog";

    fn candidates(word: &WordEntity, options: &SearchOptions) -> Vec<Self> {
        let mode = options.mode;
        let modulus = options.effective_modulus();
        let lines: Vec<(usize, &Text)> = word
            .texts
            .iter()
            .enumerate()
            .filter(|(_, text)| text.is_dialog_line() && !text.is_ignored())
            .collect();
        if lines.is_empty() {
            return Vec::new();
        }

        // Every line needs both languages, otherwise the dialog can't be asked.
        let mut pairs = Vec::with_capacity(lines.len());
        for (index, text) in &lines {
            match (
                text.word(&options.source_language),
                text.word(&options.target_language),
            ) {
                (Some(source), Some(target)) => pairs.push((*index, source, target)),
                _ => return Vec::new(),
            }
        }

        let unit_level = |role: LanguageRole| {
            let levels = pairs.iter().map(|(_, source, target)| match role {
                LanguageRole::Source => source.level(mode),
                LanguageRole::Target => target.level(mode),
            });
            let mut lowest = i32::MAX;
            for level in levels {
                if level == NEVER_ANSWERED {
                    return NEVER_ANSWERED;
                }
                lowest = lowest.min(level);
            }
            lowest
        };
        let last_answered = |role: LanguageRole| {
            pairs
                .iter()
                .filter_map(|(_, source, target)| match role {
                    LanguageRole::Source => source.last_answered(mode),
                    LanguageRole::Target => target.last_answered(mode),
                })
                .max()
        };

        let source_level = unit_level(LanguageRole::Source);
        let target_level = unit_level(LanguageRole::Target);

        open_directions(options, source_level, target_level)
            .into_iter()
            .map(|role| {
                let level = match role {
                    LanguageRole::Source => source_level,
                    LanguageRole::Target => target_level,
                };
                let answer_language = language_for(options, role);
                let jitter = jitter_hours(&word.id, role_slot(role), answer_language, level);
                DialogTextSearchResult {
                    doc_id: word.id.clone(),
                    reoccur_at: reoccur_at(level, modulus, last_answered(role), jitter),
                    answer_level: level,
                    answer_role: role,
                    answer_language: answer_language.to_string(),
                    question_language: language_for(options, role.other()).to_string(),
                    lines: pairs
                        .iter()
                        .map(|(text_index, source, target)| {
                            let (answer, question) = match role {
                                LanguageRole::Source => (source, target),
                                LanguageRole::Target => (target, source),
                            };
                            DialogLine {
                                text_index: *text_index,
                                question: question.value.clone(),
                                answer: answer.value.clone(),
                            }
                        })
                        .collect(),
                    meta: lines[0].1.meta.clone(),
                    word: None,
                }
            })
            .collect()
    }

    fn doc_id(&self) -> &str {
        &self.doc_id
    }

    fn slot(&self) -> usize {
        role_slot(self.answer_role)
    }

    fn reoccur_at(&self) -> DateTime<Utc> {
        self.reoccur_at
    }

    fn answer_level(&self) -> i32 {
        self.answer_level
    }

    fn answer_language(&self) -> &str {
        &self.answer_language
    }

    fn expected_answer(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.answer.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn word(&self) -> Option<&WordEntity> {
        self.word.as_ref()
    }

    fn attach(&mut self, word: WordEntity) {
        self.word = Some(word);
    }

    fn apply_answer(
        &self,
        word: &mut WordEntity,
        mode: GameMode,
        correct: bool,
        answer: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        for line in &self.lines {
            let text = word.texts.get_mut(line.text_index).ok_or_else(|| {
                CoreError::InvalidEntity(format!("{} has no text {}", self.doc_id, line.text_index))
            })?;
            record(text, &self.answer_language, mode, correct, answer, now)?;
        }
        Ok(())
    }
}
