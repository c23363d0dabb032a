//! Core entity types for the vocabulary trainer.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Tag marking a text as one line of a dialog.
pub const TAG_TEXT: &str = "text";
/// Tag excluding a text from scheduling.
pub const TAG_IGNORE: &str = "ignore";
/// Tag excluding a text from duplicate detection.
pub const TAG_NODUP: &str = "nodup";

/// Level of a word that was never answered.
pub const NEVER_ANSWERED: i32 = -1;

/// Kind of a persisted entity; doubles as the id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Word,
    WordType,
    GameLog,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [Self::Word, Self::WordType, Self::GameLog];

    /// Id prefix used for documents of this kind.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Word => "word",
            Self::WordType => "wordtype",
            Self::GameLog => "gamelog",
        }
    }

    /// Build a document id from a unique suffix.
    pub fn make_id(self, suffix: &str) -> String {
        format!("{}_{}", self.prefix(), suffix)
    }

    /// Inclusive id range covering every document of this kind.
    pub fn id_range(self) -> (String, String) {
        (
            format!("{}_", self.prefix()),
            format!("{}_\u{fff0}", self.prefix()),
        )
    }

    /// Detect the kind from a document id.
    pub fn of_id(id: &str) -> Option<Self> {
        let (prefix, suffix) = id.split_once('_')?;
        if suffix.is_empty() {
            return None;
        }
        Self::ALL.into_iter().find(|kind| kind.prefix() == prefix)
    }
}

/// Game mode a level is tracked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Card,
    Type,
    Dialog,
}

impl Default for GameMode {
    fn default() -> Self {
        Self::Card
    }
}

impl GameMode {
    /// Key used in `TranslatedWord::games`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Type => "type",
            Self::Dialog => "dialog",
        }
    }

    /// Parse from the stored key.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "card" => Some(Self::Card),
            "type" => Some(Self::Type),
            "dialog" => Some(Self::Dialog),
            _ => None,
        }
    }

    /// Cycle length used when a search does not set one.
    pub fn default_modulus(self) -> u32 {
        match self {
            Self::Card | Self::Type => 6,
            Self::Dialog => 8,
        }
    }
}

/// Review progress of one translated word in one game mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameProgress {
    pub level: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<bool>,
}

impl Default for GameProgress {
    fn default() -> Self {
        Self {
            level: NEVER_ANSWERED,
            date: None,
            answer: None,
            correct: None,
        }
    }
}

impl GameProgress {
    /// Record a correct answer; the never-answered sentinel moves to 0.
    pub fn record_correct(&mut self, answer: Option<String>, now: DateTime<Utc>) {
        self.level = if self.level < 0 { 0 } else { self.level + 1 };
        self.date = Some(now);
        self.answer = answer;
        self.correct = Some(true);
    }

    /// Record a wrong answer; the level always resets to 0.
    pub fn record_wrong(&mut self, answer: Option<String>, now: DateTime<Utc>) {
        self.level = 0;
        self.date = Some(now);
        self.answer = answer;
        self.correct = Some(false);
    }
}

/// A word or phrase in one language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedWord {
    pub value: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub games: BTreeMap<String, GameProgress>,
}

impl TranslatedWord {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            games: BTreeMap::new(),
        }
    }

    pub fn progress(&self, mode: GameMode) -> Option<&GameProgress> {
        self.games.get(mode.as_str())
    }

    pub fn progress_mut(&mut self, mode: GameMode) -> &mut GameProgress {
        self.games.entry(mode.as_str().to_string()).or_default()
    }

    /// Stored level for a mode, or the never-answered sentinel.
    pub fn level(&self, mode: GameMode) -> i32 {
        self.progress(mode).map_or(NEVER_ANSWERED, |p| p.level)
    }

    pub fn last_answered(&self, mode: GameMode) -> Option<DateTime<Utc>> {
        self.progress(mode).and_then(|p| p.date)
    }
}

/// One text of a word: translations keyed by language code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub meta: String,
    #[serde(default)]
    pub words: BTreeMap<String, TranslatedWord>,
}

impl Text {
    /// Build a text from `(language, value)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            tags: BTreeSet::new(),
            meta: String::new(),
            words: pairs
                .into_iter()
                .map(|(lang, value)| (lang.to_string(), TranslatedWord::new(value)))
                .collect(),
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.insert(tag.to_string());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn is_ignored(&self) -> bool {
        self.has_tag(TAG_IGNORE)
    }

    pub fn is_dialog_line(&self) -> bool {
        self.has_tag(TAG_TEXT)
    }

    /// Non-empty translation for a language.
    pub fn word(&self, language: &str) -> Option<&TranslatedWord> {
        self.words
            .get(language)
            .filter(|word| !word.value.trim().is_empty())
    }
}

/// Operations every persisted entity supports.
///
/// `before_save` and `after_load` are the serialize/deserialize hooks the
/// entity store runs around every write and read.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn rev(&self) -> Option<&str>;
    fn set_rev(&mut self, rev: Option<String>);

    fn before_save(&mut self, _now: DateTime<Utc>) {}

    fn after_load(&mut self) {}
}

/// A learnable unit with one or more texts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordEntity {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// Title of the word type; a lookup reference, not ownership.
    #[serde(rename = "type", default)]
    pub word_type: String,
    #[serde(default)]
    pub texts: Vec<Text>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WordEntity {
    pub fn new(word_type: impl Into<String>, texts: Vec<Text>) -> Self {
        Self {
            word_type: word_type.into(),
            texts,
            ..Default::default()
        }
    }
}

impl Entity for WordEntity {
    const KIND: EntityKind = EntityKind::Word;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn rev(&self) -> Option<&str> {
        self.rev.as_deref()
    }

    fn set_rev(&mut self, rev: Option<String>) {
        self.rev = rev;
    }

    fn before_save(&mut self, now: DateTime<Utc>) {
        self.created_at.get_or_insert(now);
        self.updated_at = Some(now);
    }

    fn after_load(&mut self) {
        for text in &mut self.texts {
            text.words.retain(|language, _| !language.is_empty());
            for word in text.words.values_mut() {
                for progress in word.games.values_mut() {
                    progress.level = progress.level.max(NEVER_ANSWERED);
                }
            }
        }
    }
}

/// Grouping metadata referenced by words through their title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordTypeEntity {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WordTypeEntity {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

impl Entity for WordTypeEntity {
    const KIND: EntityKind = EntityKind::WordType;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn rev(&self) -> Option<&str> {
        self.rev.as_deref()
    }

    fn set_rev(&mut self, rev: Option<String>) {
        self.rev = rev;
    }

    fn before_save(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
    }

    fn after_load(&mut self) {
        self.title = self.title.trim().to_string();
    }
}

/// Record of one review session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameLogEntity {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub mode: GameMode,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub duration_in_millis: i64,
    pub count_correct: u32,
    pub count_wrong: u32,
    pub count_total: u32,
}

impl GameLogEntity {
    pub fn start(mode: GameMode, start_time: DateTime<Utc>) -> Self {
        Self {
            mode,
            start_time,
            ..Default::default()
        }
    }
}

impl Entity for GameLogEntity {
    const KIND: EntityKind = EntityKind::GameLog;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn rev(&self) -> Option<&str> {
        self.rev.as_deref()
    }

    fn set_rev(&mut self, rev: Option<String>) {
        self.rev = rev;
    }
}
