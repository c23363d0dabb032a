//! Search options and view naming.

use crate::algorithm::MAX_MODULUS;
use crate::error::{CoreError, Result};
use crate::types::GameMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the due-candidates view inside each search design document.
pub const DUE_VIEW: &str = "due";

/// Which language of the pair gets asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LanguageDirection {
    /// Alternate between the languages as the level cycles.
    #[default]
    ByLevel,
    /// Always answer in the source language.
    Source,
    /// Always answer in the target language.
    Target,
}

impl LanguageDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ByLevel => "by_level",
            Self::Source => "source",
            Self::Target => "target",
        }
    }
}

/// Parameters of a scheduling query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    pub mode: GameMode,
    pub source_language: String,
    pub target_language: String,
    #[serde(default)]
    pub search_languages_direction: LanguageDirection,
    #[serde(default)]
    pub search_level_enabled: bool,
    #[serde(default)]
    pub search_level_minimum: i32,
    #[serde(default)]
    pub search_level_maximum: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modulus: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reoccur_after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reoccur_before: Option<DateTime<Utc>>,
}

impl SearchOptions {
    pub fn new(mode: GameMode, source_language: &str, target_language: &str) -> Self {
        Self {
            mode,
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            search_languages_direction: LanguageDirection::ByLevel,
            search_level_enabled: false,
            search_level_minimum: 0,
            search_level_maximum: 0,
            modulus: None,
            reoccur_after: None,
            reoccur_before: None,
        }
    }

    pub fn with_direction(mut self, direction: LanguageDirection) -> Self {
        self.search_languages_direction = direction;
        self
    }

    pub fn with_level_range(mut self, minimum: i32, maximum: i32) -> Self {
        self.search_level_enabled = true;
        self.search_level_minimum = minimum;
        self.search_level_maximum = maximum;
        self
    }

    pub fn with_modulus(mut self, modulus: u32) -> Self {
        self.modulus = Some(modulus);
        self
    }

    pub fn effective_modulus(&self) -> u32 {
        self.modulus.unwrap_or_else(|| self.mode.default_modulus())
    }

    /// Reject option sets that cannot produce a meaningful schedule.
    pub fn validate(&self) -> Result<()> {
        for language in [&self.source_language, &self.target_language] {
            if !is_supported_language(language) {
                return Err(CoreError::InvalidConfiguration(format!(
                    "unsupported language '{}'",
                    language
                )));
            }
        }
        if self.source_language.eq_ignore_ascii_case(&self.target_language) {
            return Err(CoreError::InvalidConfiguration(format!(
                "source and target language are both '{}'",
                self.source_language
            )));
        }
        if let Some(modulus) = self.modulus {
            if !(1..=MAX_MODULUS).contains(&modulus) {
                return Err(CoreError::InvalidConfiguration(format!(
                    "modulus must be within 1..={}, got {}",
                    MAX_MODULUS, modulus
                )));
            }
        }
        if self.search_level_enabled && self.search_level_minimum > self.search_level_maximum {
            return Err(CoreError::InvalidConfiguration(format!(
                "level range {}..{} is empty",
                self.search_level_minimum, self.search_level_maximum
            )));
        }
        if let (Some(after), Some(before)) = (self.reoccur_after, self.reoccur_before) {
            if after > before {
                return Err(CoreError::InvalidConfiguration(
                    "reoccurAfter is later than reoccurBefore".into(),
                ));
            }
        }
        Ok(())
    }

    /// Design document addressing the view for this query shape.
    ///
    /// Every parameter baked into the map function is part of the name, so
    /// changing one of them addresses a different view.
    pub fn design_id(&self, unit: &str) -> String {
        format!(
            "_design/search-{}-{}-{}-{}-{}-m{}",
            unit,
            self.mode.as_str(),
            self.source_language.to_ascii_lowercase(),
            self.target_language.to_ascii_lowercase(),
            self.search_languages_direction.as_str(),
            self.effective_modulus()
        )
    }

    pub fn level_matches(&self, level: i32) -> bool {
        !self.search_level_enabled
            || (self.search_level_minimum..=self.search_level_maximum).contains(&level)
    }

    /// Reoccur window for a query evaluated at `as_of`.
    pub fn reoccur_window(&self, as_of: DateTime<Utc>) -> (Option<DateTime<Utc>>, DateTime<Utc>) {
        (self.reoccur_after, self.reoccur_before.unwrap_or(as_of))
    }
}

/// Accepts `en`, `deu`, `pt-BR`, `zh_Hant`.
pub fn is_supported_language(code: &str) -> bool {
    let (base, region) = match code.split_once(|c| c == '-' || c == '_') {
        Some((base, region)) => (base, Some(region)),
        None => (code, None),
    };
    let base_ok = (2..=3).contains(&base.len()) && base.chars().all(|c| c.is_ascii_alphabetic());
    let region_ok = region.map_or(true, |r| {
        (2..=4).contains(&r.len()) && r.chars().all(|c| c.is_ascii_alphanumeric())
    });
    base_ok && region_ok
}
