//! Word lookup and duplicate detection through the full-text index.

use std::collections::HashSet;

use tracing::debug;
use vocab_core::replication::FulltextIndexDefinition;
use vocab_core::types::TAG_NODUP;
use vocab_core::{tokenize, WordEntity};

use crate::error::{Result, StoreError};
use crate::store::EntityStore;
use crate::views::fulltext::FulltextClient;

/// Index over every translation value.
pub const WORDS_INDEX: &str = "words";

const DUPLICATE_HITS: usize = 20;

#[derive(Clone)]
pub struct WordLookup {
    store: EntityStore,
    fulltext: FulltextClient,
}

/// `value:a AND value:b` for every term of `value`.
fn all_terms_query(value: &str) -> Option<String> {
    let terms = tokenize(value);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|term| format!("value:{}", term))
            .collect::<Vec<_>>()
            .join(" AND "),
    )
}

/// `value:a* OR value:b*` for every term of `text`.
fn any_prefix_query(text: &str) -> Option<String> {
    let terms = tokenize(text);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|term| format!("value:{}*", term))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

fn same_value(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

impl WordLookup {
    pub fn new(store: EntityStore, fulltext: FulltextClient) -> Self {
        Self { store, fulltext }
    }

    pub fn set_token(&self, token: Option<String>) {
        self.fulltext.set_token(token);
    }

    pub async fn ensure_index(&self) -> Result<()> {
        self.fulltext
            .ensure_fulltext_index(WORDS_INDEX, &FulltextIndexDefinition::words())
            .await
    }

    /// Words with a translation matching any term of `text`, best first.
    pub async fn lookup(&self, text: &str, limit: usize) -> Result<Vec<WordEntity>> {
        let Some(query) = any_prefix_query(text) else {
            return Ok(Vec::new());
        };
        let response = self
            .fulltext
            .run_fulltext_query(WORDS_INDEX, &query, limit)
            .await?;
        let mut words = Vec::with_capacity(response.hits.len());
        for hit in response.hits {
            if let Some(word) = self.load(&hit.id)? {
                words.push(word);
            }
        }
        Ok(words)
    }

    /// Other words that already carry one of `word`'s translations.
    ///
    /// Texts tagged `nodup` are not checked.
    pub async fn find_duplicates(&self, word: &WordEntity) -> Result<Vec<WordEntity>> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();

        for text in word.texts.iter().filter(|text| !text.has_tag(TAG_NODUP)) {
            for (language, translated) in &text.words {
                let Some(query) = all_terms_query(&translated.value) else {
                    continue;
                };
                let response = self
                    .fulltext
                    .run_fulltext_query(WORDS_INDEX, &query, DUPLICATE_HITS)
                    .await?;

                for hit in response.hits {
                    if hit.id == word.id || !seen.insert(hit.id.clone()) {
                        continue;
                    }
                    let Some(candidate) = self.load(&hit.id)? else {
                        continue;
                    };
                    let matches = candidate.texts.iter().any(|other| {
                        !other.has_tag(TAG_NODUP)
                            && other
                                .word(language)
                                .is_some_and(|w| same_value(&w.value, &translated.value))
                    });
                    if matches {
                        duplicates.push(candidate);
                    } else {
                        // A later text may still match.
                        seen.remove(&hit.id);
                    }
                }
            }
        }
        debug!(id = %word.id, found = duplicates.len(), "duplicate check");
        Ok(duplicates)
    }

    fn load(&self, id: &str) -> Result<Option<WordEntity>> {
        match self.store.get_by_id::<WordEntity>(id) {
            Ok(word) => Ok(Some(word)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
