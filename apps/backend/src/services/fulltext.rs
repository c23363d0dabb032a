//! Full-text search over the winning revisions of an account.
//!
//! Query syntax: whitespace separated clauses `term`, `term*` (prefix) or
//! `field:term`, joined by `AND` / `OR`. Adjacent clauses without an operator
//! are OR-ed and `AND` binds tighter than `OR`.

use std::collections::BTreeMap;

use serde_json::Value;
use vocab_core::tokenize;

use crate::error::ApiError;
use crate::models::{FulltextHit, FulltextIndexDefinition, FulltextResponse};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    /// `None` searches every field of the index.
    pub field: Option<String>,
    pub term: String,
    pub prefix: bool,
}

impl Clause {
    fn matches(&self, value: &str) -> bool {
        if self.prefix {
            value.starts_with(&self.term)
        } else {
            value == self.term
        }
    }
}

/// Disjunction of conjunctions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub groups: Vec<Vec<Clause>>,
}

/// Terms of one document, per index field.
pub type IndexedFields = BTreeMap<String, Vec<String>>;

fn parse_clause(raw: &str) -> Result<Vec<Clause>, ApiError> {
    let (field, term) = match raw.split_once(':') {
        Some((field, term)) if !field.is_empty() => (Some(field.to_string()), term),
        _ => (None, raw),
    };
    let prefix = term.ends_with('*');
    let terms = tokenize(term.trim_end_matches('*'));
    if terms.is_empty() {
        return Err(ApiError::Query(format!("empty term in '{}'", raw)));
    }

    // Only the last token of a split term keeps the prefix flag.
    let last = terms.len() - 1;
    Ok(terms
        .into_iter()
        .enumerate()
        .map(|(index, term)| Clause {
            field: field.clone(),
            term,
            prefix: prefix && index == last,
        })
        .collect())
}

/// Parse a query string.
pub fn parse_query(input: &str) -> Result<Query, ApiError> {
    let mut groups: Vec<Vec<Clause>> = Vec::new();
    let mut current: Vec<Clause> = Vec::new();
    let mut pending: Option<&str> = None;

    for token in input.split_whitespace() {
        match token {
            "AND" | "OR" => {
                if current.is_empty() || pending.is_some() {
                    return Err(ApiError::Query(format!("unexpected {} in '{}'", token, input)));
                }
                pending = Some(token);
            }
            raw => {
                let clauses = parse_clause(raw)?;
                if pending != Some("AND") && !current.is_empty() {
                    groups.push(std::mem::take(&mut current));
                }
                current.extend(clauses);
                pending = None;
            }
        }
    }

    if let Some(operator) = pending {
        return Err(ApiError::Query(format!("dangling {} in '{}'", operator, input)));
    }
    if !current.is_empty() {
        groups.push(current);
    }
    if groups.is_empty() {
        return Err(ApiError::Query("query must not be empty".to_string()));
    }
    Ok(Query { groups })
}

impl Query {
    /// Fail on fields the index does not define.
    pub fn check_fields(&self, index: &FulltextIndexDefinition) -> Result<(), ApiError> {
        for clause in self.groups.iter().flatten() {
            if let Some(field) = &clause.field {
                if !index.fields.contains_key(field) {
                    return Err(ApiError::Query(format!("unknown field '{}'", field)));
                }
            }
        }
        Ok(())
    }

    /// Score of a document, `None` when it does not match.
    pub fn score(&self, fields: &IndexedFields) -> Option<f32> {
        self.groups
            .iter()
            .filter_map(|group| {
                group.iter().try_fold(0usize, |total, clause| {
                    let hits = clause_hits(clause, fields);
                    (hits > 0).then_some(total + hits)
                })
            })
            .max()
            .map(|hits| hits as f32)
    }
}

fn clause_hits(clause: &Clause, fields: &IndexedFields) -> usize {
    fields
        .iter()
        .filter(|(name, _)| clause.field.as_deref().map_or(true, |field| field == name.as_str()))
        .flat_map(|(_, terms)| terms)
        .filter(|term| clause.matches(term))
        .count()
}

/// String values at a dotted path; `*` matches every element.
pub fn extract_path<'a>(value: &'a Value, path: &str) -> Vec<&'a str> {
    let mut current = vec![value];
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = current
            .into_iter()
            .flat_map(|node| -> Vec<&Value> {
                match (segment, node) {
                    ("*", Value::Array(items)) => items.iter().collect(),
                    ("*", Value::Object(map)) => map.values().collect(),
                    (key, Value::Object(map)) => map.get(key).into_iter().collect(),
                    (index, Value::Array(items)) => index
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| items.get(i))
                        .into_iter()
                        .collect(),
                    _ => Vec::new(),
                }
            })
            .collect();
    }
    current.into_iter().filter_map(Value::as_str).collect()
}

/// Tokenize a document body per index field.
pub fn index_document(index: &FulltextIndexDefinition, body: &Value) -> IndexedFields {
    index
        .fields
        .iter()
        .map(|(field, path)| {
            let terms = extract_path(body, path)
                .into_iter()
                .flat_map(tokenize)
                .collect();
            (field.clone(), terms)
        })
        .collect()
}

/// Rank documents against a query, best first.
pub fn search<'a, I>(
    index: &FulltextIndexDefinition,
    query: &Query,
    docs: I,
    limit: usize,
) -> FulltextResponse
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let mut hits: Vec<FulltextHit> = docs
        .into_iter()
        .filter_map(|(id, body)| {
            let score = query.score(&index_document(index, body))?;
            Some(FulltextHit {
                id: id.to_string(),
                score,
            })
        })
        .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    let total = hits.len();
    hits.truncate(limit);

    FulltextResponse { total, hits }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn clause(field: Option<&str>, term: &str, prefix: bool) -> Clause {
        Clause {
            field: field.map(str::to_string),
            term: term.to_string(),
            prefix,
        }
    }

    fn word(values: &[(&str, &str)]) -> Value {
        let words: serde_json::Map<String, Value> = values
            .iter()
            .map(|(lang, value)| (lang.to_string(), json!({"value": value})))
            .collect();
        json!({"type": "noun", "texts": [{"words": words}]})
    }

    #[test]
    fn test_parse_and_binds_tighter_than_or() {
        let query = parse_query("value:der AND value:hund OR katze*").unwrap();
        assert_eq!(
            query.groups,
            vec![
                vec![
                    clause(Some("value"), "der", false),
                    clause(Some("value"), "hund", false)
                ],
                vec![clause(None, "katze", true)],
            ]
        );
    }

    #[test]
    fn test_parse_defaults_to_or() {
        let query = parse_query("hund katze").unwrap();
        assert_eq!(query.groups.len(), 2);
    }

    #[test]
    fn test_parse_lowercases_and_splits_terms() {
        let query = parse_query("value:Good-Bye*").unwrap();
        assert_eq!(
            query.groups,
            vec![vec![
                clause(Some("value"), "good", false),
                clause(Some("value"), "bye", true)
            ]]
        );
    }

    #[test]
    fn test_parse_rejects_bad_operators() {
        for input in ["", "AND hund", "hund OR", "hund AND OR katze", "value:*"] {
            assert!(
                matches!(parse_query(input), Err(ApiError::Query(_))),
                "accepted {:?}",
                input
            );
        }
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let query = parse_query("title:hund").unwrap();
        assert!(query.check_fields(&FulltextIndexDefinition::words()).is_err());
        let query = parse_query("value:hund").unwrap();
        assert!(query.check_fields(&FulltextIndexDefinition::words()).is_ok());
    }

    #[test]
    fn test_extract_path_with_wildcards() {
        let body = word(&[("en", "dog"), ("de", "der Hund")]);
        let mut values = extract_path(&body, "texts.*.words.*.value");
        values.sort();
        assert_eq!(values, vec!["der Hund", "dog"]);
        assert_eq!(extract_path(&body, "texts.0.words.en.value"), vec!["dog"]);
        assert!(extract_path(&body, "texts.3.words").is_empty());
        assert!(extract_path(&body, "type.value").is_empty());
    }

    #[test]
    fn test_search_ranks_and_limits() {
        let index = FulltextIndexDefinition::words();
        let dog = word(&[("en", "dog"), ("de", "Hund")]);
        let dogs = word(&[("en", "dog dog"), ("de", "Hunde")]);
        let cat = word(&[("en", "cat"), ("de", "Katze")]);
        let docs = vec![
            ("word_a", &dog),
            ("word_b", &dogs),
            ("word_c", &cat),
        ];

        let query = parse_query("value:dog").unwrap();
        let response = search(&index, &query, docs.clone(), 10);
        assert_eq!(response.total, 2);
        assert_eq!(response.hits[0].id, "word_b");
        assert_eq!(response.hits[1].id, "word_a");

        let query = parse_query("value:hund*").unwrap();
        let response = search(&index, &query, docs.clone(), 1);
        assert_eq!(response.total, 2);
        assert_eq!(response.hits.len(), 1);

        let query = parse_query("value:dog AND value:katze").unwrap();
        assert_eq!(search(&index, &query, docs, 10).total, 0);
    }
}
