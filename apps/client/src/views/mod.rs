//! Materialized map/reduce views.
//!
//! Map functions are Rust types implementing [`MapView`]. A view is addressed
//! by `(design_id, view_name)`; installing a different signature under the
//! same name rebuilds it from scratch. Rows are folded in incrementally from
//! the local change sequence before every query.

pub mod fulltext;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info};
use vocab_core::Document;

use crate::db::{
    DocumentRepository, KeyBound, ListOptions, ViewRecord, ViewRepository, ViewRowRecord,
};
use crate::error::{Result, StoreError};
use crate::store::{lock, SharedRepository};

/// Documents folded into a view per batch.
const REFRESH_BATCH: usize = 500;

/// Composite view key: a millisecond timestamp and a tie-break string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ViewKey {
    pub time: i64,
    pub order: String,
}

impl ViewKey {
    pub fn new(time: i64, order: impl Into<String>) -> Self {
        Self {
            time,
            order: order.into(),
        }
    }

    /// Lowest key at `time`.
    pub fn lower(time: i64) -> Self {
        Self::new(time, "")
    }

    /// Highest key at `time`.
    pub fn upper(time: i64) -> Self {
        Self::new(time, char::MAX.to_string())
    }
}

/// One row emitted by a map function.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewEmit {
    pub key: ViewKey,
    pub value: Value,
}

/// A compiled map function.
pub trait MapView: Send + Sync {
    /// Changes whenever the map logic or its baked-in parameters change.
    fn signature(&self) -> String;

    fn map(&self, doc: &Document) -> Vec<ViewEmit>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduce {
    Count,
    Sum,
}

impl Reduce {
    fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "count" => Some(Self::Count),
            "sum" => Some(Self::Sum),
            _ => None,
        }
    }
}

/// Inclusive key range; open ends are unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Option<ViewKey>,
    pub end: Option<ViewKey>,
}

impl KeyRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: Option<ViewKey>, end: Option<ViewKey>) -> Self {
        Self { start, end }
    }

    fn bounds(&self) -> (KeyBound<'_>, KeyBound<'_>) {
        (
            self.start.as_ref().map(|k| (k.time, k.order.as_str())),
            self.end.as_ref().map(|k| (k.time, k.order.as_str())),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub limit: Option<usize>,
    pub skip: usize,
    pub descending: bool,
    pub include_docs: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewRow {
    pub id: String,
    pub key: ViewKey,
    pub value: Value,
    pub doc: Option<Document>,
}

/// Reports whether any view is being (re)built.
#[derive(Clone)]
pub struct ProgressHandle {
    active: Arc<watch::Sender<usize>>,
}

impl Default for ProgressHandle {
    fn default() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            active: Arc::new(tx),
        }
    }
}

impl ProgressHandle {
    /// Receiver of the number of builds in flight.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.active.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        *self.active.borrow() > 0
    }

    fn begin(&self) -> ProgressGuard {
        self.active.send_modify(|n| *n += 1);
        ProgressGuard {
            active: Arc::clone(&self.active),
        }
    }
}

struct ProgressGuard {
    active: Arc<watch::Sender<usize>>,
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
    }
}

struct Registered {
    view: Arc<dyn MapView>,
    reduce: Option<Reduce>,
}

/// Installs views and answers queries against them.
#[derive(Clone)]
pub struct ViewMaterializer {
    repo: SharedRepository,
    progress: ProgressHandle,
    registered: Arc<Mutex<HashMap<String, Registered>>>,
}

fn view_id(design_id: &str, view_name: &str) -> String {
    format!("{}/{}", design_id, view_name)
}

impl ViewMaterializer {
    pub fn new(repo: SharedRepository, progress: ProgressHandle) -> Self {
        Self {
            repo,
            progress,
            registered: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn progress(&self) -> &ProgressHandle {
        &self.progress
    }

    /// Install `view` under `design_id/view_name` unless an identical
    /// definition is already there.
    pub fn ensure_view(
        &self,
        design_id: &str,
        view_name: &str,
        view: Arc<dyn MapView>,
        reduce: Option<Reduce>,
    ) -> Result<()> {
        let id = view_id(design_id, view_name);
        let signature = view.signature();
        {
            let repo = lock(&self.repo);
            let installed = repo.get_view(&id)?;
            let up_to_date = installed.as_ref().is_some_and(|record| {
                record.signature == signature
                    && record.reduce.as_deref() == reduce.map(Reduce::as_str)
            });
            if !up_to_date {
                info!(view = %id, "installing view");
                repo.install_view(&ViewRecord {
                    view_id: id.clone(),
                    design_id: design_id.to_string(),
                    view_name: view_name.to_string(),
                    signature,
                    reduce: reduce.map(|r| r.as_str().to_string()),
                    indexed_seq: 0,
                })?;
            }
        }
        self.registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Registered { view, reduce });
        Ok(())
    }

    /// Ordered rows of a view within `range`.
    pub fn query(
        &self,
        design_id: &str,
        view_name: &str,
        range: &KeyRange,
        options: &QueryOptions,
    ) -> Result<Vec<ViewRow>> {
        let id = view_id(design_id, view_name);
        let (view, _) = self.registered_view(&id)?;
        self.refresh(&id, view.as_ref())?;

        let (start, end) = range.bounds();
        let list = ListOptions {
            limit: options.limit,
            skip: options.skip,
            descending: options.descending,
            include_deleted: false,
        };
        let repo = lock(&self.repo);
        let records = repo.query_view_rows(&id, start, end, &list)?;

        records
            .into_iter()
            .map(|record| {
                let doc = if options.include_docs {
                    repo.get_document(&record.doc_id)?
                        .map(|stored| stored.doc)
                        .filter(|doc| !doc.deleted)
                } else {
                    None
                };
                Ok(ViewRow {
                    id: record.doc_id,
                    key: ViewKey::new(record.key_time, record.key_order),
                    value: record.value,
                    doc,
                })
            })
            .collect()
    }

    /// Reduce the rows within `range` with the view's reducer.
    pub fn reduce(&self, design_id: &str, view_name: &str, range: &KeyRange) -> Result<Value> {
        let id = view_id(design_id, view_name);
        let (view, reduce) = self.registered_view(&id)?;
        let reduce = reduce.ok_or_else(|| {
            StoreError::InvalidConfiguration(format!("view {} has no reducer", id))
        })?;
        self.refresh(&id, view.as_ref())?;

        let (start, end) = range.bounds();
        let repo = lock(&self.repo);
        match reduce {
            Reduce::Count => Ok(Value::from(repo.count_view_rows(&id, start, end)?)),
            Reduce::Sum => {
                let rows = repo.query_view_rows(&id, start, end, &ListOptions::default())?;
                let total: f64 = rows.iter().filter_map(|row| row.value.as_f64()).sum();
                Ok(Value::from(total))
            }
        }
    }

    fn registered_view(&self, id: &str) -> Result<(Arc<dyn MapView>, Option<Reduce>)> {
        let registered = self
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = registered.get(id) {
            return Ok((Arc::clone(&entry.view), entry.reduce));
        }
        drop(registered);

        // Installed by an earlier process but not by this one.
        let installed = lock(&self.repo).get_view(id)?;
        Err(match installed {
            Some(record) => StoreError::InvalidConfiguration(format!(
                "view {} ({}) has no map function registered",
                id,
                record.reduce.as_deref().and_then(Reduce::parse).map_or("map only", Reduce::as_str)
            )),
            None => StoreError::NotFound(id.to_string()),
        })
    }

    /// Fold documents changed since the last refresh into the view.
    fn refresh(&self, id: &str, view: &dyn MapView) -> Result<()> {
        let repo = lock(&self.repo);
        let record = repo
            .get_view(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut seq = record.indexed_seq;
        if seq >= repo.current_seq()? {
            return Ok(());
        }

        let _loading = self.progress.begin();
        loop {
            let changes = repo.changes_since(seq, REFRESH_BATCH)?;
            let Some(last) = changes.last() else {
                break;
            };
            seq = last.seq;
            let rows_by_doc: Vec<(String, Vec<ViewRowRecord>)> = changes
                .iter()
                .map(|stored| {
                    let rows = if stored.doc.deleted {
                        Vec::new()
                    } else {
                        view.map(&stored.doc)
                            .into_iter()
                            .map(|emit| ViewRowRecord {
                                doc_id: stored.doc.id.clone(),
                                key_time: emit.key.time,
                                key_order: emit.key.order,
                                value: emit.value,
                            })
                            .collect()
                    };
                    (stored.doc.id.clone(), rows)
                })
                .collect();
            debug!(view = %id, docs = rows_by_doc.len(), seq, "refreshing view");
            repo.write_view_rows(id, &rows_by_doc, seq)?;
            if changes.len() < REFRESH_BATCH {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntityStore;
    use serde_json::json;
    use vocab_core::{Text, WordEntity};

    /// Emits one row per text keyed by the number of languages.
    struct TextsView;

    impl MapView for TextsView {
        fn signature(&self) -> String {
            "texts:v1".into()
        }

        fn map(&self, doc: &Document) -> Vec<ViewEmit> {
            let Ok(word) = doc.to_entity::<WordEntity>() else {
                return Vec::new();
            };
            word.texts
                .iter()
                .enumerate()
                .map(|(i, text)| ViewEmit {
                    key: ViewKey::new(text.words.len() as i64, format!("{}:{}", doc.id, i)),
                    value: json!(1.5),
                })
                .collect()
        }
    }

    fn setup() -> (EntityStore, ViewMaterializer) {
        let store = EntityStore::open_in_memory().unwrap();
        let views = ViewMaterializer::new(store.repository().clone(), ProgressHandle::default());
        (store, views)
    }

    #[test]
    fn query_reflects_later_writes() {
        let (store, views) = setup();
        views
            .ensure_view("_design/test", "texts", Arc::new(TextsView), Some(Reduce::Count))
            .unwrap();
        let word = store
            .create(WordEntity::new("noun", vec![Text::from_pairs([("en", "dog")])]))
            .unwrap();

        let rows = views
            .query("_design/test", "texts", &KeyRange::all(), &QueryOptions::default())
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key.time, 1);

        let mut word = word;
        word.texts.push(Text::from_pairs([("en", "cat"), ("de", "Katze")]));
        let word = store.update(word).unwrap();
        let rows = views
            .query(
                "_design/test",
                "texts",
                &KeyRange::between(Some(ViewKey::lower(2)), None),
                &QueryOptions {
                    include_docs: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].doc.as_ref().unwrap().rev, word.rev.clone().unwrap());

        store.remove(&word).unwrap();
        let count = views.reduce("_design/test", "texts", &KeyRange::all()).unwrap();
        assert_eq!(count, json!(0));
    }

    #[test]
    fn ensure_view_is_idempotent_and_signature_change_rebuilds() {
        let (store, views) = setup();
        store
            .create(WordEntity::new("noun", vec![Text::from_pairs([("en", "dog")])]))
            .unwrap();
        views
            .ensure_view("_design/test", "texts", Arc::new(TextsView), Some(Reduce::Sum))
            .unwrap();
        assert_eq!(
            views.reduce("_design/test", "texts", &KeyRange::all()).unwrap(),
            json!(1.5)
        );
        views
            .ensure_view("_design/test", "texts", Arc::new(TextsView), Some(Reduce::Sum))
            .unwrap();
        let indexed = lock(store.repository())
            .get_view("_design/test/texts")
            .unwrap()
            .unwrap()
            .indexed_seq;
        assert!(indexed > 0);

        views
            .ensure_view("_design/test", "texts", Arc::new(TextsView), Some(Reduce::Count))
            .unwrap();
        let record = lock(store.repository())
            .get_view("_design/test/texts")
            .unwrap()
            .unwrap();
        assert_eq!(record.indexed_seq, 0);
    }

    #[test]
    fn unknown_view_is_not_found() {
        let (_, views) = setup();
        let err = views
            .query("_design/none", "due", &KeyRange::all(), &QueryOptions::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn progress_returns_to_idle() {
        let (store, views) = setup();
        let progress = views.progress().clone();
        let rx = progress.subscribe();
        views
            .ensure_view("_design/test", "texts", Arc::new(TextsView), None)
            .unwrap();
        store
            .create(WordEntity::new("noun", vec![Text::from_pairs([("en", "dog")])]))
            .unwrap();
        views
            .query("_design/test", "texts", &KeyRange::all(), &QueryOptions::default())
            .unwrap();
        assert!(!progress.is_loading());
        assert_eq!(*rx.borrow(), 0);
    }
}
