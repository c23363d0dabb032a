//! Entity store: typed CRUD with optimistic concurrency over the document driver.

pub mod merge;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;
use vocab_core::{Document, Entity, EntityKind};

use crate::db::{DbError, DocumentRepository, ListOptions, SqliteRepository, StoredDocument};
use crate::error::{Result, StoreError};
pub use merge::{MergeFn, MergeRegistry};

/// Attempts at merging a conflicting write before giving up.
pub const MAX_MERGE_ATTEMPTS: usize = 3;

/// Repository shared by every component of one client.
pub type SharedRepository = Arc<Mutex<SqliteRepository>>;

/// Lock the repository, recovering from a poisoned lock.
pub fn lock(repo: &SharedRepository) -> MutexGuard<'_, SqliteRepository> {
    repo.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Notification published after every successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum StoreEvent {
    EntitySaved {
        kind: Option<EntityKind>,
        id: String,
        rev: String,
    },
    EntityRemoved {
        kind: Option<EntityKind>,
        id: String,
        rev: String,
    },
}

#[derive(Clone)]
pub struct EntityStore {
    repo: SharedRepository,
    merges: Arc<MergeRegistry>,
    events: broadcast::Sender<StoreEvent>,
}

impl EntityStore {
    pub fn new(repo: SharedRepository, merges: MergeRegistry) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            repo,
            merges: Arc::new(merges),
            events,
        }
    }

    /// In-memory store with the default merge strategies (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let repo = SqliteRepository::open_in_memory()?;
        Ok(Self::new(
            Arc::new(Mutex::new(repo)),
            MergeRegistry::with_defaults(),
        ))
    }

    pub fn repository(&self) -> &SharedRepository {
        &self.repo
    }

    pub fn merges(&self) -> &MergeRegistry {
        &self.merges
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Persist a new entity, assigning an id when it has none.
    pub fn create<E: Entity>(&self, mut entity: E) -> Result<E> {
        if entity.id().is_empty() {
            entity.set_id(E::KIND.make_id(&Uuid::new_v4().simple().to_string()));
        } else if EntityKind::of_id(entity.id()) != Some(E::KIND) {
            return Err(StoreError::InvalidEntity(format!(
                "id {} does not belong to {}",
                entity.id(),
                E::KIND.prefix()
            )));
        }
        entity.before_save(Utc::now());
        let body = Document::body_of(&entity)?;

        let stored = {
            let repo = lock(&self.repo);
            repo.put_document(entity.id(), None, false, &body)
        }
        .map_err(|e| conflict_or(e, entity.id(), None))?;

        self.saved(E::KIND, &stored);
        entity.set_rev(Some(stored.doc.rev));
        Ok(entity)
    }

    /// Write a new revision of an existing entity.
    ///
    /// A stale revision is merged with the current one through the registered
    /// strategy; without one the conflict is returned.
    pub fn update<E: Entity>(&self, mut entity: E) -> Result<E> {
        entity.before_save(Utc::now());
        let id = entity.id().to_string();
        let mut expected = entity.rev().map(str::to_string);
        let mut body = Document::body_of(&entity)?;

        for attempt in 0..=MAX_MERGE_ATTEMPTS {
            let result = {
                let repo = lock(&self.repo);
                repo.put_document(&id, expected.as_deref(), false, &body)
            };
            match result {
                Ok(stored) => {
                    self.saved(E::KIND, &stored);
                    return Ok(stored.doc.to_entity()?);
                }
                Err(DbError::RevisionMismatch { current, .. }) => {
                    let Some(merge) = self.merges.get(E::KIND) else {
                        return Err(StoreError::Conflict {
                            id,
                            expected,
                            current,
                        });
                    };
                    if attempt == MAX_MERGE_ATTEMPTS {
                        warn!(%id, "giving up after {} merge attempts", MAX_MERGE_ATTEMPTS);
                        return Err(StoreError::Conflict {
                            id,
                            expected,
                            current,
                        });
                    }
                    let latest = self.load(&id)?;
                    if latest.doc.deleted {
                        return Err(StoreError::Conflict {
                            id,
                            expected,
                            current,
                        });
                    }
                    let attempted = Document {
                        id: id.clone(),
                        rev: expected.clone().unwrap_or_default(),
                        deleted: false,
                        body: body.clone(),
                    };
                    debug!(%id, rev = %latest.doc.rev, "merging conflicting write");
                    body = merge(&latest.doc, std::slice::from_ref(&attempted))?;
                    expected = Some(latest.doc.rev);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict {
            id,
            expected,
            current: None,
        })
    }

    /// Tombstone an entity at its current revision.
    ///
    /// Returns the tombstone's revision.
    pub fn remove<E: Entity>(&self, entity: &E) -> Result<String> {
        let id = entity.id();
        let expected = entity.rev();
        let stored = {
            let repo = lock(&self.repo);
            repo.put_document(id, expected, true, &Value::Object(Default::default()))
        }
        .map_err(|e| conflict_or(e, id, expected))?;

        let rev = stored.doc.rev;
        let _ = self.events.send(StoreEvent::EntityRemoved {
            kind: EntityKind::of_id(id),
            id: id.to_string(),
            rev: rev.clone(),
        });
        Ok(rev)
    }

    pub fn get_by_id<E: Entity>(&self, id: &str) -> Result<E> {
        let stored = self.load(id)?;
        if stored.doc.deleted {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(stored.doc.to_entity()?)
    }

    /// Entities with ids in `[start_key, end_key]`, ordered by id.
    pub fn list_by_range<E: Entity>(
        &self,
        start_key: &str,
        end_key: &str,
        options: &ListOptions,
    ) -> Result<Vec<E>> {
        let docs = {
            let repo = lock(&self.repo);
            repo.list_documents(start_key, end_key, options)?
        };
        docs.iter()
            .filter(|doc| !doc.deleted)
            .map(|doc| doc.to_entity().map_err(StoreError::from))
            .collect()
    }

    /// Every entity of one kind.
    pub fn list_all<E: Entity>(&self, options: &ListOptions) -> Result<Vec<E>> {
        let (start, end) = E::KIND.id_range();
        self.list_by_range(&start, &end, options)
    }

    /// Raw write used by the reconciler; bypasses merging.
    pub(crate) fn put_body(
        &self,
        id: &str,
        expected_rev: Option<&str>,
        body: &Value,
    ) -> Result<StoredDocument> {
        let stored = {
            let repo = lock(&self.repo);
            repo.put_document(id, expected_rev, false, body)
        }
        .map_err(|e| conflict_or(e, id, expected_rev))?;
        self.saved_kind(EntityKind::of_id(id), &stored);
        Ok(stored)
    }

    fn load(&self, id: &str) -> Result<StoredDocument> {
        let repo = lock(&self.repo);
        repo.get_document(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn saved(&self, kind: EntityKind, stored: &StoredDocument) {
        self.saved_kind(Some(kind), stored);
    }

    fn saved_kind(&self, kind: Option<EntityKind>, stored: &StoredDocument) {
        // No subscribers is fine.
        let _ = self.events.send(StoreEvent::EntitySaved {
            kind,
            id: stored.doc.id.clone(),
            rev: stored.doc.rev.clone(),
        });
    }
}

fn conflict_or(err: DbError, id: &str, expected: Option<&str>) -> StoreError {
    match err {
        DbError::RevisionMismatch { current, .. } => StoreError::Conflict {
            id: id.to_string(),
            expected: expected.map(str::to_string),
            current,
        },
        other => other.into(),
    }
}
