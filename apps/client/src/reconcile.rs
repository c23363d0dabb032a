//! Conflict reconciliation: merge conflicting leaves and retire the losers.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use vocab_core::{winning_index, Document, EntityKind};

use crate::db::{ConflictRepository, DocumentRepository, SyncRepository};
use crate::error::{Result, StoreError};
use crate::store::{lock, EntityStore};

/// A document with more than one live leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictSet {
    pub doc_id: String,
    /// Every conflicting leaf revision except the local one.
    pub conflicting_revisions: Vec<String>,
    /// The leaf the deterministic winner rule picks.
    pub winning: Document,
    /// All other live leaves, local revision included when it lost.
    pub conflicting: Vec<Document>,
    /// Revision the merge is written on top of.
    pub local_rev: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub merged: usize,
    /// Losing revisions whose deletion failed; retried on the next pass.
    pub orphaned: usize,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct ConflictReconciler {
    store: EntityStore,
}

impl ConflictReconciler {
    pub fn new(store: EntityStore) -> Self {
        Self { store }
    }

    /// Conflicted documents of one kind.
    pub fn find_conflicts(&self, kind: EntityKind) -> Result<Vec<ConflictSet>> {
        let repo = lock(self.store.repository());
        let (start, end) = kind.id_range();
        let mut sets = Vec::new();

        for doc_id in repo.conflicted_ids(&start, &end)? {
            let Some(local) = repo.get_document(&doc_id)? else {
                continue;
            };
            let conflicts: Vec<Document> = repo
                .conflicts_for(&doc_id)?
                .into_iter()
                .filter(|doc| !doc.deleted && doc.rev != local.doc.rev)
                .collect();
            if conflicts.is_empty() {
                continue;
            }

            let local_rev = local.doc.rev.clone();
            let conflicting_revisions = conflicts.iter().map(|doc| doc.rev.clone()).collect();
            let mut leaves = Vec::with_capacity(conflicts.len() + 1);
            if !local.doc.deleted {
                leaves.push(local.doc);
            }
            leaves.extend(conflicts);

            let Some(winner) = winning_index(leaves.iter().map(|d| (d.rev.as_str(), d.deleted)))
            else {
                continue;
            };
            let winning = leaves.remove(winner);
            sets.push(ConflictSet {
                doc_id,
                conflicting_revisions,
                winning,
                conflicting: leaves,
                local_rev,
            });
        }
        Ok(sets)
    }

    /// Merged body for a conflict set, using the strategy registered for its kind.
    pub fn reconcile(&self, set: &ConflictSet) -> Result<Value> {
        let kind = EntityKind::of_id(&set.doc_id).ok_or_else(|| {
            StoreError::InvalidEntity(format!("unknown entity kind for {}", set.doc_id))
        })?;
        let merge = self.store.merges().get(kind).ok_or_else(|| {
            StoreError::InvalidConfiguration(format!("no merge strategy for {:?}", kind))
        })?;
        Ok(merge(&set.winning, &set.conflicting)?)
    }

    /// Write the merge and retire the losing revisions.
    ///
    /// Returns how many losers could not be retired.
    pub fn resolve(&self, set: &ConflictSet) -> Result<usize> {
        let merged = self.reconcile(set)?;

        let unchanged = {
            let repo = lock(self.store.repository());
            repo.get_document(&set.doc_id)?
                .is_some_and(|current| !current.doc.deleted && current.doc.body == merged)
        };
        if unchanged {
            debug!(id = %set.doc_id, "merge equals local revision");
        } else {
            self.store
                .put_body(&set.doc_id, Some(&set.local_rev), &merged)?;
        }

        let mut orphaned = 0;
        let repo = lock(self.store.repository());
        for loser in &set.conflicting_revisions {
            let retired = repo
                .remove_conflict(&set.doc_id, loser)
                .and_then(|_| repo.queue_tombstone(&set.doc_id, loser));
            if let Err(err) = retired {
                warn!(id = %set.doc_id, rev = %loser, "failed to retire losing revision: {}", err);
                orphaned += 1;
            }
        }
        Ok(orphaned)
    }

    /// Find and resolve every conflict of one kind.
    pub fn reconcile_all(&self, kind: EntityKind) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        for set in self.find_conflicts(kind)? {
            match self.resolve(&set) {
                Ok(orphaned) => {
                    report.merged += 1;
                    report.orphaned += orphaned;
                }
                Err(err) => {
                    warn!(id = %set.doc_id, "could not reconcile: {}", err);
                    report.skipped += 1;
                }
            }
        }
        if report.merged > 0 || report.skipped > 0 {
            info!(
                kind = ?kind,
                merged = report.merged,
                orphaned = report.orphaned,
                skipped = report.skipped,
                "reconciled conflicts"
            );
        }
        Ok(report)
    }
}
