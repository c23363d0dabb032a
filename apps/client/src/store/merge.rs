//! Registry of per-entity merge strategies.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use vocab_core::merge::{merge_all, Mergeable};
use vocab_core::{Document, Entity, EntityKind, GameLogEntity, WordEntity, WordTypeEntity};

/// Merge a winning revision with conflicting ones, returning the merged body.
pub type MergeFn =
    Arc<dyn Fn(&Document, &[Document]) -> vocab_core::Result<Value> + Send + Sync>;

/// Merge strategies keyed by entity kind, fixed when the store opens.
#[derive(Clone, Default)]
pub struct MergeRegistry {
    strategies: HashMap<EntityKind, MergeFn>,
}

fn merge_documents<E: Entity + Mergeable>(
    winning: &Document,
    conflicting: &[Document],
) -> vocab_core::Result<Value> {
    let winner: E = winning.to_entity()?;
    let others = conflicting
        .iter()
        .map(Document::to_entity::<E>)
        .collect::<vocab_core::Result<Vec<_>>>()?;
    Document::body_of(&merge_all(&winner, &others))
}

impl MergeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in strategies for every entity kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register::<WordEntity>();
        registry.register::<WordTypeEntity>();
        registry.register::<GameLogEntity>();
        registry
    }

    pub fn register<E: Entity + Mergeable>(&mut self) {
        self.strategies
            .insert(E::KIND, Arc::new(merge_documents::<E>));
    }

    pub fn register_fn(&mut self, kind: EntityKind, merge: MergeFn) {
        self.strategies.insert(kind, merge);
    }

    pub fn get(&self, kind: EntityKind) -> Option<&MergeFn> {
        self.strategies.get(&kind)
    }

    pub fn contains(&self, kind: EntityKind) -> bool {
        self.strategies.contains_key(&kind)
    }
}

impl std::fmt::Debug for MergeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeRegistry")
            .field("kinds", &self.strategies.keys().collect::<Vec<_>>())
            .finish()
    }
}
