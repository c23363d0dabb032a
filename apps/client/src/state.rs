//! Application state: every component wired over one repository.

use std::sync::{Arc, Mutex};

use tracing::info;
use vocab_core::{ReviewUnit, SearchOptions, SessionGoal};

use crate::config::ClientConfig;
use crate::db::{SqliteRepository, SyncRepository};
use crate::error::{Result, StoreError};
use crate::reconcile::ConflictReconciler;
use crate::search::{SchedulingEngine, WordLookup};
use crate::session::{GameSession, SessionConfig};
use crate::store::{lock, EntityStore, MergeRegistry};
use crate::sync::SyncEngine;
use crate::views::fulltext::FulltextClient;
use crate::views::{ProgressHandle, ViewMaterializer};

/// Global application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ClientConfig,
    pub store: EntityStore,
    pub views: ViewMaterializer,
    pub engine: SchedulingEngine,
    pub reconciler: ConflictReconciler,
    pub lookup: WordLookup,
    /// Present when a sync backend is configured.
    pub sync: Option<SyncEngine>,
}

impl AppState {
    /// Open the local database and wire the components.
    pub fn open(config: ClientConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::InvalidConfiguration(format!(
                    "cannot create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        let repository = SqliteRepository::open(&config.db_path)?;
        info!(path = %config.db_path.display(), "opened local database");
        Self::with_repository(config, repository)
    }

    pub fn with_repository(config: ClientConfig, repository: SqliteRepository) -> Result<Self> {
        let repo = Arc::new(Mutex::new(repository));
        let store = EntityStore::new(repo.clone(), MergeRegistry::with_defaults());
        let views = ViewMaterializer::new(repo, ProgressHandle::default());
        let engine = SchedulingEngine::new(store.clone(), views.clone());
        let reconciler = ConflictReconciler::new(store.clone());

        let fulltext = FulltextClient::new(config.fulltext_url.as_deref());
        let device = lock(store.repository()).get_device_token()?;
        fulltext.set_token(device.map(|device| device.token));
        let lookup = WordLookup::new(store.clone(), fulltext);

        let sync = config
            .sync_url
            .as_deref()
            .map(|url| SyncEngine::new(url, store.clone(), reconciler.clone()));

        Ok(Self {
            config,
            store,
            views,
            engine,
            reconciler,
            lookup,
            sync,
        })
    }

    /// A new game session over units of type `U`.
    pub fn session<U: ReviewUnit>(&self, options: SearchOptions, goal: SessionGoal) -> GameSession<U> {
        let config = SessionConfig::new(options)
            .with_goal(goal)
            .with_tick(self.config.tick);
        GameSession::new(self.store.clone(), self.engine.clone(), config)
    }
}
