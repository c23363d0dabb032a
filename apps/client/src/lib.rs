//! Offline-first vocabulary trainer client.
//!
//! Provides:
//! - A revisioned local document store over SQLite with typed entity access
//! - Incrementally materialized map/reduce views
//! - The scheduling engine and game sessions built on top of them
//! - Conflict reconciliation and replication with the sync backend

pub mod config;
pub mod db;
pub mod error;
pub mod reconcile;
pub mod search;
pub mod session;
pub mod state;
pub mod store;
pub mod sync;
pub mod views;

pub use config::ClientConfig;
pub use error::{Result, StoreError};
pub use reconcile::{ConflictReconciler, ConflictSet, ReconcileReport};
pub use search::{SchedulingEngine, WordLookup};
pub use session::{GameSession, SessionConfig, SessionEvent, SessionSnapshot};
pub use state::AppState;
pub use store::{EntityStore, MergeRegistry, StoreEvent};
pub use sync::{SyncEngine, SyncError, SyncEvent, SyncStatus};
pub use views::{KeyRange, MapView, QueryOptions, ViewMaterializer};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
