//! Common test utilities and fixtures for integration tests.
//!
//! # Requirements
//! Integration tests require a PostgreSQL database (set DATABASE_URL env var).

pub mod fixtures;

use std::sync::Arc;

use axum::Router;
use uuid::Uuid;

use vocab_backend::db::Database;
use vocab_backend::models::Device;
use vocab_backend::{build_router, AppState};

/// Test context containing database connection and router.
pub struct TestContext {
    pub db: Arc<Database>,
    app: Router,
}

impl TestContext {
    /// Create a new test context.
    ///
    /// # Panics
    /// Panics if DATABASE_URL is not set or database connection fails.
    pub async fn new() -> Self {
        dotenvy::dotenv().ok();

        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

        let db = Database::connect(&database_url, 5)
            .await
            .expect("Failed to connect to test database");

        db.run_migrations()
            .await
            .expect("Failed to run migrations");

        let db = Arc::new(db);
        let app = build_router(AppState { db: db.clone() });

        Self { db, app }
    }

    /// Get the router for use with axum-test.
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    /// Create a test device on a fresh account.
    pub async fn create_test_device(&self, name: Option<&str>) -> Device {
        let account_id = self
            .db
            .create_account()
            .await
            .expect("Failed to create test account");
        self.db
            .create_device(account_id, name)
            .await
            .expect("Failed to create test device")
    }

    /// Get device by token.
    pub async fn get_device_by_token(&self, token: &str) -> Option<Device> {
        self.db.get_device_by_token(token).await.ok().flatten()
    }

    /// Format authorization header value.
    pub fn auth_header_value(token: &str) -> String {
        format!("Bearer {}", token)
    }

    /// Remove an account with its devices, revisions and indexes.
    pub async fn cleanup_account(&self, account_id: Uuid) {
        let _ = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(account_id)
            .execute(self.db.pool())
            .await;
    }
}
