//! PostgreSQL database operations

use std::collections::BTreeMap;

use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

/// Database wrapper with connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL and create connection pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // === Accounts and devices ===

    pub async fn create_account(&self) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar("INSERT INTO accounts DEFAULT VALUES RETURNING id")
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn account_exists(&self, account_id: Uuid) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM accounts WHERE id = $1)")
                .bind(account_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    /// Create a new device with generated token
    pub async fn create_device(&self, account_id: Uuid, name: Option<&str>) -> Result<Device> {
        let token = Uuid::new_v4().to_string();
        let device = sqlx::query_as::<_, Device>(
            r#"
            INSERT INTO devices (account_id, token, name)
            VALUES ($1, $2, $3)
            RETURNING id, account_id, token, name, created_at, last_seen_at
            "#,
        )
        .bind(account_id)
        .bind(&token)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(device)
    }

    /// Get device by token
    pub async fn get_device_by_token(&self, token: &str) -> Result<Option<Device>> {
        let device = sqlx::query_as::<_, Device>(
            r#"
            SELECT id, account_id, token, name, created_at, last_seen_at
            FROM devices
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(device)
    }

    pub async fn update_last_seen(&self, device_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE devices SET last_seen_at = NOW() WHERE id = $1")
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // === Revisions ===

    /// Store a pushed revision.
    ///
    /// An existing revision is left untouched. The parent stops being a leaf
    /// when it still is one, otherwise the new revision opens a branch.
    pub async fn store_revision(&self, account_id: Uuid, doc: &PushDoc) -> Result<StoredRevision> {
        let mut tx = self.pool.begin().await?;

        // Serialize writers of the same document.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text || '/' || $2))")
            .bind(account_id.to_string())
            .bind(&doc.id)
            .execute(&mut *tx)
            .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO document_revisions (account_id, doc_id, rev, parent_rev, deleted, body)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (account_id, doc_id, rev) DO NOTHING
            "#,
        )
        .bind(account_id)
        .bind(&doc.id)
        .bind(&doc.rev)
        .bind(&doc.parent_rev)
        .bind(doc.deleted)
        .bind(&doc.body)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if inserted {
            if let Some(parent) = &doc.parent_rev {
                sqlx::query(
                    r#"
                    UPDATE document_revisions SET is_leaf = FALSE
                    WHERE account_id = $1 AND doc_id = $2 AND rev = $3 AND is_leaf
                    "#,
                )
                .bind(account_id)
                .bind(&doc.id)
                .bind(parent)
                .execute(&mut *tx)
                .await?;
            }
        }

        let live_leaves: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM document_revisions
            WHERE account_id = $1 AND doc_id = $2 AND is_leaf AND NOT deleted
            "#,
        )
        .bind(account_id)
        .bind(&doc.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(StoredRevision {
            inserted,
            live_leaves,
        })
    }

    /// Documents with a revision stored after `since`, oldest change first.
    pub async fn changed_since(
        &self,
        account_id: Uuid,
        since: i64,
        limit: i64,
    ) -> Result<Vec<ChangedDoc>> {
        let changed = sqlx::query_as::<_, ChangedDoc>(
            r#"
            SELECT doc_id, MAX(seq) AS seq
            FROM document_revisions
            WHERE account_id = $1 AND seq > $2
            GROUP BY doc_id
            ORDER BY MAX(seq)
            LIMIT $3
            "#,
        )
        .bind(account_id)
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(changed)
    }

    /// Leaf revisions of the given documents.
    pub async fn leaves_of(&self, account_id: Uuid, doc_ids: &[String]) -> Result<Vec<LeafRow>> {
        let leaves = sqlx::query_as::<_, LeafRow>(
            r#"
            SELECT doc_id, rev, deleted, body
            FROM document_revisions
            WHERE account_id = $1 AND doc_id = ANY($2) AND is_leaf
            ORDER BY doc_id, rev
            "#,
        )
        .bind(account_id)
        .bind(doc_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(leaves)
    }

    /// Every leaf revision of the account.
    pub async fn all_leaves(&self, account_id: Uuid) -> Result<Vec<LeafRow>> {
        let leaves = sqlx::query_as::<_, LeafRow>(
            r#"
            SELECT doc_id, rev, deleted, body
            FROM document_revisions
            WHERE account_id = $1 AND is_leaf
            ORDER BY doc_id, rev
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(leaves)
    }

    // === Full-text indexes ===

    pub async fn upsert_fulltext_index(
        &self,
        account_id: Uuid,
        name: &str,
        definition: &FulltextIndexDefinition,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fulltext_indexes (account_id, name, fields)
            VALUES ($1, $2, $3)
            ON CONFLICT (account_id, name) DO UPDATE SET
                fields = EXCLUDED.fields,
                updated_at = NOW()
            "#,
        )
        .bind(account_id)
        .bind(name)
        .bind(Json(&definition.fields))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_fulltext_index(
        &self,
        account_id: Uuid,
        name: &str,
    ) -> Result<Option<FulltextIndexDefinition>> {
        let fields: Option<Json<BTreeMap<String, String>>> = sqlx::query_scalar(
            "SELECT fields FROM fulltext_indexes WHERE account_id = $1 AND name = $2",
        )
        .bind(account_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(fields.map(|Json(fields)| FulltextIndexDefinition { fields }))
    }
}
