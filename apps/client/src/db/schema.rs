//! SQLite schema definitions.

/// Current schema version for migrations.
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema for local SQLite database.
pub const SCHEMA: &str = r#"
-- Local device info
CREATE TABLE IF NOT EXISTS local_device (
    token TEXT PRIMARY KEY,
    device_id TEXT,
    account_id TEXT
);

-- Current revision of every document
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    rev TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    body TEXT NOT NULL,
    seq INTEGER NOT NULL,
    remote_rev TEXT,
    pending INTEGER NOT NULL DEFAULT 0
);

-- Conflicting leaf revisions pulled from the peer
CREATE TABLE IF NOT EXISTS conflicts (
    doc_id TEXT NOT NULL,
    rev TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    body TEXT NOT NULL,
    PRIMARY KEY (doc_id, rev)
);

-- Tombstones for losing revisions, waiting to be pushed
CREATE TABLE IF NOT EXISTS pending_tombstones (
    doc_id TEXT NOT NULL,
    parent_rev TEXT NOT NULL,
    queued_at TEXT NOT NULL,
    PRIMARY KEY (doc_id, parent_rev)
);

-- Local sequence counter
CREATE TABLE IF NOT EXISTS sequence (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    value INTEGER NOT NULL DEFAULT 0
);

-- Installed view definitions
CREATE TABLE IF NOT EXISTS views (
    view_id TEXT PRIMARY KEY,
    design_id TEXT NOT NULL,
    view_name TEXT NOT NULL,
    signature TEXT NOT NULL,
    reduce TEXT,
    indexed_seq INTEGER NOT NULL DEFAULT 0
);

-- Materialized view rows
CREATE TABLE IF NOT EXISTS view_rows (
    view_id TEXT NOT NULL,
    doc_id TEXT NOT NULL,
    key_time INTEGER NOT NULL,
    key_order TEXT NOT NULL,
    value TEXT NOT NULL
);

-- Sync metadata
CREATE TABLE IF NOT EXISTS sync_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_remote_seq INTEGER NOT NULL DEFAULT 0,
    last_sync_at TEXT
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_documents_seq ON documents(seq);
CREATE INDEX IF NOT EXISTS idx_documents_pending ON documents(pending);
CREATE INDEX IF NOT EXISTS idx_view_rows_key ON view_rows(view_id, key_time, key_order);
CREATE INDEX IF NOT EXISTS idx_view_rows_doc ON view_rows(view_id, doc_id);
"#;

/// Initialize singleton rows if not exists.
pub const INIT_SINGLETONS: &str = r#"
INSERT OR IGNORE INTO sequence (id, value) VALUES (1, 0);
INSERT OR IGNORE INTO sync_state (id, last_remote_seq) VALUES (1, 0);
"#;
