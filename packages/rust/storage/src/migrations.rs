//! SQL migration definitions for the Autograph metadata database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: files, texts, sources, assertions, builds, snapshots, nodes",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Uploaded file metadata
CREATE TABLE IF NOT EXISTS files (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    file_type  TEXT NOT NULL,
    name       TEXT NOT NULL,
    url        TEXT,
    created_at TEXT NOT NULL
);

-- Text fragments, optionally owned by a file
CREATE TABLE IF NOT EXISTS texts (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id    INTEGER REFERENCES files(id) ON DELETE SET NULL,
    content    TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Extraction source registry
CREATE TABLE IF NOT EXISTS extraction_sources (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    kind        INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);

-- Entity claims (kind: Add=1, Del=2, Tmp=3)
CREATE TABLE IF NOT EXISTS entity_assertions (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL,
    kind       INTEGER NOT NULL,
    source_id  INTEGER NOT NULL REFERENCES extraction_sources(id) ON DELETE CASCADE,
    text_id    INTEGER REFERENCES texts(id) ON DELETE SET NULL,
    task_id    INTEGER,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entity_assertions_name ON entity_assertions(name);
CREATE INDEX IF NOT EXISTS idx_entity_assertions_source_kind ON entity_assertions(source_id, kind);

-- Relation claims between two entity claims (kind: Add=1, Del=2)
CREATE TABLE IF NOT EXISTS relation_assertions (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    label      TEXT NOT NULL,
    kind       INTEGER NOT NULL,
    source_id  INTEGER NOT NULL REFERENCES extraction_sources(id) ON DELETE CASCADE,
    text_id    INTEGER REFERENCES texts(id) ON DELETE SET NULL,
    task_id    INTEGER,
    head_id    INTEGER NOT NULL REFERENCES entity_assertions(id) ON DELETE CASCADE,
    tail_id    INTEGER NOT NULL REFERENCES entity_assertions(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_relation_assertions_head ON relation_assertions(head_id);

-- Build snapshots (write-once)
CREATE TABLE IF NOT EXISTS builds (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    description TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

-- Per-build frozen copies of extraction sources (write-once)
CREATE TABLE IF NOT EXISTS source_snapshots (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    build_id    INTEGER NOT NULL REFERENCES builds(id),
    source_id   INTEGER NOT NULL,
    name        TEXT NOT NULL,
    description TEXT NOT NULL,
    kind        INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_source_snapshots_build ON source_snapshots(build_id);

-- Materialized per-build vertices (write-once)
CREATE TABLE IF NOT EXISTS nodes (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    build_id       INTEGER NOT NULL REFERENCES builds(id),
    name           TEXT NOT NULL,
    schema_version INTEGER NOT NULL,
    out_json       TEXT NOT NULL,
    source_json    TEXT NOT NULL,
    UNIQUE(build_id, name)
);

-- Builds are immutable once committed
CREATE TRIGGER IF NOT EXISTS builds_no_update BEFORE UPDATE ON builds BEGIN
    SELECT RAISE(ABORT, 'builds are write-once');
END;

CREATE TRIGGER IF NOT EXISTS builds_no_delete BEFORE DELETE ON builds BEGIN
    SELECT RAISE(ABORT, 'builds are write-once');
END;

CREATE TRIGGER IF NOT EXISTS source_snapshots_no_update BEFORE UPDATE ON source_snapshots BEGIN
    SELECT RAISE(ABORT, 'source snapshots are write-once');
END;

CREATE TRIGGER IF NOT EXISTS source_snapshots_no_delete BEFORE DELETE ON source_snapshots BEGIN
    SELECT RAISE(ABORT, 'source snapshots are write-once');
END;

CREATE TRIGGER IF NOT EXISTS nodes_no_update BEFORE UPDATE ON nodes BEGIN
    SELECT RAISE(ABORT, 'nodes are write-once');
END;

CREATE TRIGGER IF NOT EXISTS nodes_no_delete BEFORE DELETE ON nodes BEGIN
    SELECT RAISE(ABORT, 'nodes are write-once');
END;

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
