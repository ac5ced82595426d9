//! SQLite-dialect schema for the libSQL backend.
//!
//! Mirrors `migrations/V1__allocator_schema.sql` with these translations:
//! - `UUID` -> `TEXT` (hyphenated string)
//! - `TIMESTAMPTZ` -> `TEXT` (RFC 3339, fixed microsecond precision and `Z`
//!   suffix so lexical order matches time order)
//! - `BOOLEAN` -> `INTEGER` (0/1)
//!
//! Idempotent via `IF NOT EXISTS`.

pub const SCHEMA: &str = r#"

CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active'
        CHECK (status IN ('active', 'inactive')),
    is_available INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    last_assignment_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_agents_available
    ON agents (status, is_available, created_at, id);

CREATE TABLE IF NOT EXISTS work_items (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL DEFAULT 'unassigned'
        CHECK (status IN ('unassigned', 'pending', 'assigned', 'failed')),
    assigned_agent_id TEXT REFERENCES agents(id),
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_work_items_status ON work_items (status);

CREATE TABLE IF NOT EXISTS session_records (
    id TEXT PRIMARY KEY,
    work_item_id TEXT NOT NULL REFERENCES work_items(id),
    agent_id TEXT NOT NULL REFERENCES agents(id),
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending')),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_session_records_work_item ON session_records (work_item_id);
CREATE INDEX IF NOT EXISTS idx_session_records_agent ON session_records (agent_id);

INSERT OR IGNORE INTO _migrations (version, name) VALUES (1, 'allocator_schema');
"#;
