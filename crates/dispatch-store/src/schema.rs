//! SQLite schema for the Issue Store.

/// DDL applied once at pool construction. `IF NOT EXISTS` everywhere so
/// opening an already-initialized database file is a no-op.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS issues (
    id                  TEXT PRIMARY KEY NOT NULL,
    title               TEXT NOT NULL,
    description         TEXT NOT NULL,
    labels_json         TEXT NOT NULL,
    priority            INTEGER NOT NULL,
    issue_type          TEXT NOT NULL,
    status              TEXT NOT NULL,
    assignee            TEXT,
    parent              TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    closed_at           TEXT,
    last_synced_remote  TEXT,
    external_ref_json   TEXT
);

CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);
CREATE INDEX IF NOT EXISTS idx_issues_assignee ON issues(assignee);
CREATE INDEX IF NOT EXISTS idx_issues_updated_at ON issues(updated_at);

CREATE TABLE IF NOT EXISTS dependencies (
    from_id TEXT NOT NULL,
    to_id   TEXT NOT NULL,
    kind    TEXT NOT NULL,
    PRIMARY KEY (from_id, to_id, kind)
);

CREATE TABLE IF NOT EXISTS mappings (
    owner            TEXT NOT NULL,
    repo             TEXT NOT NULL,
    installation_id  INTEGER NOT NULL,
    local_id         TEXT NOT NULL,
    remote_number    INTEGER NOT NULL,
    local_snapshot   TEXT NOT NULL,
    remote_snapshot  TEXT NOT NULL,
    PRIMARY KEY (owner, repo, installation_id, local_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_mappings_remote
    ON mappings(owner, repo, installation_id, remote_number);

CREATE TABLE IF NOT EXISTS repos (
    owner           TEXT NOT NULL,
    repo            TEXT NOT NULL,
    installation_id INTEGER NOT NULL,
    sync_enabled    INTEGER NOT NULL,
    last_sync_at    TEXT,
    sync_status     TEXT NOT NULL,
    sync_error      TEXT,
    PRIMARY KEY (owner, repo, installation_id)
);

CREATE TABLE IF NOT EXISTS webhook_deliveries (
    delivery_id  TEXT PRIMARY KEY NOT NULL,
    received_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS webhook_errors (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    delivery_id  TEXT NOT NULL,
    event_kind   TEXT NOT NULL,
    action       TEXT NOT NULL,
    message      TEXT NOT NULL,
    recorded_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_webhook_errors_delivery ON webhook_errors(delivery_id);
"#;
