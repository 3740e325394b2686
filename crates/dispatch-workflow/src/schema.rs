//! SQLite schema for workflow instances, step records and delivered events.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS workflow_instances (
    id                      TEXT PRIMARY KEY NOT NULL,
    name                    TEXT NOT NULL,
    status                  TEXT NOT NULL,
    param_blob              TEXT NOT NULL,
    created_at              TEXT NOT NULL,
    updated_at               TEXT NOT NULL,
    pending_event_name      TEXT,
    pending_event_deadline  TEXT,
    failure_reason          TEXT
);

CREATE INDEX IF NOT EXISTS idx_workflow_instances_status ON workflow_instances(status);

CREATE TABLE IF NOT EXISTS step_records (
    instance_id   TEXT NOT NULL,
    step_name     TEXT NOT NULL,
    result_blob   TEXT NOT NULL,
    completed_at  TEXT NOT NULL,
    PRIMARY KEY (instance_id, step_name)
);

CREATE TABLE IF NOT EXISTS workflow_events (
    instance_id   TEXT NOT NULL,
    event_name    TEXT NOT NULL,
    payload       TEXT NOT NULL,
    delivered_at  TEXT NOT NULL,
    PRIMARY KEY (instance_id, event_name)
);
"#;
