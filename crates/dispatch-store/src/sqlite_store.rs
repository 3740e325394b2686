//! SQLite-backed [`crate::IssueStore`] implementation.

use crate::error::{Result, StoreError};
use crate::filter::IssueFilter;
use crate::schema::SCHEMA;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_core::{
    DependencyEdge, DependencyKind, ExternalRef, Issue, IssueId, IssueStatus, IssueType, Mapping,
    RepoConfig, SyncStatus,
};
use crate::{IssueStore, WebhookErrorRecord};
use dispatch_dag::DagSnapshot;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

/// Issue Store backed by a SQLite connection pool.
#[derive(Clone)]
pub struct SqliteIssueStore {
    pool: SqlitePool,
}

impl SqliteIssueStore {
    /// Connect to `database_url` (e.g. `sqlite://dispatch.db` or
    /// `sqlite::memory:`) and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        tracing::info!(database_url, "issue store schema initialized");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl IssueStore for SqliteIssueStore {
    async fn create_issue(&self, issue: Issue) -> Result<Issue> {
        insert_issue(&self.pool, &issue).await?;
        tracing::debug!(issue_id = %issue.id, "issue created");
        Ok(issue)
    }

    async fn get_issue(&self, id: &IssueId) -> Result<Issue> {
        let row = sqlx::query("SELECT * FROM issues WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row_to_issue(&row),
            None => Err(StoreError::not_found("issue", id.as_str())),
        }
    }

    async fn update_issue(&self, mut issue: Issue) -> Result<Issue> {
        let existing = self.get_issue(&issue.id).await?;
        issue.updated_at = Utc::now();
        let rows = update_issue_row(&self.pool, &issue, existing.updated_at).await?;
        if rows == 0 {
            return Err(StoreError::Concurrency {
                resource: "issue".to_string(),
                id: issue.id.to_string(),
            });
        }
        Ok(issue)
    }

    async fn close_issue(&self, id: &IssueId) -> Result<Issue> {
        let mut issue = self.get_issue(id).await?;
        let now = Utc::now();
        issue.status = IssueStatus::Closed;
        issue.closed_at = Some(now);
        issue.updated_at = now;

        let snapshot = self.dag_snapshot().await?;
        let dag = dispatch_dag::DagEngine::new(&snapshot);
        let open_children: Vec<&str> = dag
            .unblocks(id)
            .into_iter()
            .map(|i| i.id.as_str())
            .collect();
        if !open_children.is_empty() {
            tracing::info!(issue_id = %id, ?open_children, "closing issue with open blocks-children");
        }

        sqlx::query(
            "UPDATE issues SET status = ?2, closed_at = ?3, updated_at = ?4 WHERE id = ?1",
        )
        .bind(id.as_str())
        .bind(status_to_str(issue.status))
        .bind(issue.closed_at.map(|t| t.to_rfc3339()))
        .bind(issue.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(issue)
    }

    async fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let rows = sqlx::query("SELECT * FROM issues")
            .fetch_all(&self.pool)
            .await?;
        let mut issues = rows
            .iter()
            .map(row_to_issue)
            .collect::<Result<Vec<_>>>()?;

        issues.retain(|issue| {
            filter.status.is_none_or(|s| issue.status == s)
                && filter
                    .assignee
                    .as_ref()
                    .is_none_or(|a| issue.assignee.as_deref() == Some(a.as_str()))
                && filter.issue_type.is_none_or(|t| issue.issue_type == t)
                && filter
                    .label
                    .as_ref()
                    .is_none_or(|l| issue.labels.iter().any(|x| x == l))
                && filter
                    .updated_since
                    .is_none_or(|since| issue.updated_at >= since)
        });

        issues.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(issues)
    }

    async fn add_dependency(&self, edge: DependencyEdge) -> Result<()> {
        if edge.kind == DependencyKind::Blocks {
            let existing = self.list_dependencies().await?;
            if dispatch_dag::would_create_cycle(&existing, &edge.from, &edge.to) {
                return Err(StoreError::CycleRejected {
                    from: edge.from.to_string(),
                    to: edge.to.to_string(),
                });
            }
        }
        sqlx::query(
            "INSERT OR IGNORE INTO dependencies (from_id, to_id, kind) VALUES (?1, ?2, ?3)",
        )
        .bind(edge.from.as_str())
        .bind(edge.to.as_str())
        .bind(kind_to_str(edge.kind))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_dependency(&self, edge: &DependencyEdge) -> Result<()> {
        sqlx::query("DELETE FROM dependencies WHERE from_id = ?1 AND to_id = ?2 AND kind = ?3")
            .bind(edge.from.as_str())
            .bind(edge.to.as_str())
            .bind(kind_to_str(edge.kind))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_dependencies(&self) -> Result<Vec<DependencyEdge>> {
        let rows = sqlx::query("SELECT from_id, to_id, kind FROM dependencies")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let from: String = row.try_get("from_id")?;
                let to: String = row.try_get("to_id")?;
                let kind: String = row.try_get("kind")?;
                Ok(DependencyEdge {
                    from: IssueId::from(from),
                    to: IssueId::from(to),
                    kind: str_to_kind(&kind),
                })
            })
            .collect()
    }

    async fn dag_snapshot(&self) -> Result<DagSnapshot> {
        let issues = self.list_issues(&IssueFilter::default()).await?;
        let edges = self.list_dependencies().await?;
        Ok(DagSnapshot::new(issues, edges))
    }

    async fn upsert_mapping(&self, mapping: Mapping) -> Result<()> {
        // A local id already bound to a different remote number, or a
        // remote number already bound to a different local id, within
        // the same scope, is a conflict rather than a silent rebind.
        if let Some(existing) = self
            .get_mapping_by_local(&mapping.owner, &mapping.repo, mapping.installation_id, &mapping.local_id)
            .await?
        {
            if existing.remote_number != mapping.remote_number {
                return Err(StoreError::MappingConflict {
                    message: format!(
                        "local {} already mapped to remote #{}, cannot rebind to #{}",
                        mapping.local_id, existing.remote_number, mapping.remote_number
                    ),
                });
            }
        }
        if let Some(existing) = self
            .get_mapping_by_remote(&mapping.owner, &mapping.repo, mapping.installation_id, mapping.remote_number)
            .await?
        {
            if existing.local_id != mapping.local_id {
                return Err(StoreError::MappingConflict {
                    message: format!(
                        "remote #{} already mapped to local {}, cannot rebind to {}",
                        mapping.remote_number, existing.local_id, mapping.local_id
                    ),
                });
            }
        }

        sqlx::query(
            r"
            INSERT INTO mappings (owner, repo, installation_id, local_id, remote_number, local_snapshot, remote_snapshot)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(owner, repo, installation_id, local_id) DO UPDATE SET
                remote_number = excluded.remote_number,
                local_snapshot = excluded.local_snapshot,
                remote_snapshot = excluded.remote_snapshot
            ",
        )
        .bind(&mapping.owner)
        .bind(&mapping.repo)
        .bind(mapping.installation_id)
        .bind(mapping.local_id.as_str())
        .bind(mapping.remote_number as i64)
        .bind(mapping.local_snapshot.to_rfc3339())
        .bind(mapping.remote_snapshot.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_mapping_by_local(
        &self,
        owner: &str,
        repo: &str,
        installation_id: i64,
        local_id: &IssueId,
    ) -> Result<Option<Mapping>> {
        let row = sqlx::query(
            "SELECT * FROM mappings WHERE owner = ?1 AND repo = ?2 AND installation_id = ?3 AND local_id = ?4",
        )
        .bind(owner)
        .bind(repo)
        .bind(installation_id)
        .bind(local_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_mapping(&r)).transpose()
    }

    async fn get_mapping_by_remote(
        &self,
        owner: &str,
        repo: &str,
        installation_id: i64,
        remote_number: u64,
    ) -> Result<Option<Mapping>> {
        let row = sqlx::query(
            "SELECT * FROM mappings WHERE owner = ?1 AND repo = ?2 AND installation_id = ?3 AND remote_number = ?4",
        )
        .bind(owner)
        .bind(repo)
        .bind(installation_id)
        .bind(remote_number as i64)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_mapping(&r)).transpose()
    }

    async fn list_mappings(&self, owner: &str, repo: &str, installation_id: i64) -> Result<Vec<Mapping>> {
        let rows = sqlx::query(
            "SELECT * FROM mappings WHERE owner = ?1 AND repo = ?2 AND installation_id = ?3",
        )
        .bind(owner)
        .bind(repo)
        .bind(installation_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_mapping).collect()
    }

    async fn list_repos(&self, sync_enabled_only: bool) -> Result<Vec<RepoConfig>> {
        let sql = if sync_enabled_only {
            "SELECT * FROM repos WHERE sync_enabled = 1"
        } else {
            "SELECT * FROM repos"
        };
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_repo).collect()
    }

    async fn upsert_repo(&self, repo: RepoConfig) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO repos (owner, repo, installation_id, sync_enabled, last_sync_at, sync_status, sync_error)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(owner, repo, installation_id) DO UPDATE SET
                sync_enabled = excluded.sync_enabled,
                last_sync_at = excluded.last_sync_at,
                sync_status = excluded.sync_status,
                sync_error = excluded.sync_error
            ",
        )
        .bind(&repo.owner)
        .bind(&repo.repo)
        .bind(repo.installation_id)
        .bind(repo.sync_enabled as i64)
        .bind(repo.last_sync_at.map(|t| t.to_rfc3339()))
        .bind(sync_status_to_str(repo.sync_status))
        .bind(&repo.sync_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn has_seen_webhook(&self, delivery_id: &str) -> Result<bool> {
        // Lazily sweep deliveries past the 30-day dedup TTL (Open
        // Question (3) in SPEC_FULL.md) before checking membership.
        let cutoff = (Utc::now() - chrono::Duration::days(30)).to_rfc3339();
        sqlx::query("DELETE FROM webhook_deliveries WHERE received_at < ?1")
            .bind(&cutoff)
            .execute(&self.pool)
            .await?;

        let row = sqlx::query("SELECT 1 FROM webhook_deliveries WHERE delivery_id = ?1")
            .bind(delivery_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn mark_webhook_seen(&self, delivery_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO webhook_deliveries (delivery_id, received_at) VALUES (?1, ?2)",
        )
        .bind(delivery_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_webhook_error(&self, delivery_id: &str, event_kind: &str, action: &str, message: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO webhook_errors (delivery_id, event_kind, action, message, recorded_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(delivery_id)
        .bind(event_kind)
        .bind(action)
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_webhook_errors(&self, limit: i64) -> Result<Vec<WebhookErrorRecord>> {
        let rows = sqlx::query(
            "SELECT delivery_id, event_kind, action, message, recorded_at FROM webhook_errors ORDER BY id DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let recorded_at: String = row.try_get("recorded_at")?;
                Ok(WebhookErrorRecord {
                    delivery_id: row.try_get("delivery_id")?,
                    event_kind: row.try_get("event_kind")?,
                    action: row.try_get("action")?,
                    message: row.try_get("message")?,
                    recorded_at: parse_ts(recorded_at)?,
                })
            })
            .collect()
    }
}

async fn insert_issue(pool: &SqlitePool, issue: &Issue) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO issues (
            id, title, description, labels_json, priority, issue_type, status,
            assignee, parent, created_at, updated_at, closed_at, last_synced_remote, external_ref_json
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ",
    )
    .bind(issue.id.as_str())
    .bind(&issue.title)
    .bind(&issue.description)
    .bind(serde_json::to_string(&issue.labels)?)
    .bind(issue.priority as i64)
    .bind(type_to_str(issue.issue_type))
    .bind(status_to_str(issue.status))
    .bind(&issue.assignee)
    .bind(issue.parent.as_ref().map(|p| p.to_string()))
    .bind(issue.created_at.to_rfc3339())
    .bind(issue.updated_at.to_rfc3339())
    .bind(issue.closed_at.map(|t| t.to_rfc3339()))
    .bind(issue.last_synced_remote.map(|t| t.to_rfc3339()))
    .bind(match &issue.external_ref {
        Some(r) => Some(serde_json::to_string(r)?),
        None => None,
    })
    .execute(pool)
    .await?;
    Ok(())
}

async fn update_issue_row(pool: &SqlitePool, issue: &Issue, expected_prior_updated_at: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        r"
        UPDATE issues SET
            title = ?2, description = ?3, labels_json = ?4, priority = ?5, issue_type = ?6,
            status = ?7, assignee = ?8, parent = ?9, updated_at = ?10, closed_at = ?11,
            last_synced_remote = ?12, external_ref_json = ?13
        WHERE id = ?1 AND updated_at = ?14
        ",
    )
    .bind(issue.id.as_str())
    .bind(&issue.title)
    .bind(&issue.description)
    .bind(serde_json::to_string(&issue.labels)?)
    .bind(issue.priority as i64)
    .bind(type_to_str(issue.issue_type))
    .bind(status_to_str(issue.status))
    .bind(&issue.assignee)
    .bind(issue.parent.as_ref().map(|p| p.to_string()))
    .bind(issue.updated_at.to_rfc3339())
    .bind(issue.closed_at.map(|t| t.to_rfc3339()))
    .bind(issue.last_synced_remote.map(|t| t.to_rfc3339()))
    .bind(match &issue.external_ref {
        Some(r) => Some(serde_json::to_string(r)?),
        None => None,
    })
    .bind(expected_prior_updated_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

fn row_to_issue(row: &sqlx::sqlite::SqliteRow) -> Result<Issue> {
    let labels_json: String = row.try_get("labels_json")?;
    let external_ref_json: Option<String> = row.try_get("external_ref_json")?;
    Ok(Issue {
        id: IssueId::from(row.try_get::<String, _>("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        labels: serde_json::from_str(&labels_json)?,
        priority: row.try_get::<i64, _>("priority")? as u8,
        issue_type: str_to_type(&row.try_get::<String, _>("issue_type")?),
        status: str_to_status(&row.try_get::<String, _>("status")?),
        assignee: row.try_get("assignee")?,
        parent: row.try_get::<Option<String>, _>("parent")?.map(IssueId::from),
        created_at: parse_ts(row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_ts(row.try_get::<String, _>("updated_at")?)?,
        closed_at: row
            .try_get::<Option<String>, _>("closed_at")?
            .map(parse_ts)
            .transpose()?,
        last_synced_remote: row
            .try_get::<Option<String>, _>("last_synced_remote")?
            .map(parse_ts)
            .transpose()?,
        external_ref: external_ref_json
            .map(|s| serde_json::from_str::<ExternalRef>(&s))
            .transpose()?,
    })
}

fn row_to_mapping(row: &sqlx::sqlite::SqliteRow) -> Result<Mapping> {
    Ok(Mapping {
        local_id: IssueId::from(row.try_get::<String, _>("local_id")?),
        owner: row.try_get("owner")?,
        repo: row.try_get("repo")?,
        installation_id: row.try_get("installation_id")?,
        remote_number: row.try_get::<i64, _>("remote_number")? as u64,
        local_snapshot: parse_ts(row.try_get::<String, _>("local_snapshot")?)?,
        remote_snapshot: parse_ts(row.try_get::<String, _>("remote_snapshot")?)?,
    })
}

fn row_to_repo(row: &sqlx::sqlite::SqliteRow) -> Result<RepoConfig> {
    Ok(RepoConfig {
        owner: row.try_get("owner")?,
        repo: row.try_get("repo")?,
        installation_id: row.try_get("installation_id")?,
        sync_enabled: row.try_get::<i64, _>("sync_enabled")? != 0,
        last_sync_at: row
            .try_get::<Option<String>, _>("last_sync_at")?
            .map(parse_ts)
            .transpose()?,
        sync_status: str_to_sync_status(&row.try_get::<String, _>("sync_status")?),
        sync_error: row.try_get("sync_error")?,
    })
}

fn parse_ts(s: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))
}

fn type_to_str(t: IssueType) -> &'static str {
    match t {
        IssueType::Bug => "bug",
        IssueType::Feature => "feature",
        IssueType::Task => "task",
        IssueType::Epic => "epic",
        IssueType::Chore => "chore",
    }
}

fn str_to_type(s: &str) -> IssueType {
    match s {
        "bug" => IssueType::Bug,
        "feature" => IssueType::Feature,
        "epic" => IssueType::Epic,
        "chore" => IssueType::Chore,
        _ => IssueType::Task,
    }
}

fn status_to_str(s: IssueStatus) -> &'static str {
    match s {
        IssueStatus::Open => "open",
        IssueStatus::InProgress => "in_progress",
        IssueStatus::Blocked => "blocked",
        IssueStatus::Closed => "closed",
    }
}

fn str_to_status(s: &str) -> IssueStatus {
    match s {
        "in_progress" => IssueStatus::InProgress,
        "blocked" => IssueStatus::Blocked,
        "closed" => IssueStatus::Closed,
        _ => IssueStatus::Open,
    }
}

fn kind_to_str(k: DependencyKind) -> &'static str {
    match k {
        DependencyKind::Blocks => "blocks",
        DependencyKind::Related => "related",
        DependencyKind::Parent => "parent",
        DependencyKind::Discovers => "discovers",
    }
}

fn str_to_kind(s: &str) -> DependencyKind {
    match s {
        "related" => DependencyKind::Related,
        "parent" => DependencyKind::Parent,
        "discovers" => DependencyKind::Discovers,
        _ => DependencyKind::Blocks,
    }
}

fn sync_status_to_str(s: SyncStatus) -> &'static str {
    match s {
        SyncStatus::Never => "never",
        SyncStatus::Ok => "ok",
        SyncStatus::Error => "error",
    }
}

fn str_to_sync_status(s: &str) -> SyncStatus {
    match s {
        "ok" => SyncStatus::Ok,
        "error" => SyncStatus::Error,
        _ => SyncStatus::Never,
    }
}
