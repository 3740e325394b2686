use dispatch_core::{DependencyEdge, DependencyKind, Issue, IssueId, IssueStatus, Mapping, RepoConfig, SyncStatus};
use dispatch_store::{IssueFilter, IssueStore, SqliteIssueStore, StoreError};

async fn store() -> SqliteIssueStore {
    SqliteIssueStore::connect("sqlite::memory:")
        .await
        .expect("in-memory store connects")
}

#[tokio::test]
async fn create_and_get_round_trips() {
    let store = store().await;
    let issue = Issue::new("L1", "Fix login bug");
    store.create_issue(issue.clone()).await.unwrap();

    let fetched = store.get_issue(&IssueId::from("L1")).await.unwrap();
    assert_eq!(fetched.title, "Fix login bug");
    assert_eq!(fetched.status, IssueStatus::Open);
}

#[tokio::test]
async fn get_issue_missing_is_not_found() {
    let store = store().await;
    let err = store.get_issue(&IssueId::from("nope")).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn update_issue_bumps_updated_at_and_rejects_stale_write() {
    let store = store().await;
    let issue = Issue::new("L1", "Fix login bug");
    store.create_issue(issue.clone()).await.unwrap();

    let mut fetched = store.get_issue(&IssueId::from("L1")).await.unwrap();
    fetched.title = "Fix login bug properly".to_string();
    let updated = store.update_issue(fetched.clone()).await.unwrap();
    assert_eq!(updated.title, "Fix login bug properly");
    assert!(updated.updated_at >= fetched.updated_at);

    // `fetched` now carries a stale `updated_at`; replaying the same write
    // must lose the optimistic-concurrency race.
    let err = store.update_issue(fetched).await.unwrap_err();
    assert!(matches!(err, StoreError::Concurrency { .. }));
}

#[tokio::test]
async fn add_dependency_rejects_cycle() {
    let store = store().await;
    store.create_issue(Issue::new("A", "A")).await.unwrap();
    store.create_issue(Issue::new("B", "B")).await.unwrap();

    store
        .add_dependency(DependencyEdge {
            from: IssueId::from("A"),
            to: IssueId::from("B"),
            kind: DependencyKind::Blocks,
        })
        .await
        .unwrap();

    let err = store
        .add_dependency(DependencyEdge {
            from: IssueId::from("B"),
            to: IssueId::from("A"),
            kind: DependencyKind::Blocks,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::CycleRejected { .. }));
}

#[tokio::test]
async fn dag_snapshot_reflects_ready_state() {
    let store = store().await;
    store.create_issue(Issue::new("A", "A")).await.unwrap();
    store.create_issue(Issue::new("B", "B")).await.unwrap();
    store
        .add_dependency(DependencyEdge {
            from: IssueId::from("B"),
            to: IssueId::from("A"),
            kind: DependencyKind::Blocks,
        })
        .await
        .unwrap();

    let snapshot = store.dag_snapshot().await.unwrap();
    let dag = dispatch_dag::DagEngine::new(&snapshot);
    let ready: Vec<&str> = dag.ready().iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ready, vec!["A"]);
}

#[tokio::test]
async fn list_issues_filters_and_orders_by_priority_then_created_at() {
    let store = store().await;
    let mut low = Issue::new("L1", "low priority");
    low.priority = 3;
    let mut high = Issue::new("L2", "high priority");
    high.priority = 0;
    store.create_issue(low).await.unwrap();
    store.create_issue(high).await.unwrap();

    let all = store.list_issues(&IssueFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id.as_str(), "L2");
    assert_eq!(all[1].id.as_str(), "L1");
}

#[tokio::test]
async fn upsert_mapping_then_lookup_both_directions() {
    let store = store().await;
    store.create_issue(Issue::new("L1", "L1")).await.unwrap();
    let mapping = Mapping {
        local_id: IssueId::from("L1"),
        owner: "acme".to_string(),
        repo: "widgets".to_string(),
        installation_id: 42,
        remote_number: 7,
        local_snapshot: chrono::Utc::now(),
        remote_snapshot: chrono::Utc::now(),
    };
    store.upsert_mapping(mapping.clone()).await.unwrap();

    let by_local = store
        .get_mapping_by_local("acme", "widgets", 42, &IssueId::from("L1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_local.remote_number, 7);

    let by_remote = store
        .get_mapping_by_remote("acme", "widgets", 42, 7)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_remote.local_id, IssueId::from("L1"));
}

#[tokio::test]
async fn upsert_mapping_rejects_conflicting_rebind() {
    let store = store().await;
    store.create_issue(Issue::new("L1", "L1")).await.unwrap();
    store.create_issue(Issue::new("L2", "L2")).await.unwrap();

    let mapping = Mapping {
        local_id: IssueId::from("L1"),
        owner: "acme".to_string(),
        repo: "widgets".to_string(),
        installation_id: 42,
        remote_number: 7,
        local_snapshot: chrono::Utc::now(),
        remote_snapshot: chrono::Utc::now(),
    };
    store.upsert_mapping(mapping).await.unwrap();

    let conflicting = Mapping {
        local_id: IssueId::from("L2"),
        owner: "acme".to_string(),
        repo: "widgets".to_string(),
        installation_id: 42,
        remote_number: 7,
        local_snapshot: chrono::Utc::now(),
        remote_snapshot: chrono::Utc::now(),
    };
    let err = store.upsert_mapping(conflicting).await.unwrap_err();
    assert!(matches!(err, StoreError::MappingConflict { .. }));
}

#[tokio::test]
async fn webhook_dedup_rejects_replayed_delivery() {
    let store = store().await;
    assert!(!store.has_seen_webhook("delivery-1").await.unwrap());
    store.mark_webhook_seen("delivery-1").await.unwrap();
    assert!(store.has_seen_webhook("delivery-1").await.unwrap());
    assert!(!store.has_seen_webhook("delivery-2").await.unwrap());
}

#[tokio::test]
async fn webhook_errors_are_recorded_and_listed() {
    let store = store().await;
    store.record_webhook_error("delivery-3", "issues", "edited", "concurrency conflict").await.unwrap();
    let errors = store.list_webhook_errors(10).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].delivery_id, "delivery-3");
    assert_eq!(errors[0].action, "edited");
}

#[tokio::test]
async fn repo_upsert_and_list_enabled_only() {
    let store = store().await;
    store
        .upsert_repo(RepoConfig {
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            installation_id: 1,
            sync_enabled: true,
            last_sync_at: None,
            sync_status: SyncStatus::Never,
            sync_error: None,
        })
        .await
        .unwrap();
    store
        .upsert_repo(RepoConfig {
            owner: "acme".to_string(),
            repo: "gadgets".to_string(),
            installation_id: 1,
            sync_enabled: false,
            last_sync_at: None,
            sync_status: SyncStatus::Never,
            sync_error: None,
        })
        .await
        .unwrap();

    let enabled = store.list_repos(true).await.unwrap();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].repo, "widgets");

    let all = store.list_repos(false).await.unwrap();
    assert_eq!(all.len(), 2);
}
