use async_trait::async_trait;
use dispatch_agents::{AgentCapability, AgentRegistration, AutonomyLevel, ModelCost};
use dispatch_core::{Issue, IssueId};
use dispatch_orchestrator::{AssignmentOrchestrator, DevelopmentTrigger, WorkflowDispatcher};
use dispatch_store::{IssueStore, SqliteIssueStore};
use std::sync::Mutex;

struct RecordingDispatcher {
    dispatched: Mutex<Vec<(String, DevelopmentTrigger)>>,
    terminated: Mutex<Vec<String>>,
}

impl RecordingDispatcher {
    fn new() -> Self {
        Self { dispatched: Mutex::new(Vec::new()), terminated: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl WorkflowDispatcher for RecordingDispatcher {
    async fn terminate(&self, instance_id: &str) -> dispatch_orchestrator::Result<()> {
        self.terminated.lock().unwrap().push(instance_id.to_string());
        Ok(())
    }
    fn dispatch(&self, instance_id: String, trigger: DevelopmentTrigger) {
        self.dispatched.lock().unwrap().push((instance_id, trigger));
    }
}

fn agent(id: &str, model_cost: ModelCost) -> AgentRegistration {
    AgentRegistration {
        id: id.to_string(),
        display_name: id.to_string(),
        description: String::new(),
        capabilities: vec![AgentCapability::new("task", ["*"])],
        focus: Vec::new(),
        autonomy: AutonomyLevel::Full,
        model_cost,
    }
}

async fn store() -> SqliteIssueStore {
    SqliteIssueStore::connect("sqlite::memory:").await.unwrap()
}

#[tokio::test]
async fn assigns_ready_unassigned_issue_to_best_agent() {
    let store = store().await;
    store.create_issue(Issue::new(IssueId::new("iss-1"), "Add retry logic")).await.unwrap();

    let registry = vec![agent("agent-cheap", ModelCost::Cheap), agent("agent-best", ModelCost::Best)];
    let dispatcher = RecordingDispatcher::new();
    let orchestrator = AssignmentOrchestrator::new();

    let assignments = orchestrator
        .assign_ready_issues(&store, &registry, &dispatcher, "acme", "widgets", 7)
        .await
        .unwrap();

    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].agent_id, "agent-cheap");
    assert_eq!(assignments[0].issue.assignee.as_deref(), Some("agent-cheap"));

    let updated = store.get_issue(&IssueId::new("iss-1")).await.unwrap();
    assert_eq!(updated.assignee.as_deref(), Some("agent-cheap"));

    let dispatched = dispatcher.dispatched.lock().unwrap();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].1.agent_id, "agent-cheap");
    assert_eq!(dispatched[0].1.issue_id, IssueId::new("iss-1"));
}

#[tokio::test]
async fn already_assigned_issues_are_skipped() {
    let store = store().await;
    let mut issue = Issue::new(IssueId::new("iss-2"), "Add pagination");
    issue.assignee = Some("agent-cheap".to_string());
    store.create_issue(issue).await.unwrap();

    let registry = vec![agent("agent-cheap", ModelCost::Cheap)];
    let dispatcher = RecordingDispatcher::new();
    let orchestrator = AssignmentOrchestrator::new();

    let assignments = orchestrator
        .assign_ready_issues(&store, &registry, &dispatcher, "acme", "widgets", 7)
        .await
        .unwrap();

    assert!(assignments.is_empty());
    assert!(dispatcher.dispatched.lock().unwrap().is_empty());
}

#[tokio::test]
async fn blocked_issues_are_not_assigned() {
    let store = store().await;
    let blocker = store.create_issue(Issue::new(IssueId::new("iss-3"), "Design the schema")).await.unwrap();
    let blocked = store.create_issue(Issue::new(IssueId::new("iss-4"), "Implement the schema")).await.unwrap();
    store
        .add_dependency(dispatch_core::DependencyEdge {
            from: blocked.id.clone(),
            to: blocker.id.clone(),
            kind: dispatch_core::DependencyKind::Blocks,
        })
        .await
        .unwrap();

    let registry = vec![agent("agent-cheap", ModelCost::Cheap)];
    let dispatcher = RecordingDispatcher::new();
    let orchestrator = AssignmentOrchestrator::new();

    let assignments = orchestrator
        .assign_ready_issues(&store, &registry, &dispatcher, "acme", "widgets", 7)
        .await
        .unwrap();

    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].issue.id, blocker.id);
}

#[tokio::test]
async fn reassignment_to_a_different_agent_terminates_the_stale_instance() {
    let store = store().await;
    store.create_issue(Issue::new(IssueId::new("iss-5"), "Add retry logic")).await.unwrap();

    let dispatcher = RecordingDispatcher::new();
    let orchestrator = AssignmentOrchestrator::new();

    let first_registry = vec![agent("agent-a", ModelCost::Cheap)];
    orchestrator.assign_ready_issues(&store, &first_registry, &dispatcher, "acme", "widgets", 7).await.unwrap();
    assert!(dispatcher.terminated.lock().unwrap().is_empty());

    // Clear the assignee so the issue is ready again, then match it to a
    // different agent — the orchestrator should terminate the first
    // instance before dispatching the second.
    let mut issue = store.get_issue(&IssueId::new("iss-5")).await.unwrap();
    issue.assignee = None;
    store.update_issue(issue).await.unwrap();

    let second_registry = vec![agent("agent-b", ModelCost::Cheap)];
    orchestrator.assign_ready_issues(&store, &second_registry, &dispatcher, "acme", "widgets", 7).await.unwrap();

    assert_eq!(dispatcher.terminated.lock().unwrap().len(), 1);
    let dispatched = dispatcher.dispatched.lock().unwrap();
    assert_eq!(dispatched.len(), 2);
    assert_eq!(dispatched[1].1.agent_id, "agent-b");
}
