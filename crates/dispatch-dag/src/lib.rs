//! DAG Engine — pure, read-only queries over a point-in-time snapshot of
//! the issue dependency graph.
//!
//! Every query here operates on a `DagSnapshot` the caller fetches from
//! the Issue Store immediately before querying; the engine itself holds
//! no state and performs no I/O, so results are always consistent with
//! whatever snapshot was handed in (spec.md §4.B: "concurrent with
//! writes they reflect a consistent point-in-time snapshot").

use dispatch_core::{DependencyEdge, DependencyKind, Issue, IssueId, IssueStatus};
use std::collections::{HashMap, HashSet};

/// A consistent, read-only view of issues and their dependency edges.
#[derive(Debug, Clone, Default)]
pub struct DagSnapshot {
    pub issues: Vec<Issue>,
    pub edges: Vec<DependencyEdge>,
}

impl DagSnapshot {
    pub fn new(issues: Vec<Issue>, edges: Vec<DependencyEdge>) -> Self {
        Self { issues, edges }
    }

    fn issue(&self, id: &IssueId) -> Option<&Issue> {
        self.issues.iter().find(|i| &i.id == id)
    }

    /// Direct `blocks`-parents of `id`: edges `(id -> parent, Blocks)`.
    fn blocks_parents<'a>(&'a self, id: &'a IssueId) -> impl Iterator<Item = &'a IssueId> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.kind == DependencyKind::Blocks && &e.from == id)
            .map(|e| &e.to)
    }

    /// Direct `blocks`-children of `id`: edges `(child -> id, Blocks)`.
    fn blocks_children<'a>(&'a self, id: &'a IssueId) -> impl Iterator<Item = &'a IssueId> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.kind == DependencyKind::Blocks && &e.to == id)
            .map(|e| &e.from)
    }

    fn is_open_blocker(&self, blocker_id: &IssueId) -> bool {
        self.issue(blocker_id)
            .map(|i| i.status != IssueStatus::Closed)
            .unwrap_or(false)
    }
}

/// The DAG Engine: ready/blocked/critical-path queries over a snapshot.
pub struct DagEngine<'a> {
    snapshot: &'a DagSnapshot,
}

impl<'a> DagEngine<'a> {
    pub fn new(snapshot: &'a DagSnapshot) -> Self {
        Self { snapshot }
    }

    /// Issues that are `open` and have no open `blocks`-parent.
    pub fn ready(&self) -> Vec<&'a Issue> {
        self.snapshot
            .issues
            .iter()
            .filter(|issue| {
                issue.status == IssueStatus::Open
                    && !self
                        .snapshot
                        .blocks_parents(&issue.id)
                        .any(|p| self.snapshot.is_open_blocker(p))
            })
            .collect()
    }

    /// `open` issues blocked by an open `blocks`-parent, plus issues whose
    /// stored status is explicitly `blocked`.
    pub fn blocked(&self) -> Vec<&'a Issue> {
        self.snapshot
            .issues
            .iter()
            .filter(|issue| {
                (issue.status == IssueStatus::Open
                    && self
                        .snapshot
                        .blocks_parents(&issue.id)
                        .any(|p| self.snapshot.is_open_blocker(p)))
                    || issue.status == IssueStatus::Blocked
            })
            .collect()
    }

    /// Direct open `blocks`-parents of `id`.
    pub fn blocked_by(&self, id: &IssueId) -> Vec<&'a Issue> {
        self.snapshot
            .blocks_parents(id)
            .filter(|p| self.snapshot.is_open_blocker(p))
            .filter_map(|p| self.snapshot.issue(p))
            .collect()
    }

    /// `blocks`-children of `id` that would become ready if `id` closed
    /// right now (i.e. `id` is their only remaining open blocker).
    pub fn unblocks(&self, id: &IssueId) -> Vec<&'a Issue> {
        self.snapshot
            .blocks_children(id)
            .filter_map(|child_id| self.snapshot.issue(child_id))
            .filter(|child| {
                self.snapshot
                    .blocks_parents(&child.id)
                    .filter(|p| *p != id)
                    .all(|p| !self.snapshot.is_open_blocker(p))
            })
            .collect()
    }

    /// Longest path through the open `blocks`-subgraph, one node weighs 1.
    /// Ties between equally-long paths through a node are broken by lower
    /// numeric priority, then earlier `created_at`. Returned source-first
    /// in topological order.
    pub fn critical_path(&self) -> Vec<&'a Issue> {
        let open_nodes: Vec<&Issue> = self
            .snapshot
            .issues
            .iter()
            .filter(|i| i.status != IssueStatus::Closed)
            .collect();
        let node_ids: HashSet<&IssueId> = open_nodes.iter().map(|i| &i.id).collect();

        // edges restricted to open nodes: child -> parent (child depends on parent)
        let mut children_of: HashMap<&IssueId, Vec<&IssueId>> = HashMap::new();
        for e in &self.snapshot.edges {
            if e.kind == DependencyKind::Blocks && node_ids.contains(&e.from) && node_ids.contains(&e.to) {
                children_of.entry(&e.to).or_default().push(&e.from);
            }
        }

        // longest_from[id] = length of the longest chain starting at id (id included)
        let mut memo: HashMap<&IssueId, usize> = HashMap::new();
        let mut stack: Vec<&IssueId> = Vec::new();
        for issue in &open_nodes {
            longest_from(&issue.id, &children_of, &mut memo, &mut stack);
        }

        let mut ordered: Vec<&Issue> = open_nodes;
        ordered.sort_by(|a, b| {
            memo.get(&b.id)
                .unwrap_or(&0)
                .cmp(memo.get(&a.id).unwrap_or(&0))
                .then(a.priority.cmp(&b.priority))
                .then(a.created_at.cmp(&b.created_at))
        });

        // The critical path itself: greedily walk from the longest root
        // following whichever child extends the chain by exactly one.
        let Some(source) = ordered.first() else {
            return Vec::new();
        };
        let mut path = vec![*source];
        let mut current = source.id.clone();
        loop {
            let remaining = memo.get(&current).copied().unwrap_or(1);
            if remaining <= 1 {
                break;
            }
            let next = children_of
                .get(&current)
                .into_iter()
                .flatten()
                .filter(|c| memo.get(**c).copied().unwrap_or(0) + 1 == remaining)
                .min_by(|a, b| {
                    let ia = self.snapshot.issue(a).unwrap();
                    let ib = self.snapshot.issue(b).unwrap();
                    ia.priority
                        .cmp(&ib.priority)
                        .then(ia.created_at.cmp(&ib.created_at))
                });
            match next {
                Some(next_id) => {
                    current = (*next_id).clone();
                    path.push(self.snapshot.issue(&current).unwrap());
                }
                None => break,
            }
        }
        path
    }
}

fn longest_from<'a>(
    id: &'a IssueId,
    children_of: &HashMap<&'a IssueId, Vec<&'a IssueId>>,
    memo: &mut HashMap<&'a IssueId, usize>,
    stack: &mut Vec<&'a IssueId>,
) -> usize {
    if let Some(&v) = memo.get(id) {
        return v;
    }
    // cycles are rejected at write time; guard anyway to keep this total.
    if stack.contains(&id) {
        return 1;
    }
    stack.push(id);
    let best = children_of
        .get(id)
        .into_iter()
        .flatten()
        .map(|child| longest_from(child, children_of, memo, stack))
        .max()
        .unwrap_or(0);
    stack.pop();
    let value = best + 1;
    memo.insert(id, value);
    value
}

/// Would inserting `blocks`-edge `from -> to` create a cycle in the
/// existing `blocks`-subgraph? Used by the Issue Store before persisting
/// a new dependency edge (spec.md §3 invariant).
pub fn would_create_cycle(edges: &[DependencyEdge], from: &IssueId, to: &IssueId) -> bool {
    if from == to {
        return true;
    }
    // A cycle exists iff `to` can already reach `from` via existing
    // blocks-edges, i.e. there is a path to -> ... -> from.
    let mut frontier = vec![to.clone()];
    let mut visited = HashSet::new();
    while let Some(node) = frontier.pop() {
        if &node == from {
            return true;
        }
        if !visited.insert(node.clone()) {
            continue;
        }
        for e in edges {
            if e.kind == DependencyKind::Blocks && e.from == node {
                frontier.push(e.to.clone());
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use dispatch_core::{Issue, IssueStatus};

    fn issue(id: &str, priority: u8, status: IssueStatus, offset_secs: i64) -> Issue {
        let mut issue = Issue::new(id, id);
        issue.priority = priority;
        issue.status = status;
        issue.created_at = Utc::now() + Duration::seconds(offset_secs);
        issue
    }

    fn edge(from: &str, to: &str) -> DependencyEdge {
        DependencyEdge {
            from: IssueId::from(from),
            to: IssueId::from(to),
            kind: DependencyKind::Blocks,
        }
    }

    #[test]
    fn ready_returns_unblocked_open_issues() {
        let a = issue("A", 0, IssueStatus::Open, 0);
        let b = issue("B", 1, IssueStatus::Open, 1);
        let c = issue("C", 2, IssueStatus::Closed, 2);
        let snapshot = DagSnapshot::new(vec![a, b, c], vec![edge("B", "A")]);
        let dag = DagEngine::new(&snapshot);
        let ready: Vec<&str> = dag.ready().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ready, vec!["A"]);
    }

    #[test]
    fn closing_blocker_unblocks_dependent() {
        let mut a = issue("A", 0, IssueStatus::Open, 0);
        let b = issue("B", 1, IssueStatus::Open, 1);
        let snapshot_before = DagSnapshot::new(vec![a.clone(), b.clone()], vec![edge("B", "A")]);
        assert!(DagEngine::new(&snapshot_before).blocked_by(&IssueId::from("B")).len() == 1);

        a.status = IssueStatus::Closed;
        let snapshot_after = DagSnapshot::new(vec![a, b], vec![edge("B", "A")]);
        let dag = DagEngine::new(&snapshot_after);
        let ready: Vec<&str> = dag.ready().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ready, vec!["B"]);
    }

    #[test]
    fn unblocks_reports_children_with_no_other_open_blocker() {
        let a = issue("A", 0, IssueStatus::Open, 0);
        let b = issue("B", 1, IssueStatus::Open, 1);
        let c = issue("C", 2, IssueStatus::Open, 2);
        // B depends on both A and C; closing A alone does not unblock B.
        let snapshot = DagSnapshot::new(vec![a, b, c], vec![edge("B", "A"), edge("B", "C")]);
        let dag = DagEngine::new(&snapshot);
        assert!(dag.unblocks(&IssueId::from("A")).is_empty());
    }

    #[test]
    fn cycle_detection_rejects_closing_edge() {
        let edges = vec![edge("A", "B"), edge("B", "C")];
        assert!(would_create_cycle(&edges, &IssueId::from("C"), &IssueId::from("A")));
        assert!(!would_create_cycle(&edges, &IssueId::from("C"), &IssueId::from("D")));
    }

    #[test]
    fn critical_path_is_topological_source_first() {
        let a = issue("A", 0, IssueStatus::Open, 0);
        let b = issue("B", 1, IssueStatus::Open, 1);
        let c = issue("C", 1, IssueStatus::Open, 2);
        // C depends on B depends on A: A -> B -> C longest chain.
        let snapshot = DagSnapshot::new(vec![a, b, c], vec![edge("B", "A"), edge("C", "B")]);
        let dag = DagEngine::new(&snapshot);
        let path: Vec<&str> = dag.critical_path().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(path, vec!["A", "B", "C"]);
    }
}
