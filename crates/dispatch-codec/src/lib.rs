//! Convention Codec — a bidirectional mapping between the typed `Issue`
//! and the untyped remote representation `(title, body, labels, state,
//! assignees)` the remote tracker actually stores.
//!
//! All conventions (type map, priority map, in-progress label, relation
//! patterns, separator) live in `dispatch_core::config::Conventions` and
//! are passed in by the caller; this crate is pure and holds no config
//! defaults of its own.

use dispatch_core::config::Conventions;
use dispatch_core::{Issue, IssueStatus, IssueType};
use regex::Regex;

/// The three relation kinds the codec round-trips through issue bodies.
/// Values are already-resolved reference strings: a remote number where
/// the Sync Engine knows one, the raw local id otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relations {
    pub depends_on: Vec<String>,
    pub blocks: Vec<String>,
    pub parent: Option<String>,
}

impl Relations {
    pub fn is_empty(&self) -> bool {
        self.depends_on.is_empty() && self.blocks.is_empty() && self.parent.is_none()
    }
}

/// Remote tracker state, as opposed to Dispatch's four-way `IssueStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    Open,
    Closed,
}

/// The untyped payload shape the remote tracker actually exposes.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePayload {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub state: RemoteState,
    pub assignees: Vec<String>,
}

/// Fields decoded back out of a `RemotePayload`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFields {
    pub issue_type: IssueType,
    pub priority: u8,
    pub status: IssueStatus,
    pub labels: Vec<String>,
    pub relations: Relations,
    pub description: String,
}

/// Encode a typed `Issue` plus its already-resolved relations into the
/// remote tracker's untyped payload shape.
pub fn encode(issue: &Issue, relations: &Relations, conventions: &Conventions) -> RemotePayload {
    let mut labels = Vec::new();
    push_unique(&mut labels, type_label(issue.issue_type, conventions));
    if let Some(label) = conventions.priority_map.label_for(issue.priority) {
        push_unique(&mut labels, label.to_string());
    }
    if issue.status == IssueStatus::InProgress {
        push_unique(&mut labels, conventions.in_progress_label.clone());
    }
    for label in &issue.labels {
        push_unique(&mut labels, label.clone());
    }

    let state = if issue.status == IssueStatus::Closed {
        RemoteState::Closed
    } else {
        RemoteState::Open
    };

    let assignees = issue.assignee.clone().into_iter().collect();

    let mut body = issue.description.clone();
    if !relations.is_empty() {
        body.push_str("\n\n");
        body.push_str(&conventions.separator);
        if !relations.depends_on.is_empty() {
            body.push('\n');
            body.push_str(&format!(
                "Depends on: {}",
                join_refs(&relations.depends_on)
            ));
        }
        if !relations.blocks.is_empty() {
            body.push('\n');
            body.push_str(&format!("Blocks: {}", join_refs(&relations.blocks)));
        }
        if let Some(parent) = &relations.parent {
            body.push('\n');
            body.push_str(&format!("Parent: #{parent}"));
        }
    }

    RemotePayload {
        title: issue.title.clone(),
        body,
        labels,
        state,
        assignees,
    }
}

fn join_refs(refs: &[String]) -> String {
    refs.iter()
        .map(|r| format!("#{r}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn push_unique(labels: &mut Vec<String>, label: String) {
    if !labels.contains(&label) {
        labels.push(label);
    }
}

fn type_label(issue_type: IssueType, conventions: &Conventions) -> String {
    match issue_type {
        IssueType::Bug => conventions.type_map.bug.clone(),
        IssueType::Feature => conventions.type_map.feature.clone(),
        IssueType::Task => conventions.type_map.task.clone(),
        IssueType::Epic => conventions.type_map.epic.clone(),
        IssueType::Chore => conventions.type_map.chore.clone(),
    }
}

fn label_to_type(label: &str, conventions: &Conventions) -> Option<IssueType> {
    let m = &conventions.type_map;
    if label == m.bug {
        Some(IssueType::Bug)
    } else if label == m.feature {
        Some(IssueType::Feature)
    } else if label == m.task {
        Some(IssueType::Task)
    } else if label == m.epic {
        Some(IssueType::Epic)
    } else if label == m.chore {
        Some(IssueType::Chore)
    } else {
        None
    }
}

/// Decode a remote payload back into typed Issue fields.
///
/// Label matching is case-sensitive; empty-string labels are ignored.
/// `remote_state = closed` always overrides to `IssueStatus::Closed`
/// regardless of labels present.
pub fn decode(payload: &RemotePayload, conventions: &Conventions) -> DecodedFields {
    let mut issue_type = None;
    let mut priority = None;
    let mut in_progress = false;
    let mut passthrough = Vec::new();

    for label in &payload.labels {
        if label.is_empty() {
            continue;
        }
        if issue_type.is_none() {
            if let Some(t) = label_to_type(label, conventions) {
                issue_type = Some(t);
                continue;
            }
        }
        if priority.is_none() {
            if let Some(p) = conventions.priority_map.priority_for(label) {
                priority = match priority {
                    None => Some(p),
                    Some(existing) => Some(existing.min(p)),
                };
                continue;
            }
        } else if let Some(p) = conventions.priority_map.priority_for(label) {
            priority = priority.map(|existing| existing.min(p));
            continue;
        }
        if label == &conventions.in_progress_label {
            in_progress = true;
            continue;
        }
        passthrough.push(label.clone());
    }

    let status = if payload.state == RemoteState::Closed {
        IssueStatus::Closed
    } else if in_progress {
        IssueStatus::InProgress
    } else {
        IssueStatus::Open
    };

    let (description, relations) = parse_body(&payload.body, conventions);

    DecodedFields {
        issue_type: issue_type.unwrap_or(IssueType::Task),
        priority: priority.unwrap_or(2),
        status,
        labels: passthrough,
        relations,
        description,
    }
}

fn parse_body(body: &str, conventions: &Conventions) -> (String, Relations) {
    if body.is_empty() {
        return (String::new(), Relations::default());
    }

    let separator_marker = conventions
        .separator
        .lines()
        .next()
        .unwrap_or(conventions.separator.as_str());
    let (description, relation_block) = match body.find(separator_marker) {
        Some(idx) => {
            let desc = body[..idx].trim_end().to_string();
            let rest = &body[idx..];
            let after_marker = rest
                .lines()
                .skip(conventions.separator.lines().count())
                .collect::<Vec<_>>()
                .join("\n");
            (desc, after_marker)
        }
        None => (body.to_string(), String::new()),
    };

    let depends_re = Regex::new(&conventions.dependency_pattern).expect("valid dependency_pattern regex");
    let blocks_re = Regex::new(&conventions.blocks_pattern).expect("valid blocks_pattern regex");
    let parent_re = Regex::new(&conventions.parent_pattern).expect("valid parent_pattern regex");

    let mut relations = Relations::default();
    for line in relation_block.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = depends_re.captures(line) {
            relations.depends_on = extend_unique(relations.depends_on, extract_refs(&caps[1]));
        } else if let Some(caps) = blocks_re.captures(line) {
            relations.blocks = extend_unique(relations.blocks, extract_refs(&caps[1]));
        } else if let Some(caps) = parent_re.captures(line) {
            if relations.parent.is_none() {
                if let Some(first) = extract_refs(&caps[1]).into_iter().next() {
                    relations.parent = Some(first);
                }
            }
        }
    }

    (description, relations)
}

fn extend_unique(mut existing: Vec<String>, new: Vec<String>) -> Vec<String> {
    for item in new {
        if !existing.contains(&item) {
            existing.push(item);
        }
    }
    existing
}

fn extract_refs(text: &str) -> Vec<String> {
    static REF_RE: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"(?:issues/)?#?(\d+)").unwrap());
    REF_RE
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}
