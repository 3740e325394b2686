//! Agent registry and capability-based matcher.
//!
//! Given a ready issue and the registry of known agents, [`match_agent`]
//! picks the single best agent (or `None`) the Assignment Orchestrator
//! should hand the issue to.

use dispatch_core::Issue;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn file_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[A-Za-z0-9_.\-/]+\.[A-Za-z0-9]+").expect("valid regex"))
}

/// How much latitude an agent has to act without human confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    ReadOnly,
    Suggest,
    Full,
}

/// Relative cost tier of the model(s) an agent uses; ties prefer cheaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCost {
    Cheap,
    Fast,
    Best,
}

/// One declared capability: a name plus the operations it covers. `"*"`
/// in `operations` is a wildcard covering any operation under `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCapability {
    pub name: String,
    pub operations: Vec<String>,
}

impl AgentCapability {
    pub fn new(name: impl Into<String>, operations: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            operations: operations.into_iter().map(Into::into).collect(),
        }
    }

    fn covers(&self, required: &RequiredCapability) -> Option<f64> {
        if self.name != required.name {
            return None;
        }
        if self.operations.iter().any(|op| op == &required.operation) {
            Some(1.0)
        } else if self.operations.iter().any(|op| op == "*") {
            Some(0.5)
        } else {
            None
        }
    }
}

/// Registration record for one agent, as carried in the Agent Registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub capabilities: Vec<AgentCapability>,
    /// Glob patterns over file paths (and issue titles) this agent is
    /// specialized for; unset means no focus bonus applies.
    pub focus: Vec<String>,
    pub autonomy: AutonomyLevel,
    pub model_cost: ModelCost,
}

/// A capability an issue calls for, derived from its type and labels.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RequiredCapability {
    name: String,
    operation: String,
}

/// The outcome of matching one issue against the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMatch {
    pub agent_id: String,
    pub confidence: f64,
    pub reason: String,
}

const FOCUS_BONUS_CAP: f64 = 2.0;

/// Required capabilities an issue calls for: one for its type, one per
/// label. The type capability's operation is `"implement"`; label
/// capabilities use `"apply"`. This convention is local to the matcher —
/// agents declare matching capability names to be eligible.
fn required_capabilities(issue: &Issue) -> Vec<RequiredCapability> {
    let mut reqs = vec![RequiredCapability {
        name: issue.issue_type.to_string(),
        operation: "implement".to_string(),
    }];
    for label in &issue.labels {
        reqs.push(RequiredCapability {
            name: label.clone(),
            operation: "apply".to_string(),
        });
    }
    reqs
}

fn capability_score(required: &[RequiredCapability], agent: &AgentRegistration) -> f64 {
    required
        .iter()
        .map(|req| {
            agent
                .capabilities
                .iter()
                .filter_map(|cap| cap.covers(req))
                .fold(0.0_f64, f64::max)
        })
        .sum()
}

fn referenced_file_paths(description: &str) -> Vec<&str> {
    file_path_pattern().find_iter(description).map(|m| m.as_str()).collect()
}

/// Minimal glob match supporting `*` (any run of characters) and `?`
/// (any single character); everything else is matched literally.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();
    glob_match_inner(&pattern_chars, &text_chars)
}

fn glob_match_inner(pattern: &[char], text: &[char]) -> bool {
    if pattern.first() == Some(&'*') && pattern.get(1) == Some(&'*') {
        // `**` matches zero or more whole path segments: a following `/`
        // is optional, since zero segments consumed means no separator
        // appears either (so `**/*.md` still matches a slash-free
        // `README.md`, not just `src/README.md`).
        let rest = match pattern.get(2) {
            Some('/') => &pattern[3..],
            _ => &pattern[2..],
        };
        return glob_match_inner(rest, text) || (!text.is_empty() && glob_match_inner(pattern, &text[1..]));
    }
    match pattern.first() {
        None => text.is_empty(),
        Some('*') => {
            glob_match_inner(&pattern[1..], text)
                || (!text.is_empty() && glob_match_inner(pattern, &text[1..]))
        }
        Some('?') => !text.is_empty() && glob_match_inner(&pattern[1..], &text[1..]),
        Some(c) => text.first() == Some(c) && glob_match_inner(&pattern[1..], &text[1..]),
    }
}

fn focus_score(agent: &AgentRegistration, issue: &Issue) -> f64 {
    if agent.focus.is_empty() {
        return 0.0;
    }
    let paths = referenced_file_paths(&issue.description);
    let matched = agent
        .focus
        .iter()
        .filter(|pattern| {
            glob_match(pattern, &issue.title) || paths.iter().any(|p| glob_match(pattern, p))
        })
        .count();
    (matched as f64).min(FOCUS_BONUS_CAP)
}

/// Score + pick the best agent for `issue`. Returns `None` if no agent
/// scores above zero.
pub fn match_agent(issue: &Issue, registry: &[AgentRegistration]) -> Option<AgentMatch> {
    let required = required_capabilities(issue);
    let max_score = required.len() as f64 + FOCUS_BONUS_CAP;

    let mut scored: Vec<(usize, f64, &AgentRegistration)> = registry
        .iter()
        .enumerate()
        .map(|(idx, agent)| {
            let score = capability_score(&required, agent) + focus_score(agent, issue);
            (idx, score, agent)
        })
        .collect();

    scored.sort_by(|(idx_a, score_a, agent_a), (idx_b, score_b, agent_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(agent_b.autonomy.cmp(&agent_a.autonomy))
            .then(agent_a.model_cost.cmp(&agent_b.model_cost))
            .then(idx_a.cmp(idx_b))
    });

    let (_, winning_score, winner) = scored.into_iter().next()?;
    if winning_score <= 0.0 {
        tracing::debug!(issue_id = %issue.id, "no agent scored above zero");
        return None;
    }

    Some(AgentMatch {
        agent_id: winner.id.clone(),
        confidence: (winning_score / max_score).min(1.0),
        reason: format!(
            "matched {} capabilities/focus for {} issue \"{}\"",
            winning_score, issue.issue_type, issue.title
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::{Issue, IssueType};

    fn agent(id: &str, caps: Vec<AgentCapability>, autonomy: AutonomyLevel, model_cost: ModelCost) -> AgentRegistration {
        AgentRegistration {
            id: id.to_string(),
            display_name: id.to_string(),
            description: String::new(),
            capabilities: caps,
            focus: Vec::new(),
            autonomy,
            model_cost,
        }
    }

    #[test]
    fn exact_capability_match_outscores_wildcard() {
        let mut issue = Issue::new("L1", "Fix bug");
        issue.issue_type = IssueType::Bug;
        issue.labels = vec!["backend".to_string()];

        let exact = agent(
            "exact",
            vec![
                AgentCapability::new("bug", ["implement"]),
                AgentCapability::new("backend", ["apply"]),
            ],
            AutonomyLevel::Full,
            ModelCost::Best,
        );
        let wildcard = agent(
            "wildcard",
            vec![AgentCapability::new("bug", ["*"]), AgentCapability::new("backend", ["*"])],
            AutonomyLevel::Full,
            ModelCost::Best,
        );

        let result = match_agent(&issue, &[wildcard, exact]).unwrap();
        assert_eq!(result.agent_id, "exact");
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn no_matching_capability_returns_none() {
        let issue = Issue::new("L1", "Fix bug");
        let agent = agent("a", vec![AgentCapability::new("feature", ["implement"])], AutonomyLevel::Full, ModelCost::Cheap);
        assert!(match_agent(&issue, &[agent]).is_none());
    }

    #[test]
    fn ties_broken_by_autonomy_then_cost_then_registration_order() {
        let issue = Issue::new("L1", "Task");
        let a = agent("first", vec![AgentCapability::new("task", ["implement"])], AutonomyLevel::Suggest, ModelCost::Best);
        let b = agent("second", vec![AgentCapability::new("task", ["implement"])], AutonomyLevel::Full, ModelCost::Best);
        let result = match_agent(&issue, &[a, b]).unwrap();
        assert_eq!(result.agent_id, "second");
    }

    #[test]
    fn focus_pattern_adds_bonus_capped_at_two() {
        let mut issue = Issue::new("L1", "Fix auth");
        issue.description = "see src/auth/login.rs and src/auth/session.rs and src/auth/token.rs".to_string();
        let mut with_focus = agent(
            "focused",
            vec![AgentCapability::new("task", ["implement"])],
            AutonomyLevel::Full,
            ModelCost::Best,
        );
        with_focus.focus = vec!["src/auth/*".to_string()];

        let result = match_agent(&issue, &[with_focus]).unwrap();
        // 1 (type match) + 1 (one distinct pattern matched, not one per file) = 2
        assert!(result.confidence > 0.0);
    }

    #[test]
    fn glob_match_supports_star_and_question_mark() {
        assert!(glob_match("src/*.rs", "src/main.rs"));
        assert!(!glob_match("src/*.rs", "lib/main.rs"));
        assert!(glob_match("a?c", "abc"));
    }

    #[test]
    fn glob_match_supports_double_star_across_segments() {
        assert!(glob_match("**/*.md", "README.md"));
        assert!(glob_match("**/*.md", "docs/README.md"));
        assert!(glob_match("**/*.md", "docs/nested/README.md"));
        assert!(!glob_match("**/*.md", "README.rs"));
    }
}
