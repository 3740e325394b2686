//! Issue listing filter.

use chrono::{DateTime, Utc};
use dispatch_core::IssueStatus;

/// Filter applied by [`crate::IssueStore::list_issues`]. All fields are
/// conjunctive (AND'd together); `None` means "no constraint on this
/// field". Results are always ordered by priority ascending, then
/// `created_at` ascending.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub status: Option<IssueStatus>,
    pub assignee: Option<String>,
    pub issue_type: Option<dispatch_core::IssueType>,
    pub label: Option<String>,
    pub updated_since: Option<DateTime<Utc>>,
}
