// GitHub record types consumed by cache callers.
// Each record exposes the freshness stamp its cache keys are versioned by.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::FreshnessStamp;

/// Owner type discriminator (user or organization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OwnerType {
    #[default]
    User,
    Organization,
    Bot,
    #[serde(other)]
    Unknown,
}

/// GitHub user or organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub id: u64,
    pub login: String,
    #[serde(rename = "type", default)]
    pub owner_type: OwnerType,
    pub avatar_url: Option<String>,
}

/// GitHub repository metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: Owner,
    pub private: bool,
    pub description: Option<String>,
    #[serde(default)]
    pub open_issues_count: u64,
    pub updated_at: DateTime<Utc>,
    pub pushed_at: Option<DateTime<Utc>>,
}

impl Repository {
    /// Last content change. A push moves `pushed_at`; metadata edits only move `updated_at`.
    pub fn last_modified(&self) -> DateTime<Utc> {
        match self.pushed_at {
            Some(pushed) if pushed > self.updated_at => pushed,
            _ => self.updated_at,
        }
    }

    pub fn freshness(&self) -> FreshnessStamp {
        FreshnessStamp::from(self.last_modified())
    }
}

/// Issue state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Open,
    Closed,
    #[serde(other)]
    Unknown,
}

/// Issue label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub color: Option<String>,
}

/// GitHub issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub state: IssueState,
    pub user: Owner,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Newest `updated_at` across a page of issues, used to version an issue-list key.
pub fn issues_freshness(issues: &[Issue]) -> Option<FreshnessStamp> {
    issues
        .iter()
        .map(|issue| issue.updated_at)
        .max()
        .map(FreshnessStamp::from)
}

/// Markdown rendered by the upstream markdown API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedMarkdown {
    pub path: String,
    pub html: String,
}
