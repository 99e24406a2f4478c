// Cache key derivation.
// Builds namespaced, freshness-versioned keys matching the GitHub object model.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::github::{self, Issue, Repository};

use super::freshness::FreshnessStamp;

/// One component of a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segment {
    Number(i64),
    Text(String),
}

/// Whether a resource kind is versioned by a freshness stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampRule {
    /// Content is only ever looked up by its stamp.
    Required,
    /// Stamp when the caller knows one, otherwise TTL-only.
    Optional,
    /// Aggregates with no single last-modified time; staleness is TTL-only.
    Forbidden,
}

/// Kinds of cached resources. The tag is always the first key segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Repository,
    Readme,
    Issues,
    IssueCount,
    Markdown,
    UserRepos,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Repository,
        ResourceKind::Readme,
        ResourceKind::Issues,
        ResourceKind::IssueCount,
        ResourceKind::Markdown,
        ResourceKind::UserRepos,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            ResourceKind::Repository => "repo",
            ResourceKind::Readme => "readme",
            ResourceKind::Issues => "issues",
            ResourceKind::IssueCount => "issue-count",
            ResourceKind::Markdown => "markdown",
            ResourceKind::UserRepos => "user-repos",
        }
    }

    /// Identifying fields, in the order they appear in the key.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Repository
            | ResourceKind::Readme
            | ResourceKind::Issues
            | ResourceKind::IssueCount => &["owner", "repo"],
            ResourceKind::Markdown => &["owner", "repo", "path"],
            ResourceKind::UserRepos => &["user"],
        }
    }

    pub fn stamp_rule(&self) -> StampRule {
        match self {
            ResourceKind::Readme | ResourceKind::Markdown => StampRule::Required,
            ResourceKind::Repository | ResourceKind::Issues => StampRule::Optional,
            ResourceKind::IssueCount | ResourceKind::UserRepos => StampRule::Forbidden,
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

/// An ordered list of key segments. Equal iff the segment lists are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    segments: Vec<Segment>,
}

impl CacheKey {
    /// Build a key for `kind` from its identifying fields and an optional stamp.
    ///
    /// `fields` must follow [`ResourceKind::fields`] order exactly.
    pub fn build(
        kind: ResourceKind,
        fields: &[&str],
        stamp: Option<FreshnessStamp>,
    ) -> Result<Self> {
        let names = kind.fields();
        if fields.len() != names.len() {
            return Err(CacheError::invalid(format!(
                "{} key takes {} identifying field(s) ({}), got {}",
                kind.tag(),
                names.len(),
                names.join(", "),
                fields.len()
            )));
        }

        let mut segments = Vec::with_capacity(names.len() + 2);
        segments.push(Segment::Text(kind.tag().to_string()));
        for (name, value) in names.iter().zip(fields) {
            if value.trim().is_empty() {
                return Err(CacheError::invalid(format!(
                    "{} key requires a non-empty `{}`",
                    kind.tag(),
                    name
                )));
            }
            segments.push(Segment::Text((*value).to_string()));
        }

        match (kind.stamp_rule(), stamp) {
            (StampRule::Forbidden, Some(_)) => {
                return Err(CacheError::invalid(format!(
                    "{} keys are not versioned by a freshness stamp",
                    kind.tag()
                )));
            }
            (StampRule::Required, None) => {
                return Err(CacheError::invalid(format!(
                    "{} key requires a freshness stamp",
                    kind.tag()
                )));
            }
            (_, Some(stamp)) => segments.push(Segment::Number(stamp.to_epoch_millis()?)),
            (_, None) => {}
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn kind(&self) -> Option<ResourceKind> {
        match self.segments.first() {
            Some(Segment::Text(tag)) => ResourceKind::from_tag(tag),
            _ => None,
        }
    }

    /// The normalized freshness stamp, if the key carries one.
    pub fn stamp(&self) -> Option<i64> {
        let kind = self.kind()?;
        if self.segments.len() == kind.fields().len() + 2 {
            match self.segments.last() {
                Some(Segment::Number(millis)) => Some(*millis),
                _ => None,
            }
        } else {
            None
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.segments.iter().enumerate() {
            if index > 0 {
                f.write_str(":")?;
            }
            match segment {
                Segment::Number(n) => write!(f, "{n}")?,
                Segment::Text(text) => f.write_str(&escape_segment(text))?,
            }
        }
        Ok(())
    }
}

impl From<&CacheKey> for String {
    fn from(key: &CacheKey) -> Self {
        key.to_string()
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.to_string()
    }
}

/// Escape the separator and the escape character so segment boundaries stay unambiguous.
fn escape_segment(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Key for repository metadata.
pub fn repository(owner: &str, repo: &str, stamp: Option<FreshnessStamp>) -> Result<CacheKey> {
    CacheKey::build(ResourceKind::Repository, &[owner, repo], stamp)
}

/// Key for a repository's README, versioned by the repository's last modification.
pub fn readme(owner: &str, repo: &str, stamp: impl Into<FreshnessStamp>) -> Result<CacheKey> {
    CacheKey::build(ResourceKind::Readme, &[owner, repo], Some(stamp.into()))
}

/// Key for a repository's issue list.
pub fn issues(owner: &str, repo: &str, stamp: Option<FreshnessStamp>) -> Result<CacheKey> {
    CacheKey::build(ResourceKind::Issues, &[owner, repo], stamp)
}

/// Key for a repository's open-issue count. Relies on the store TTL for staleness.
pub fn issue_count(owner: &str, repo: &str) -> Result<CacheKey> {
    CacheKey::build(ResourceKind::IssueCount, &[owner, repo], None)
}

/// Key for a rendered markdown file within a repository.
pub fn markdown(
    owner: &str,
    repo: &str,
    path: &str,
    stamp: impl Into<FreshnessStamp>,
) -> Result<CacheKey> {
    CacheKey::build(ResourceKind::Markdown, &[owner, repo, path], Some(stamp.into()))
}

/// Key for the list of a user's repositories. Relies on the store TTL for staleness.
pub fn user_repos(user: &str) -> Result<CacheKey> {
    CacheKey::build(ResourceKind::UserRepos, &[user], None)
}

/// README key derived from fetched repository metadata.
pub fn readme_for(repository: &Repository) -> Result<CacheKey> {
    readme(
        &repository.owner.login,
        &repository.name,
        repository.freshness(),
    )
}

/// Metadata key derived from fetched repository metadata.
pub fn repository_for(repository: &Repository) -> Result<CacheKey> {
    self::repository(
        &repository.owner.login,
        &repository.name,
        Some(repository.freshness()),
    )
}

/// Rendered-markdown key for a file in a fetched repository, versioned by its last change.
pub fn markdown_for(repository: &Repository, path: &str) -> Result<CacheKey> {
    markdown(
        &repository.owner.login,
        &repository.name,
        path,
        repository.freshness(),
    )
}

/// Issue-list key versioned by the newest issue in `issues`. An empty page is TTL-only.
pub fn issues_for(owner: &str, repo: &str, issues: &[Issue]) -> Result<CacheKey> {
    self::issues(owner, repo, github::issues_freshness(issues))
}
