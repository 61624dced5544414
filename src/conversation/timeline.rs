//! The timeline conversation family.
//!
//! Providers in this family model a conversation as a flat, time-ordered
//! list of heterogeneous items (comments, reviews, label events, …), each
//! uniquely identified. Review items own their comment threads directly, so
//! there is a single owning collection for every comment and no embedded
//! duplicate copies to mirror.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::common::{Actor, Label, NodeCollection, PendingReview, ReactionGroup};

/// Root cached object for one timeline-family pull request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineGraph {
    /// Pull request title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Pull request state (e.g. `OPEN`, `MERGED`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Server-reported last-update stamp; used for gap corroboration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Reactions on the pull request itself.
    #[serde(default)]
    pub reaction_groups: Vec<ReactionGroup>,
    /// Labels attached to the pull request.
    #[serde(default)]
    pub labels: NodeCollection<Label>,
    /// Requested reviewers.
    #[serde(default)]
    pub reviewers: NodeCollection<Actor>,
    /// Users who approved the pull request.
    #[serde(default)]
    pub approved_by: NodeCollection<Actor>,
    /// In-flight review marker, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_review: Option<PendingReview>,
    /// Count of review comments; clamped at zero by counters.
    #[serde(default)]
    pub review_comments_count: i64,
    /// The timeline items making up the conversation.
    #[serde(default)]
    pub timeline_items: NodeCollection<TimelineItem>,
    /// Provider fields this crate does not model; preserved across merges.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One event on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineItem {
    /// Item id.
    pub id: String,
    /// Item kind discriminator (e.g. `IssueComment`, `PullRequestReview`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Item author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Actor>,
    /// Item body, for comment-like items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Item state (e.g. a review's `PENDING`/`SUBMITTED`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Creation stamp when the provider supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Reactions on this item.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reaction_groups: Vec<ReactionGroup>,
    /// Review comments owned by this item, for review items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<NodeCollection<ReviewComment>>,
    /// Provider fields this crate does not model; preserved across merges.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TimelineItem {
    /// Creates a minimal item with the given id.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: None,
            author: None,
            body: None,
            state: None,
            created_at: None,
            reaction_groups: Vec::new(),
            comments: None,
            extra: Map::new(),
        }
    }
}

/// A review comment owned by a review timeline item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewComment {
    /// Comment id.
    pub id: String,
    /// Comment body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Comment state (e.g. `PENDING`, `SUBMITTED`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Review-thread id the comment belongs to, when threaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Whether the owning thread is resolved.
    #[serde(default)]
    pub resolved: bool,
    /// Reactions on this comment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reaction_groups: Vec<ReactionGroup>,
    /// Replies nested under this comment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<ReviewComment>,
    /// Provider fields this crate does not model; preserved across merges.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReviewComment {
    /// Creates a minimal comment with the given id.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: None,
            state: None,
            thread_id: None,
            resolved: false,
            reaction_groups: Vec::new(),
            replies: Vec::new(),
            extra: Map::new(),
        }
    }
}
