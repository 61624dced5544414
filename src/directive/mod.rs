//! The directive vocabulary.
//!
//! A directive is a small, serialisable instruction describing one
//! incremental change to a cached conversation graph. The backend compiles a
//! mutation's raw provider payload into an ordered directive batch; both
//! replicas (backend cache and presentation surface) apply the identical
//! batch through [`crate::replica`]. Directives are data, not code: the wire
//! envelope is `{"type": <kind>, "data": <payload>}` and every kind carries
//! one concrete payload type, so unknown or malformed shapes fail at the
//! decoding boundary instead of drifting silently between the two appliers.
//!
//! Delivery is at-least-once, so every directive is idempotent under
//! repeated application (inserts skip existing ids, removals tolerate absent
//! ids, counter deltas clamp at zero).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::conversation::{
    Actor, Discussion, Label, NodeCollection, Note, PendingReview, ReviewComment, TimelineItem,
};

/// A node payload addressed to one of the two graph families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "camelCase")]
pub enum ConversationNode {
    /// A timeline-family item.
    Timeline(TimelineItem),
    /// A discussion-family node.
    Discussion(Discussion),
}

impl ConversationNode {
    /// Returns the node's id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Timeline(item) => item.id.as_str(),
            Self::Discussion(node) => node.id.as_str(),
        }
    }
}

/// A reply payload addressed to one of the two graph families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "camelCase")]
pub enum ConversationReply {
    /// A timeline-family reply to a review comment.
    Timeline(TimelineReply),
    /// A discussion-family reply note; its `discussion` back-reference
    /// addresses the thread it belongs under.
    Discussion(Note),
}

/// A reply to a review comment in the timeline family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineReply {
    /// Id of the review comment being replied to.
    pub parent_id: String,
    /// The reply comment itself.
    pub comment: ReviewComment,
}

/// Reference to a node by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRef {
    /// The referenced node id.
    pub id: String,
}

/// Shallow field merge into a node located by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    /// Id of the node to patch.
    pub id: String,
    /// Fields to merge; values carrying a `nodes` array replace the
    /// existing array wholesale.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Field merge into a note located as a thread root or nested reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionNoteUpdate {
    /// Id of the note to patch.
    pub id: String,
    /// The discussion the note lives under.
    pub discussion: NodeRef,
    /// Fields to merge; `id` and `discussion` are never overwritten.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// One reaction being added to the pull request or one of its nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionAdd {
    /// Target node id; `None` targets the pull request itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    /// Reaction content key.
    pub content: String,
    /// The reacting user.
    pub user: Actor,
}

/// One reaction being removed from the pull request or one of its nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRemove {
    /// Target node id; `None` targets the pull request itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    /// Reaction content key.
    pub content: String,
    /// Login of the user withdrawing the reaction.
    pub login: String,
}

/// Resolution-state merge for a review thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadResolution {
    /// Id of the thread being (un)resolved.
    pub thread_id: String,
    /// Resolution fields (`resolved`, `resolvedAt`, `resolvedBy`, …) merged
    /// into the thread node and any comments belonging to the thread.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// One incremental change to a cached conversation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Directive {
    /// Insert a node into the graph's primary collection; skipped when a
    /// node with the same id already exists.
    AddNode(ConversationNode),
    /// Insert several nodes, each subject to the [`Directive::AddNode`]
    /// dedupe rule.
    AddNodes(Vec<ConversationNode>),
    /// Remove a node by id, including discussion re-rooting; no-op when the
    /// id is absent.
    RemoveNode(NodeRef),
    /// Shallow-merge fields into an existing node by id; no-op when absent.
    UpdateNode(NodeUpdate),
    /// Merge fields into a note located as a thread root or nested reply;
    /// no-op when not found.
    UpdateDiscussionNote(DiscussionNoteUpdate),
    /// Append a reply under its parent; skipped when a reply with the same
    /// id already exists.
    AddReply(ConversationReply),
    /// Add a reaction entry.
    AddReaction(ReactionAdd),
    /// Remove a reaction entry; removing the last user for a content key
    /// removes the whole group.
    RemoveReaction(ReactionRemove),
    /// Append approvers not already present (by login).
    AddApprovedBy(Vec<Actor>),
    /// Replace the approver list wholesale.
    RemoveApprovedBy(Vec<Actor>),
    /// Set the in-flight review marker.
    AddPendingReview(PendingReview),
    /// Clear the in-flight review marker.
    RemovePendingReview,
    /// Add a signed delta to the review-comments counter, clamped at zero.
    UpdateReviewCommentsCount(i64),
    /// Add a signed delta to the pending-review comment counter, clamped at
    /// zero.
    UpdatePendingReviewCommentsCount(i64),
    /// Replace the label list wholesale.
    SetLabels(NodeCollection<Label>),
    /// Replace the reviewer list wholesale.
    UpdateReviewers(Vec<Actor>),
    /// Generic top-level merge into the pull request: values carrying a
    /// `nodes` array refill the existing array in place, scalars overwrite.
    UpdatePullRequest(Map<String, Value>),
    /// Merge resolution fields into a thread and its comments.
    ResolveReviewThread(ThreadResolution),
    /// Merge un-resolution fields into a thread and its comments.
    UnresolveReviewThread(ThreadResolution),
}

impl Directive {
    /// Returns the wire kind name, for logging and telemetry.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AddNode(_) => "addNode",
            Self::AddNodes(_) => "addNodes",
            Self::RemoveNode(_) => "removeNode",
            Self::UpdateNode(_) => "updateNode",
            Self::UpdateDiscussionNote(_) => "updateDiscussionNote",
            Self::AddReply(_) => "addReply",
            Self::AddReaction(_) => "addReaction",
            Self::RemoveReaction(_) => "removeReaction",
            Self::AddApprovedBy(_) => "addApprovedBy",
            Self::RemoveApprovedBy(_) => "removeApprovedBy",
            Self::AddPendingReview(_) => "addPendingReview",
            Self::RemovePendingReview => "removePendingReview",
            Self::UpdateReviewCommentsCount(_) => "updateReviewCommentsCount",
            Self::UpdatePendingReviewCommentsCount(_) => "updatePendingReviewCommentsCount",
            Self::SetLabels(_) => "setLabels",
            Self::UpdateReviewers(_) => "updateReviewers",
            Self::UpdatePullRequest(_) => "updatePullRequest",
            Self::ResolveReviewThread(_) => "resolveReviewThread",
            Self::UnresolveReviewThread(_) => "unresolveReviewThread",
        }
    }

    /// Builds the `updatePullRequest` stamp directive carried at the head of
    /// every compiled mutation batch.
    #[must_use]
    pub fn updated_at_stamp(updated_at: chrono::DateTime<chrono::Utc>) -> Self {
        let mut fields = Map::new();
        fields.insert(
            "updatedAt".to_owned(),
            Value::String(updated_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
        );
        Self::UpdatePullRequest(fields)
    }
}
