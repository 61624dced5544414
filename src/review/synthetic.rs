//! Folds staged review comments into the conversation graph.
//!
//! Until a review is submitted its comments exist only in the pending
//! review store, so the replicas render them from synthetic graph nodes:
//! pending-state discussions (or timeline items) whose ids are the staged
//! comment ids. Submission replaces them with the provider's real nodes.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use crate::conversation::{
    Actor, Discussion, GraphFamily, NodeCollection, Note, PendingReview, TimelineItem,
};
use crate::directive::{ConversationNode, Directive};

use super::PendingReviewComment;

/// Placeholder id carried by a staged-only pending review.
pub const STAGED_REVIEW_ID: &str = "pending";

/// State marker carried by synthetic nodes.
const PENDING_STATE: &str = "PENDING";

/// Builds the synthetic discussion node for one staged comment.
#[must_use]
pub fn staged_discussion_node(comment: &PendingReviewComment, author: &Actor) -> Discussion {
    let mut note = Note::with_id(comment.id.clone());
    note.author = Some(author.clone());
    note.body = Some(comment.text.clone());
    note.resolvable = true;
    note.created_at = Some(comment.created_at);
    note.position = Some(json!({
        "newPath": comment.file_path,
        "oldPath": comment.file_path,
        "newLine": comment.start_line,
        "oldLine": Value::Null,
    }));
    note.extra = pending_marker();

    Discussion {
        id: comment.id.clone(),
        reply_id: None,
        resolvable: false,
        resolved: false,
        created_at: Some(comment.created_at),
        notes: NodeCollection::from_nodes(vec![note]),
        extra: pending_marker(),
    }
}

/// Builds the synthetic timeline item for one staged comment.
#[must_use]
pub fn staged_timeline_item(comment: &PendingReviewComment, author: &Actor) -> TimelineItem {
    let mut item = TimelineItem::with_id(comment.id.clone());
    item.kind = Some("PendingReviewComment".to_owned());
    item.author = Some(author.clone());
    item.body = Some(comment.text.clone());
    item.state = Some(PENDING_STATE.to_owned());
    item.created_at = Some(comment.created_at);
    item.extra = pending_marker();
    item
}

/// Builds the pending-review marker advertising the staged comment count.
#[must_use]
pub fn staged_review_marker(staged: &[PendingReviewComment], author: &Actor) -> PendingReview {
    PendingReview {
        id: STAGED_REVIEW_ID.to_owned(),
        author: Some(author.clone()),
        comment_count: i64::try_from(staged.len()).unwrap_or(i64::MAX),
    }
}

/// Compiles the directive batch advertising freshly staged comments.
///
/// The batch re-adds every staged comment as a synthetic node (insertion is
/// idempotent, so previously advertised nodes dedupe away) and refreshes
/// the pending-review marker.
#[must_use]
pub fn staging_batch(
    family: GraphFamily,
    staged: &[PendingReviewComment],
    author: &Actor,
    issued_at: DateTime<Utc>,
) -> Vec<Directive> {
    let nodes: Vec<ConversationNode> = staged
        .iter()
        .map(|comment| match family {
            GraphFamily::Discussion => {
                ConversationNode::Discussion(staged_discussion_node(comment, author))
            }
            GraphFamily::Timeline => {
                ConversationNode::Timeline(staged_timeline_item(comment, author))
            }
        })
        .collect();

    vec![
        Directive::updated_at_stamp(issued_at),
        Directive::UpdateReviewCommentsCount(1),
        Directive::AddNodes(nodes),
        Directive::AddPendingReview(staged_review_marker(staged, author)),
    ]
}

fn pending_marker() -> Map<String, Value> {
    let mut marker = Map::new();
    marker.insert("pending".to_owned(), Value::Bool(true));
    marker
}
