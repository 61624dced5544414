//! The discussion-tree conversation family.
//!
//! Providers in this family model a conversation as a list of discussion
//! nodes. Each discussion owns an ordered note list whose *first* note is the
//! thread root; replies live in an array nested one level inside that root
//! note, not inside the discussion node itself. The replica's reply-rewrite
//! and re-rooting rules depend on that asymmetry, so this module preserves
//! the wire shape exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::common::{Actor, Label, NodeCollection, PendingReview, ReactionGroup};

/// Root cached object for one discussion-family pull request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionGraph {
    /// Pull request title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Pull request state (e.g. `opened`, `merged`).
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
    /// Count of user-authored discussions; clamped at zero by counters.
    #[serde(default)]
    pub user_discussions_count: i64,
    /// The discussion nodes making up the conversation.
    #[serde(default)]
    pub discussions: NodeCollection<Discussion>,
    /// Provider fields this crate does not model; preserved across merges.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One discussion node: the container for a root note and its replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discussion {
    /// Discussion id (vendor-encoded, kind-prefixed).
    pub id: String,
    /// Id replies should be addressed to; rewritten on first real reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_id: Option<String>,
    /// Whether the thread can be resolved.
    #[serde(default)]
    pub resolvable: bool,
    /// Whether the thread is resolved.
    #[serde(default)]
    pub resolved: bool,
    /// Creation stamp when the provider supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// The note list; the first note is the thread root.
    #[serde(default)]
    pub notes: NodeCollection<Note>,
    /// Provider fields this crate does not model; preserved across merges.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Discussion {
    /// Borrows the thread-root note, when the discussion has any notes.
    #[must_use]
    pub fn root_note(&self) -> Option<&Note> {
        self.notes.nodes.first()
    }

    /// Mutably borrows the thread-root note.
    pub fn root_note_mut(&mut self) -> Option<&mut Note> {
        self.notes.nodes.first_mut()
    }
}

/// Back-reference from a note to the discussion that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionRef {
    /// Owning discussion id.
    pub id: String,
    /// Reply-target id, when distinct from the discussion id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_id: Option<String>,
}

/// A single note: either a thread root or a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Note id (vendor-encoded, kind-prefixed).
    pub id: String,
    /// Note author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Actor>,
    /// Note body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Whether the note can be resolved.
    #[serde(default)]
    pub resolvable: bool,
    /// Whether the note is resolved.
    #[serde(default)]
    pub resolved: bool,
    /// Creation stamp when the provider supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Owning-discussion back-reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discussion: Option<DiscussionRef>,
    /// Diff-position metadata; copied onto replies during re-rooting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
    /// Replies nested under this note; only thread roots carry them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replies: Option<Vec<Note>>,
    /// Provider fields this crate does not model; preserved across merges.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Note {
    /// Creates a minimal note with the given id.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: None,
            body: None,
            resolvable: false,
            resolved: false,
            created_at: None,
            discussion: None,
            position: None,
            replies: None,
            extra: Map::new(),
        }
    }
}
