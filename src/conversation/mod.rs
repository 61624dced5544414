//! Conversation-graph data model.
//!
//! Two incompatible graph shapes exist across providers: a flat timeline of
//! heterogeneous event items, and a discussion tree whose root notes own
//! nested replies. Both are cached and patched through the same directive
//! vocabulary; this module defines the shapes plus the family discriminator
//! the compiler and replica adapters key off.

pub mod common;
pub mod discussion;
pub mod timeline;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use common::{Actor, Label, NodeCollection, PendingReview, ReactionGroup};
pub use discussion::{Discussion, DiscussionGraph, DiscussionRef, Note};
pub use timeline::{ReviewComment, TimelineGraph, TimelineItem};

/// Which of the two provider graph shapes a conversation uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GraphFamily {
    /// Flat, time-ordered list of heterogeneous event items.
    Timeline,
    /// Discussion nodes owning root notes with nested replies.
    Discussion,
}

impl std::fmt::Display for GraphFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeline => f.write_str("timeline"),
            Self::Discussion => f.write_str("discussion"),
        }
    }
}

/// The root cached conversation for one pull request, in either family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "camelCase")]
pub enum ConversationGraph {
    /// Timeline-family conversation.
    Timeline(TimelineGraph),
    /// Discussion-family conversation.
    Discussion(DiscussionGraph),
}

impl ConversationGraph {
    /// Returns the graph's family discriminator.
    #[must_use]
    pub const fn family(&self) -> GraphFamily {
        match self {
            Self::Timeline(_) => GraphFamily::Timeline,
            Self::Discussion(_) => GraphFamily::Discussion,
        }
    }

    /// Returns the server-reported last-update stamp, when known.
    #[must_use]
    pub const fn updated_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timeline(graph) => graph.updated_at,
            Self::Discussion(graph) => graph.updated_at,
        }
    }

    /// Creates an empty graph of the given family.
    #[must_use]
    pub fn empty(family: GraphFamily) -> Self {
        match family {
            GraphFamily::Timeline => Self::Timeline(TimelineGraph::default()),
            GraphFamily::Discussion => Self::Discussion(DiscussionGraph::default()),
        }
    }
}
