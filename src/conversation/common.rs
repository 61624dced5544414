//! Node types shared by both conversation-graph families.

use serde::{Deserialize, Serialize};

/// A user referenced anywhere in a conversation graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    /// Provider login (the stable identity used for dedupe).
    pub login: String,
    /// Display name when the provider supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Avatar image URL when the provider supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Actor {
    /// Creates an actor with only a login.
    #[must_use]
    pub fn from_login(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            name: None,
            avatar_url: None,
        }
    }
}

/// GraphQL-style connection wrapper: a `nodes` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCollection<T> {
    /// The wrapped nodes.
    #[serde(default = "Vec::new")]
    pub nodes: Vec<T>,
}

impl<T> Default for NodeCollection<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<T> NodeCollection<T> {
    /// Wraps an existing node list.
    #[must_use]
    pub const fn from_nodes(nodes: Vec<T>) -> Self {
        Self { nodes }
    }

    /// Replaces the node list wholesale.
    pub fn replace(&mut self, nodes: impl IntoIterator<Item = T>) {
        self.nodes.clear();
        self.nodes.extend(nodes);
    }
}

/// One emoji-reaction bucket: a content key plus the users who reacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionGroup {
    /// Reaction content key (e.g. `thumbsup`).
    pub content: String,
    /// Users who applied this reaction.
    #[serde(default)]
    pub users: NodeCollection<Actor>,
}

/// A label attached to the pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    /// Provider label id.
    pub id: String,
    /// Label title.
    pub title: String,
    /// Display colour when the provider supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// The marker describing an in-flight (not yet submitted) review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingReview {
    /// Review id; staged-only reviews use a placeholder id.
    pub id: String,
    /// Review author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Actor>,
    /// Number of comments staged under the review.
    #[serde(default)]
    pub comment_count: i64,
}
