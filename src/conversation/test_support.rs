//! Fixture builders for conversation graphs used by unit and behavioural
//! tests.

use serde_json::Map;

use super::common::{Actor, NodeCollection};
use super::discussion::{Discussion, DiscussionGraph, DiscussionRef, Note};
use super::timeline::{TimelineGraph, TimelineItem};
use super::ConversationGraph;

/// Builds an actor with the given login.
#[must_use]
pub fn actor(login: &str) -> Actor {
    Actor::from_login(login)
}

/// Builds a note with an id, author, and body.
#[must_use]
pub fn note(id: &str, login: &str, body: &str) -> Note {
    let mut built = Note::with_id(id);
    built.author = Some(actor(login));
    built.body = Some(body.to_owned());
    built
}

/// Builds a discussion wrapping a single root note.
#[must_use]
pub fn discussion(id: &str, root: Note) -> Discussion {
    Discussion {
        id: id.to_owned(),
        reply_id: None,
        resolvable: false,
        resolved: false,
        created_at: None,
        notes: NodeCollection::from_nodes(vec![root]),
        extra: Map::new(),
    }
}

/// Builds a reply note addressed to the given discussion.
#[must_use]
pub fn reply_to(discussion_id: &str, id: &str, login: &str, body: &str) -> Note {
    let mut built = note(id, login, body);
    built.discussion = Some(DiscussionRef {
        id: discussion_id.to_owned(),
        reply_id: Some(discussion_id.to_owned()),
    });
    built
}

/// Builds an empty discussion-family conversation graph.
#[must_use]
pub fn discussion_graph(discussions: Vec<Discussion>) -> ConversationGraph {
    ConversationGraph::Discussion(DiscussionGraph {
        discussions: NodeCollection::from_nodes(discussions),
        ..DiscussionGraph::default()
    })
}

/// Builds a timeline-family conversation graph from items.
#[must_use]
pub fn timeline_graph(items: Vec<TimelineItem>) -> ConversationGraph {
    ConversationGraph::Timeline(TimelineGraph {
        timeline_items: NodeCollection::from_nodes(items),
        ..TimelineGraph::default()
    })
}

/// Builds a timeline item with an id, kind, and body.
#[must_use]
pub fn timeline_item(id: &str, kind: &str, body: &str) -> TimelineItem {
    let mut built = TimelineItem::with_id(id);
    built.kind = Some(kind.to_owned());
    built.body = Some(body.to_owned());
    built
}
