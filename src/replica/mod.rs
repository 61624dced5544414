//! The cache-replica apply engine.
//!
//! Exactly one implementation of the state-transition function exists: both
//! the backend cache and the presentation surface apply directive batches
//! through [`apply_batch`]. The engine is pure with respect to its inputs
//! (graph plus batch) and has no dependency on the gateway, store, or bus,
//! so the two processes cannot drift apart.
//!
//! Individual directives that cannot be applied (family mismatch, merge
//! producing an invalid node) are skipped with a warning rather than
//! aborting the batch; the [`ApplyOutcome`] reports the tally so callers can
//! observe partial application instead of assuming all-or-nothing.

mod discussion;
mod merge;
pub mod rewrite;
mod timeline;

use thiserror::Error;
use tracing::warn;

use crate::conversation::{Actor, ConversationGraph, NodeCollection, ReactionGroup};
use crate::directive::Directive;

/// Why a single directive could not be applied.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApplyError {
    /// The directive's payload targets the other graph family.
    #[error("directive {directive} targets the other graph family")]
    FamilyMismatch {
        /// Wire kind name of the offending directive.
        directive: &'static str,
    },

    /// Merging the directive's fields produced an invalid node.
    #[error("field merge produced an invalid node: {message}")]
    InvalidMerge {
        /// Error detail from deserialising the merged node.
        message: String,
    },

    /// The target node could not be serialised for merging.
    #[error("conversation node could not be serialised: {message}")]
    Serialisation {
        /// Error detail from serde.
        message: String,
    },
}

/// Tally of one batch application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Directives applied successfully.
    pub applied: usize,
    /// Directives skipped because they could not be applied.
    pub skipped: usize,
}

impl ApplyOutcome {
    /// Returns true when no directive in the batch was skipped.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.skipped == 0
    }
}

/// Applies an ordered directive batch to a conversation graph.
///
/// Application is synchronous and in order. A directive that fails is
/// logged and skipped; the remainder of the batch still applies.
pub fn apply_batch(graph: &mut ConversationGraph, directives: &[Directive]) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::default();
    for directive in directives {
        let result = match graph {
            ConversationGraph::Timeline(timeline_graph) => {
                timeline::apply(timeline_graph, directive)
            }
            ConversationGraph::Discussion(discussion_graph) => {
                discussion::apply(discussion_graph, directive)
            }
        };
        match result {
            Ok(()) => outcome.applied += 1,
            Err(error) => {
                warn!(kind = directive.kind(), %error, "skipping directive that could not be applied");
                outcome.skipped += 1;
            }
        }
    }
    outcome
}

/// Adds a signed delta to a counter, clamping the result at zero.
pub(crate) const fn clamped_add(current: i64, delta: i64) -> i64 {
    let updated = current.saturating_add(delta);
    if updated < 0 { 0 } else { updated }
}

/// Records a reaction, creating the content group on first use. Repeated
/// delivery is tolerated: a login already present in the group is not
/// duplicated.
pub(crate) fn push_reaction(groups: &mut Vec<ReactionGroup>, content: &str, user: Actor) {
    match groups.iter_mut().find(|group| group.content == content) {
        Some(group) => {
            if !group
                .users
                .nodes
                .iter()
                .any(|entry| entry.login == user.login)
            {
                group.users.nodes.push(user);
            }
        }
        None => groups.push(ReactionGroup {
            content: content.to_owned(),
            users: NodeCollection::from_nodes(vec![user]),
        }),
    }
}

/// Withdraws a reaction; removing the last user for a content key removes
/// the whole group.
pub(crate) fn remove_reaction(groups: &mut Vec<ReactionGroup>, content: &str, login: &str) {
    if let Some(group) = groups.iter_mut().find(|group| group.content == content) {
        group.users.nodes.retain(|entry| entry.login != login);
    }
    groups.retain(|group| group.content != content || !group.users.nodes.is_empty());
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::{ApplyOutcome, apply_batch, clamped_add};
    use crate::conversation::test_support::{
        actor, discussion, discussion_graph, note, reply_to, timeline_graph, timeline_item,
    };
    use crate::conversation::ConversationGraph;
    use crate::directive::{
        ConversationNode, ConversationReply, Directive, NodeRef, ReactionAdd,
    };

    fn discussion_nodes(graph: &ConversationGraph) -> &[crate::conversation::Discussion] {
        match graph {
            ConversationGraph::Discussion(inner) => &inner.discussions.nodes,
            ConversationGraph::Timeline(_) => panic!("expected a discussion graph"),
        }
    }

    #[test]
    fn add_node_is_idempotent_under_repeated_delivery() {
        let mut graph = discussion_graph(vec![]);
        let directive = Directive::AddNode(ConversationNode::Discussion(discussion(
            "gid://gitlab/Discussion/1",
            note("gid://gitlab/DiscussionNote/2", "octocat", "first"),
        )));

        let first = apply_batch(&mut graph, &[directive.clone()]);
        let after_first = graph.clone();
        let second = apply_batch(&mut graph, &[directive]);

        assert_eq!(first, ApplyOutcome { applied: 1, skipped: 0 });
        assert_eq!(second, ApplyOutcome { applied: 1, skipped: 0 });
        assert_eq!(graph, after_first);
        assert_eq!(discussion_nodes(&graph).len(), 1);
    }

    #[test]
    fn add_reply_rewrites_a_placeholder_thread_before_attaching() {
        let root = note("gid://gitlab/Note/555", "octocat", "root");
        let mut graph = discussion_graph(vec![discussion(
            "gid://gitlab/IndividualNoteDiscussion/777",
            root,
        )]);

        let reply = reply_to(
            "gid://gitlab/Discussion/777",
            "gid://gitlab/DiscussionNote/900",
            "hubot",
            "a reply",
        );
        let outcome = apply_batch(
            &mut graph,
            &[Directive::AddReply(ConversationReply::Discussion(reply))],
        );
        assert!(outcome.is_clean(), "unexpected skips: {outcome:?}");

        let nodes = discussion_nodes(&graph);
        let thread = nodes.first().unwrap_or_else(|| panic!("thread should survive"));
        assert_eq!(thread.id, "gid://gitlab/Discussion/777");
        assert_eq!(thread.reply_id.as_deref(), Some("gid://gitlab/Discussion/777"));
        assert!(thread.resolvable);

        let rewritten_root = thread
            .root_note()
            .unwrap_or_else(|| panic!("root note should survive"));
        assert_eq!(rewritten_root.id, "gid://gitlab/DiscussionNote/555");
        assert!(rewritten_root.resolvable);

        let replies = rewritten_root
            .replies
            .as_ref()
            .unwrap_or_else(|| panic!("reply should attach"));
        let reply_ids: Vec<&str> = replies.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(reply_ids, vec!["gid://gitlab/DiscussionNote/900"]);
    }

    #[test]
    fn add_reply_is_idempotent_under_repeated_delivery() {
        let root = note("gid://gitlab/DiscussionNote/1", "octocat", "root");
        let mut graph = discussion_graph(vec![discussion("gid://gitlab/Discussion/10", root)]);
        let reply = reply_to(
            "gid://gitlab/Discussion/10",
            "gid://gitlab/DiscussionNote/2",
            "hubot",
            "reply",
        );
        let directive = Directive::AddReply(ConversationReply::Discussion(reply));

        apply_batch(&mut graph, &[directive.clone()]);
        let after_first = graph.clone();
        apply_batch(&mut graph, &[directive]);

        assert_eq!(graph, after_first);
    }

    #[test]
    fn removing_a_root_note_with_replies_promotes_the_first_reply() {
        let mut root = note("gid://gitlab/DiscussionNote/1", "octocat", "root");
        root.position = Some(json!({"newPath": "src/lib.rs", "newLine": 4}));
        root.replies = Some(vec![
            note("gid://gitlab/DiscussionNote/2", "hubot", "reply a"),
            note("gid://gitlab/DiscussionNote/3", "octocat", "reply b"),
        ]);
        let mut graph = discussion_graph(vec![discussion("gid://gitlab/Discussion/10", root)]);

        apply_batch(
            &mut graph,
            &[Directive::RemoveNode(NodeRef {
                id: "gid://gitlab/DiscussionNote/1".to_owned(),
            })],
        );

        let nodes = discussion_nodes(&graph);
        let thread = nodes.first().unwrap_or_else(|| panic!("thread should survive"));
        assert_eq!(thread.notes.nodes.len(), 1);

        let new_root = thread
            .root_note()
            .unwrap_or_else(|| panic!("a new root should be promoted"));
        assert_eq!(new_root.id, "gid://gitlab/DiscussionNote/2");
        assert_eq!(
            new_root.position,
            Some(json!({"newPath": "src/lib.rs", "newLine": 4}))
        );

        let remaining = new_root
            .replies
            .as_ref()
            .unwrap_or_else(|| panic!("remaining replies should reattach"));
        let reply_ids: Vec<&str> = remaining.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(reply_ids, vec!["gid://gitlab/DiscussionNote/3"]);
    }

    #[test]
    fn removing_a_non_root_reply_filters_without_rerooting() {
        let mut root = note("gid://gitlab/DiscussionNote/1", "octocat", "root");
        root.replies = Some(vec![
            note("gid://gitlab/DiscussionNote/2", "hubot", "reply a"),
            note("gid://gitlab/DiscussionNote/3", "octocat", "reply b"),
        ]);
        let mut graph = discussion_graph(vec![discussion("gid://gitlab/Discussion/10", root)]);

        apply_batch(
            &mut graph,
            &[Directive::RemoveNode(NodeRef {
                id: "gid://gitlab/DiscussionNote/3".to_owned(),
            })],
        );

        let nodes = discussion_nodes(&graph);
        let thread = nodes.first().unwrap_or_else(|| panic!("thread should survive"));
        let root_note = thread
            .root_note()
            .unwrap_or_else(|| panic!("root should survive"));
        assert_eq!(root_note.id, "gid://gitlab/DiscussionNote/1");
        let replies = root_note
            .replies
            .as_ref()
            .unwrap_or_else(|| panic!("replies should survive"));
        let reply_ids: Vec<&str> = replies.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(reply_ids, vec!["gid://gitlab/DiscussionNote/2"]);
    }

    #[test]
    fn update_discussion_note_reaches_roots_and_nested_replies() {
        let mut root = note("gid://gitlab/DiscussionNote/1", "octocat", "root");
        root.replies = Some(vec![note(
            "gid://gitlab/DiscussionNote/2",
            "hubot",
            "reply before edit",
        )]);
        let mut graph = discussion_graph(vec![discussion("gid://gitlab/Discussion/10", root)]);

        let mut fields = serde_json::Map::new();
        fields.insert("body".to_owned(), json!("reply after edit"));
        apply_batch(
            &mut graph,
            &[Directive::UpdateDiscussionNote(
                crate::directive::DiscussionNoteUpdate {
                    id: "gid://gitlab/DiscussionNote/2".to_owned(),
                    discussion: NodeRef {
                        id: "gid://gitlab/Discussion/10".to_owned(),
                    },
                    fields,
                },
            )],
        );

        let nodes = discussion_nodes(&graph);
        let reply = nodes
            .first()
            .and_then(|thread| thread.root_note())
            .and_then(|root_note| root_note.replies.as_ref())
            .and_then(|replies| replies.first())
            .unwrap_or_else(|| panic!("reply should survive"));
        assert_eq!(reply.body.as_deref(), Some("reply after edit"));
    }

    #[test]
    fn counter_deltas_never_drive_the_counter_negative() {
        assert_eq!(clamped_add(0, -1), 0);
        assert_eq!(clamped_add(2, -5), 0);
        assert_eq!(clamped_add(2, 3), 5);

        let mut graph = discussion_graph(vec![]);
        apply_batch(
            &mut graph,
            &[
                Directive::UpdateReviewCommentsCount(-1),
                Directive::UpdateReviewCommentsCount(2),
                Directive::UpdateReviewCommentsCount(-5),
            ],
        );
        match graph {
            ConversationGraph::Discussion(inner) => {
                assert_eq!(inner.user_discussions_count, 0);
            }
            ConversationGraph::Timeline(_) => panic!("expected a discussion graph"),
        }
    }

    #[test]
    fn removing_the_last_reaction_user_drops_the_group() {
        let mut graph = timeline_graph(vec![]);
        apply_batch(
            &mut graph,
            &[Directive::AddReaction(ReactionAdd {
                subject_id: None,
                content: "thumbsup".to_owned(),
                user: actor("octocat"),
            })],
        );

        apply_batch(
            &mut graph,
            &[Directive::RemoveReaction(crate::directive::ReactionRemove {
                subject_id: None,
                content: "thumbsup".to_owned(),
                login: "octocat".to_owned(),
            })],
        );

        match graph {
            ConversationGraph::Timeline(inner) => assert!(inner.reaction_groups.is_empty()),
            ConversationGraph::Discussion(_) => panic!("expected a timeline graph"),
        }
    }

    #[test]
    fn a_malformed_directive_skips_without_aborting_the_batch() {
        let mut graph = timeline_graph(vec![]);
        let batch = vec![
            // Discussion node against a timeline graph: family mismatch.
            Directive::AddNode(ConversationNode::Discussion(discussion(
                "gid://gitlab/Discussion/1",
                note("gid://gitlab/DiscussionNote/2", "octocat", "first"),
            ))),
            Directive::AddNode(ConversationNode::Timeline(timeline_item(
                "c1",
                "IssueComment",
                "hello",
            ))),
        ];

        let outcome = apply_batch(&mut graph, &batch);

        assert_eq!(outcome, ApplyOutcome { applied: 1, skipped: 1 });
        match graph {
            ConversationGraph::Timeline(inner) => {
                assert_eq!(inner.timeline_items.nodes.len(), 1);
            }
            ConversationGraph::Discussion(_) => panic!("expected a timeline graph"),
        }
    }

    #[test]
    fn update_pull_request_refills_nodes_arrays_and_sets_scalars() {
        let mut graph = timeline_graph(vec![]);
        let fields = match json!({
            "title": "new title",
            "labels": {"nodes": [{"id": "l1", "title": "bug"}]}
        }) {
            Value::Object(map) => map,
            other => panic!("expected object, got {other:?}"),
        };

        apply_batch(&mut graph, &[Directive::UpdatePullRequest(fields)]);

        match graph {
            ConversationGraph::Timeline(inner) => {
                assert_eq!(inner.title.as_deref(), Some("new title"));
                let titles: Vec<&str> = inner
                    .labels
                    .nodes
                    .iter()
                    .map(|label| label.title.as_str())
                    .collect();
                assert_eq!(titles, vec!["bug"]);
            }
            ConversationGraph::Discussion(_) => panic!("expected a timeline graph"),
        }
    }
}
