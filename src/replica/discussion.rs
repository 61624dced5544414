//! Directive application for the discussion-tree family.
//!
//! Two structural quirks are load-bearing here and must not be simplified:
//!
//! 1. When the first real reply arrives for a discussion that still carries
//!    its placeholder "individual note" identity, the cached node and its
//!    root note are rewritten to the resolvable discussion identity before
//!    the reply attaches (see [`super::rewrite`]).
//! 2. Removing the root note of a discussion that still has replies must
//!    not delete the thread: the first reply is promoted to become the new
//!    root, inheriting the removed root's diff position, and the remaining
//!    replies reattach under it.

use tracing::warn;

use crate::conversation::{Actor, Discussion, DiscussionGraph, DiscussionRef, Note};
use crate::directive::{
    ConversationNode, ConversationReply, Directive, DiscussionNoteUpdate, NodeUpdate,
    ThreadResolution,
};

use super::merge::merge_fields;
use super::{ApplyError, clamped_add, push_reaction, remove_reaction, rewrite};

/// Applies one directive to a discussion-family graph.
pub(super) fn apply(graph: &mut DiscussionGraph, directive: &Directive) -> Result<(), ApplyError> {
    match directive {
        Directive::AddNode(node) => add_node(graph, node),
        Directive::AddNodes(nodes) => {
            for node in nodes {
                add_node(graph, node)?;
            }
            Ok(())
        }
        Directive::RemoveNode(node_ref) => {
            remove_node(graph, &node_ref.id);
            Ok(())
        }
        Directive::UpdateNode(update) => update_node(graph, update),
        Directive::UpdateDiscussionNote(update) => update_discussion_note(graph, update),
        Directive::AddReply(ConversationReply::Discussion(reply)) => add_reply(graph, reply),
        Directive::AddReply(ConversationReply::Timeline(_)) => Err(ApplyError::FamilyMismatch {
            directive: "addReply",
        }),
        Directive::AddReaction(reaction) => {
            push_reaction(
                &mut graph.reaction_groups,
                &reaction.content,
                reaction.user.clone(),
            );
            Ok(())
        }
        Directive::RemoveReaction(reaction) => {
            remove_reaction(
                &mut graph.reaction_groups,
                &reaction.content,
                &reaction.login,
            );
            Ok(())
        }
        Directive::AddApprovedBy(approvers) => {
            add_approvers(&mut graph.approved_by.nodes, approvers);
            Ok(())
        }
        Directive::RemoveApprovedBy(approvers) => {
            graph.approved_by.replace(approvers.iter().cloned());
            Ok(())
        }
        Directive::AddPendingReview(review) => {
            graph.pending_review = Some(review.clone());
            Ok(())
        }
        Directive::RemovePendingReview => {
            graph.pending_review = None;
            Ok(())
        }
        Directive::UpdateReviewCommentsCount(delta) => {
            graph.user_discussions_count = clamped_add(graph.user_discussions_count, *delta);
            Ok(())
        }
        Directive::UpdatePendingReviewCommentsCount(delta) => {
            if let Some(pending) = graph.pending_review.as_mut() {
                pending.comment_count = clamped_add(pending.comment_count, *delta);
            }
            Ok(())
        }
        Directive::SetLabels(labels) => {
            graph.labels.replace(labels.nodes.iter().cloned());
            Ok(())
        }
        Directive::UpdateReviewers(reviewers) => {
            graph.reviewers.replace(reviewers.iter().cloned());
            Ok(())
        }
        Directive::UpdatePullRequest(fields) => merge_fields(graph, fields, &[]),
        Directive::ResolveReviewThread(resolution)
        | Directive::UnresolveReviewThread(resolution) => resolve_thread(graph, resolution),
    }
}

fn add_node(graph: &mut DiscussionGraph, node: &ConversationNode) -> Result<(), ApplyError> {
    let ConversationNode::Discussion(discussion) = node else {
        return Err(ApplyError::FamilyMismatch {
            directive: "addNode",
        });
    };
    let exists = graph
        .discussions
        .nodes
        .iter()
        .any(|existing| existing.id == discussion.id);
    if !exists {
        graph.discussions.nodes.push(discussion.clone());
    }
    Ok(())
}

/// Removes a note or a whole discussion by id, re-rooting threads whose
/// root note is removed while replies remain.
fn remove_node(graph: &mut DiscussionGraph, id: &str) {
    if let Some(index) = graph
        .discussions
        .nodes
        .iter()
        .position(|discussion| discussion.id == id)
    {
        graph.discussions.nodes.remove(index);
        return;
    }

    for discussion in &mut graph.discussions.nodes {
        remove_note_from_discussion(discussion, id);
    }
}

fn remove_note_from_discussion(discussion: &mut Discussion, id: &str) {
    let root_matches = discussion
        .root_note()
        .is_some_and(|root| root.id == id);

    if root_matches {
        let has_replies = discussion
            .root_note()
            .and_then(|root| root.replies.as_ref())
            .is_some_and(|replies| !replies.is_empty());
        if has_replies {
            reroot(discussion);
        } else {
            discussion.notes.nodes.retain(|note_entry| note_entry.id != id);
        }
        return;
    }

    discussion.notes.nodes.retain(|note_entry| note_entry.id != id);
    for note_entry in &mut discussion.notes.nodes {
        if let Some(replies) = note_entry.replies.as_mut() {
            replies.retain(|reply| reply.id != id);
        }
    }
}

/// Promotes the first reply of a root note into the new thread root. Every
/// sibling reply inherits the removed root's diff position so the thread
/// stays anchored to the same location.
fn reroot(discussion: &mut Discussion) {
    let Some(root) = discussion.notes.nodes.first_mut() else {
        return;
    };
    let position = root.position.clone();
    let Some(mut replies) = root.replies.take() else {
        return;
    };
    for reply in &mut replies {
        reply.position = position.clone();
    }
    if replies.is_empty() {
        return;
    }
    let mut new_root = replies.remove(0);
    new_root.replies = Some(replies);
    if let Some(slot) = discussion.notes.nodes.first_mut() {
        *slot = new_root;
    }
}

fn update_node(graph: &mut DiscussionGraph, update: &NodeUpdate) -> Result<(), ApplyError> {
    let Some(discussion) = graph
        .discussions
        .nodes
        .iter_mut()
        .find(|discussion| discussion.id == update.id)
    else {
        return Ok(());
    };
    merge_discussion_fields(discussion, &update.fields)
}

/// Merges fields into a discussion node. The `notes` key is special: each
/// incoming note merges into the existing note with the same id rather than
/// replacing the list, because resolution payloads carry skeletal notes
/// (`id`, `resolved`, `resolvable`) that would otherwise wipe note bodies.
fn merge_discussion_fields(
    discussion: &mut Discussion,
    fields: &serde_json::Map<String, serde_json::Value>,
) -> Result<(), ApplyError> {
    if let Some(notes_value) = fields.get("notes")
        && let Some(incoming) = notes_value.get("nodes").and_then(|nodes| nodes.as_array())
    {
        for incoming_note in incoming {
            let Some(incoming_fields) = incoming_note.as_object() else {
                continue;
            };
            let Some(incoming_id) = incoming_fields.get("id").and_then(|id| id.as_str()) else {
                continue;
            };
            if let Some(existing) = discussion
                .notes
                .nodes
                .iter_mut()
                .find(|note_entry| note_entry.id == incoming_id)
            {
                merge_fields(existing, incoming_fields, &["id"])?;
            }
        }
    }

    merge_fields(discussion, fields, &["id", "notes"])
}

fn update_discussion_note(
    graph: &mut DiscussionGraph,
    update: &DiscussionNoteUpdate,
) -> Result<(), ApplyError> {
    let Some(discussion) = graph
        .discussions
        .nodes
        .iter_mut()
        .find(|discussion| discussion.id == update.discussion.id)
    else {
        return Ok(());
    };

    if let Some(note_entry) = discussion
        .notes
        .nodes
        .iter_mut()
        .find(|note_entry| note_entry.id == update.id)
    {
        return merge_fields(note_entry, &update.fields, &["id", "discussion"]);
    }

    // The note may instead be one of the root note's nested replies.
    let Some(replies) = discussion
        .root_note_mut()
        .and_then(|root| root.replies.as_mut())
    else {
        return Ok(());
    };
    match replies.iter_mut().find(|reply| reply.id == update.id) {
        Some(reply) => merge_fields(reply, &update.fields, &["id", "discussion"]),
        None => Ok(()),
    }
}

fn add_reply(graph: &mut DiscussionGraph, reply: &Note) -> Result<(), ApplyError> {
    let Some(discussion_ref) = reply.discussion.as_ref() else {
        return Err(ApplyError::InvalidMerge {
            message: "reply note carries no discussion back-reference".to_owned(),
        });
    };

    if rewrite::is_discussion_id(&discussion_ref.id) {
        rewrite_placeholder_thread(graph, discussion_ref);
    }

    let Some(discussion) = graph
        .discussions
        .nodes
        .iter_mut()
        .find(|discussion| discussion.id == discussion_ref.id)
    else {
        warn!(discussion_id = %discussion_ref.id, "reply targets an unknown discussion");
        return Ok(());
    };
    let Some(root) = discussion.notes.nodes.first_mut() else {
        warn!(discussion_id = %discussion_ref.id, "reply targets a discussion with no root note");
        return Ok(());
    };

    match root.replies.as_mut() {
        Some(replies) => {
            if !replies.iter().any(|existing| existing.id == reply.id) {
                replies.push(reply.clone());
            }
        }
        None => root.replies = Some(vec![reply.clone()]),
    }
    Ok(())
}

/// First-real-reply rewrite: a placeholder thread whose trailing id segment
/// matches the incoming discussion id adopts the resolvable identity, and
/// its root note's id swaps the note kind-prefix for the discussion-note
/// one.
fn rewrite_placeholder_thread(graph: &mut DiscussionGraph, discussion_ref: &DiscussionRef) {
    let Some(node) = graph
        .discussions
        .nodes
        .iter_mut()
        .find(|candidate| rewrite::same_thread(&candidate.id, &discussion_ref.id))
    else {
        return;
    };

    node.id = discussion_ref.id.clone();
    node.reply_id = Some(discussion_ref.id.clone());
    node.resolvable = true;
    if let Some(root) = node.notes.nodes.first_mut() {
        root.id = rewrite::promote_note_id(&root.id);
        root.resolvable = true;
        root.discussion = Some(discussion_ref.clone());
    }
}

/// Thread resolution merges the fields into the matching discussion node,
/// reusing the per-note merge so skeletal resolution notes do not wipe
/// bodies.
fn resolve_thread(
    graph: &mut DiscussionGraph,
    resolution: &ThreadResolution,
) -> Result<(), ApplyError> {
    let Some(discussion) = graph
        .discussions
        .nodes
        .iter_mut()
        .find(|discussion| discussion.id == resolution.thread_id)
    else {
        return Ok(());
    };
    merge_discussion_fields(discussion, &resolution.fields)
}

fn add_approvers(existing: &mut Vec<Actor>, approvers: &[Actor]) {
    for approver in approvers {
        if !existing.iter().any(|entry| entry.login == approver.login) {
            existing.push(approver.clone());
        }
    }
}
