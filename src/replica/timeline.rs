//! Directive application for the timeline family.
//!
//! The timeline model keeps a single owning collection: items live on the
//! flat timeline, review comments live inside their review item, and replies
//! live inside their parent comment. Reaction and resolution deltas locate
//! their subject by walking that one hierarchy, so there are no embedded
//! duplicate copies to keep mirrored.

use tracing::warn;

use crate::conversation::{Actor, ReactionGroup, ReviewComment, TimelineGraph};
use crate::directive::{
    ConversationNode, ConversationReply, Directive, NodeUpdate, ThreadResolution, TimelineReply,
};

use super::merge::merge_fields;
use super::{ApplyError, clamped_add, push_reaction, remove_reaction};

/// Applies one directive to a timeline-family graph.
pub(super) fn apply(graph: &mut TimelineGraph, directive: &Directive) -> Result<(), ApplyError> {
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
        Directive::UpdateDiscussionNote(_) => Err(ApplyError::FamilyMismatch {
            directive: "updateDiscussionNote",
        }),
        Directive::AddReply(ConversationReply::Timeline(reply)) => {
            add_reply(graph, reply);
            Ok(())
        }
        Directive::AddReply(ConversationReply::Discussion(_)) => Err(ApplyError::FamilyMismatch {
            directive: "addReply",
        }),
        Directive::AddReaction(reaction) => {
            add_reaction(graph, reaction.subject_id.as_deref(), &reaction.content, &reaction.user);
            Ok(())
        }
        Directive::RemoveReaction(reaction) => {
            withdraw_reaction(
                graph,
                reaction.subject_id.as_deref(),
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
            graph.review_comments_count = clamped_add(graph.review_comments_count, *delta);
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

fn add_node(graph: &mut TimelineGraph, node: &ConversationNode) -> Result<(), ApplyError> {
    let ConversationNode::Timeline(item) = node else {
        return Err(ApplyError::FamilyMismatch {
            directive: "addNode",
        });
    };
    let exists = graph
        .timeline_items
        .nodes
        .iter()
        .any(|existing| existing.id == item.id);
    if !exists {
        graph.timeline_items.nodes.push(item.clone());
    }
    Ok(())
}

/// Removes an item from the timeline, or a comment/reply from inside any
/// review item.
fn remove_node(graph: &mut TimelineGraph, id: &str) {
    graph.timeline_items.nodes.retain(|item| item.id != id);
    for item in &mut graph.timeline_items.nodes {
        let Some(comments) = item.comments.as_mut() else {
            continue;
        };
        comments.nodes.retain(|comment| comment.id != id);
        for comment in &mut comments.nodes {
            comment.replies.retain(|reply| reply.id != id);
        }
    }
}

/// Shallow-merges fields into a timeline item by id, falling back to a
/// review comment (or one of its replies) when no item matches.
fn update_node(graph: &mut TimelineGraph, update: &NodeUpdate) -> Result<(), ApplyError> {
    if let Some(item) = graph
        .timeline_items
        .nodes
        .iter_mut()
        .find(|item| item.id == update.id)
    {
        return merge_fields(item, &update.fields, &["id"]);
    }

    match find_comment_mut(graph, &update.id) {
        Some(comment) => merge_fields(comment, &update.fields, &["id"]),
        None => Ok(()),
    }
}

fn add_reply(graph: &mut TimelineGraph, reply: &TimelineReply) {
    let Some(parent) = find_comment_mut(graph, &reply.parent_id) else {
        warn!(parent_id = %reply.parent_id, "reply targets an unknown review comment");
        return;
    };
    if !parent
        .replies
        .iter()
        .any(|existing| existing.id == reply.comment.id)
    {
        parent.replies.push(reply.comment.clone());
    }
}

fn add_reaction(graph: &mut TimelineGraph, subject_id: Option<&str>, content: &str, user: &Actor) {
    match locate_reaction_groups(graph, subject_id) {
        Some(groups) => push_reaction(groups, content, user.clone()),
        None => warn!(subject_id = ?subject_id, "reaction targets an unknown node"),
    }
}

fn withdraw_reaction(
    graph: &mut TimelineGraph,
    subject_id: Option<&str>,
    content: &str,
    login: &str,
) {
    match locate_reaction_groups(graph, subject_id) {
        Some(groups) => remove_reaction(groups, content, login),
        None => warn!(subject_id = ?subject_id, "reaction withdrawal targets an unknown node"),
    }
}

/// Finds the reaction-group list owning the subject: the pull request
/// itself, a timeline item, or a review comment/reply.
fn locate_reaction_groups<'a>(
    graph: &'a mut TimelineGraph,
    subject_id: Option<&str>,
) -> Option<&'a mut Vec<ReactionGroup>> {
    let Some(id) = subject_id else {
        return Some(&mut graph.reaction_groups);
    };

    let item_exists = graph
        .timeline_items
        .nodes
        .iter()
        .any(|item| item.id == id);
    if item_exists {
        return graph
            .timeline_items
            .nodes
            .iter_mut()
            .find(|item| item.id == id)
            .map(|item| &mut item.reaction_groups);
    }

    find_comment_mut(graph, id).map(|comment| &mut comment.reaction_groups)
}

/// Finds a review comment or reply by id across every review item.
fn find_comment_mut<'a>(graph: &'a mut TimelineGraph, id: &str) -> Option<&'a mut ReviewComment> {
    for item in &mut graph.timeline_items.nodes {
        let Some(comments) = item.comments.as_mut() else {
            continue;
        };
        for comment in &mut comments.nodes {
            if comment.id == id {
                return Some(comment);
            }
            if let Some(reply) = comment.replies.iter_mut().find(|reply| reply.id == id) {
                return Some(reply);
            }
        }
    }
    None
}

/// Merges resolution fields into the thread item and every comment that
/// belongs to the thread.
fn resolve_thread(
    graph: &mut TimelineGraph,
    resolution: &ThreadResolution,
) -> Result<(), ApplyError> {
    if let Some(item) = graph
        .timeline_items
        .nodes
        .iter_mut()
        .find(|item| item.id == resolution.thread_id)
    {
        merge_fields(item, &resolution.fields, &["id"])?;
    }

    for item in &mut graph.timeline_items.nodes {
        let Some(comments) = item.comments.as_mut() else {
            continue;
        };
        for comment in &mut comments.nodes {
            if comment.thread_id.as_deref() == Some(resolution.thread_id.as_str()) {
                merge_fields(comment, &resolution.fields, &["id"])?;
            }
        }
    }
    Ok(())
}

fn add_approvers(existing: &mut Vec<Actor>, approvers: &[Actor]) {
    for approver in approvers {
        if !existing.iter().any(|entry| entry.login == approver.login) {
            existing.push(approver.clone());
        }
    }
}
