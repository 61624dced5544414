//! Compiles mutation payloads into directive batches.
//!
//! The gateway returns a raw payload per operation; the compiler turns it
//! into the minimal ordered delta both replicas apply. Payload contracts are
//! per operation and family and documented on [`MutationOperation`]; a
//! payload that does not match its contract fails compilation with a typed
//! error, and no directives are produced for the mutation.
//!
//! Every compiled batch leads with an `updatePullRequest { updatedAt }`
//! stamp so replicas advance their gap-corroboration timestamp on each
//! successful mutation.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::conversation::{Actor, Discussion, GraphFamily, Label, NodeCollection, Note, ReviewComment, TimelineItem};
use crate::directive::{
    ConversationNode, ConversationReply, Directive, DiscussionNoteUpdate, NodeRef, NodeUpdate,
    ReactionAdd, ReactionRemove, ThreadResolution, TimelineReply,
};
use crate::review::PendingReviewComment;

/// Errors surfaced while compiling a mutation payload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    /// The payload did not match the operation's contract.
    #[error("payload for {operation} is malformed: {message}")]
    MalformedPayload {
        /// Operation whose payload failed to parse.
        operation: &'static str,
        /// Parse error detail.
        message: String,
    },
}

/// Review submission verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewEvent {
    /// Submit as a plain comment review.
    Comment,
    /// Submit approving the pull request.
    Approve,
    /// Submit requesting changes.
    RequestChanges,
}

impl ReviewEvent {
    /// Returns the wire value sent to the gateway.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Comment => "COMMENT",
            Self::Approve => "APPROVE",
            Self::RequestChanges => "REQUEST_CHANGES",
        }
    }
}

/// One gateway-backed mutation, with its typed parameters.
///
/// Payload contracts (what the gateway must return for compilation to
/// succeed) are listed per variant; node payloads are family-shaped.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOperation {
    /// Create a top-level comment. Payload: the created node (a discussion
    /// wrapping the note, or a timeline item).
    CreateComment {
        /// Comment text.
        text: String,
    },
    /// Reply to an existing thread. Payload: the created reply (a note
    /// carrying its discussion back-reference, or `{parentId, comment}`).
    CreateCommentReply {
        /// Thread being replied to.
        parent_id: String,
        /// Reply text.
        text: String,
    },
    /// Edit an existing comment. Payload: the updated fields, carrying the
    /// comment `id` (and its `discussion` for the discussion family).
    UpdateComment {
        /// Comment being edited.
        comment_id: String,
        /// Replacement text.
        text: String,
    },
    /// Delete a comment. Payload: ignored.
    DeleteComment {
        /// Comment being removed.
        comment_id: String,
    },
    /// Toggle a reaction. Payload: optionally `{user}`, the reacting user
    /// as recorded by the provider; otherwise `actor` is recorded.
    ToggleReaction {
        /// Target node; `None` reacts to the pull request itself.
        subject_id: Option<String>,
        /// Reaction content key.
        content: String,
        /// Whether the reaction is being added or withdrawn.
        enable: bool,
        /// The acting user.
        actor: Actor,
    },
    /// Replace the reviewer set. Payload: `{reviewers: [..]}`.
    SetReviewers {
        /// Reviewer ids to request.
        reviewer_ids: Vec<String>,
    },
    /// Replace the assignee set. Payload: `{assignees: [..]}`.
    SetAssignees {
        /// Assignee logins.
        assignee_logins: Vec<String>,
    },
    /// Replace the label set. Payload: `{labels: {nodes: [..]}}`.
    SetLabels {
        /// Label ids to apply.
        label_ids: Vec<String>,
    },
    /// Set or clear the milestone. Payload: `{milestone: {..} | null}`.
    SetMilestone {
        /// Milestone id; `None` clears it.
        milestone_id: Option<String>,
    },
    /// Toggle the caller's approval. Payload: `{approvedBy: [..]}`, the
    /// post-mutation approver list.
    ToggleApproval {
        /// Whether approval is being granted or revoked.
        enable: bool,
    },
    /// Resolve a review thread. Payload: the post-resolution thread fields
    /// (carrying `id` for the discussion family).
    ResolveThread {
        /// Thread being resolved.
        thread_id: String,
    },
    /// Unresolve a review thread. Payload: as for resolution.
    UnresolveThread {
        /// Thread being unresolved.
        thread_id: String,
    },
    /// Submit the staged review. Payload: `{nodes: [..]}`, the created
    /// family-shaped nodes.
    SubmitReview {
        /// Optional summary text.
        text: Option<String>,
        /// Submission verdict.
        event: ReviewEvent,
        /// The staged comments being submitted; their synthetic nodes are
        /// removed in favour of the created ones.
        comments: Vec<PendingReviewComment>,
    },
}

impl MutationOperation {
    /// Returns the wire operation name sent to the gateway.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateComment { .. } => "createComment",
            Self::CreateCommentReply { .. } => "createCommentReply",
            Self::UpdateComment { .. } => "updateComment",
            Self::DeleteComment { .. } => "deleteComment",
            Self::ToggleReaction { .. } => "toggleReaction",
            Self::SetReviewers { .. } => "setReviewers",
            Self::SetAssignees { .. } => "setAssignees",
            Self::SetLabels { .. } => "setLabels",
            Self::SetMilestone { .. } => "setMilestone",
            Self::ToggleApproval { .. } => "toggleApproval",
            Self::ResolveThread { .. } => "resolveThread",
            Self::UnresolveThread { .. } => "unresolveThread",
            Self::SubmitReview { .. } => "submitReview",
        }
    }

    /// Builds the operation parameters sent to the gateway.
    #[must_use]
    pub fn params(&self) -> Value {
        match self {
            Self::CreateComment { text } => serde_json::json!({ "text": text }),
            Self::CreateCommentReply { parent_id, text } => {
                serde_json::json!({ "parentId": parent_id, "text": text })
            }
            Self::UpdateComment { comment_id, text } => {
                serde_json::json!({ "commentId": comment_id, "text": text })
            }
            Self::DeleteComment { comment_id } => {
                serde_json::json!({ "commentId": comment_id })
            }
            Self::ToggleReaction {
                subject_id,
                content,
                enable,
                actor,
            } => serde_json::json!({
                "subjectId": subject_id,
                "content": content,
                "enable": enable,
                "login": actor.login,
            }),
            Self::SetReviewers { reviewer_ids } => {
                serde_json::json!({ "reviewerIds": reviewer_ids })
            }
            Self::SetAssignees { assignee_logins } => {
                serde_json::json!({ "assigneeLogins": assignee_logins })
            }
            Self::SetLabels { label_ids } => serde_json::json!({ "labelIds": label_ids }),
            Self::SetMilestone { milestone_id } => {
                serde_json::json!({ "milestoneId": milestone_id })
            }
            Self::ToggleApproval { enable } => serde_json::json!({ "enable": enable }),
            Self::ResolveThread { thread_id } => serde_json::json!({ "threadId": thread_id }),
            Self::UnresolveThread { thread_id } => serde_json::json!({ "threadId": thread_id }),
            Self::SubmitReview {
                text,
                event,
                comments,
            } => serde_json::json!({
                "text": text,
                "event": event.as_str(),
                "comments": comments,
            }),
        }
    }
}

/// Compiles raw mutation payloads into directive batches for one family.
#[derive(Debug, Clone, Copy)]
pub struct DirectiveCompiler {
    family: GraphFamily,
}

impl DirectiveCompiler {
    /// Creates a compiler for the given graph family.
    #[must_use]
    pub const fn new(family: GraphFamily) -> Self {
        Self { family }
    }

    /// Compiles one mutation's payload into its directive batch.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::MalformedPayload`] when the payload does not
    /// match the operation's contract; no directives are produced then.
    pub fn compile(
        &self,
        operation: &MutationOperation,
        payload: &Value,
        issued_at: DateTime<Utc>,
    ) -> Result<Vec<Directive>, CompileError> {
        let stamp = Directive::updated_at_stamp(issued_at);
        match operation {
            MutationOperation::CreateComment { .. } => {
                Ok(vec![stamp, Directive::AddNode(self.node(operation, payload)?)])
            }
            MutationOperation::CreateCommentReply { parent_id, .. } => Ok(vec![
                stamp,
                Directive::UpdateReviewCommentsCount(1),
                Directive::AddReply(self.reply(operation, parent_id, payload)?),
            ]),
            MutationOperation::UpdateComment { comment_id, .. } => {
                Ok(vec![stamp, self.comment_update(operation, comment_id, payload)?])
            }
            MutationOperation::DeleteComment { comment_id } => Ok(vec![
                stamp,
                Directive::RemoveNode(NodeRef {
                    id: comment_id.clone(),
                }),
                Directive::UpdateReviewCommentsCount(-1),
            ]),
            MutationOperation::ToggleReaction {
                subject_id,
                content,
                enable,
                actor,
            } => {
                let reaction = if *enable {
                    Directive::AddReaction(ReactionAdd {
                        subject_id: subject_id.clone(),
                        content: content.clone(),
                        user: payload_user(payload).unwrap_or_else(|| actor.clone()),
                    })
                } else {
                    Directive::RemoveReaction(ReactionRemove {
                        subject_id: subject_id.clone(),
                        content: content.clone(),
                        login: actor.login.clone(),
                    })
                };
                Ok(vec![stamp, reaction])
            }
            MutationOperation::SetReviewers { .. } => {
                let reviewers: Vec<Actor> = field(operation, payload, "reviewers")?;
                Ok(vec![stamp, Directive::UpdateReviewers(reviewers)])
            }
            MutationOperation::SetAssignees { .. } => {
                let assignees: Vec<Actor> = field(operation, payload, "assignees")?;
                let mut fields = stamp_fields(issued_at);
                fields.insert(
                    "assignees".to_owned(),
                    serde_json::json!({ "nodes": assignees }),
                );
                Ok(vec![Directive::UpdatePullRequest(fields)])
            }
            MutationOperation::SetLabels { .. } => {
                let labels: NodeCollection<Label> = field(operation, payload, "labels")?;
                Ok(vec![stamp, Directive::SetLabels(labels)])
            }
            MutationOperation::SetMilestone { .. } => {
                let mut fields = stamp_fields(issued_at);
                fields.insert(
                    "milestone".to_owned(),
                    payload.get("milestone").cloned().unwrap_or(Value::Null),
                );
                Ok(vec![Directive::UpdatePullRequest(fields)])
            }
            MutationOperation::ToggleApproval { enable } => {
                let approvers: Vec<Actor> = field(operation, payload, "approvedBy")?;
                let approval = if *enable {
                    Directive::AddApprovedBy(approvers)
                } else {
                    Directive::RemoveApprovedBy(approvers)
                };
                Ok(vec![stamp, approval])
            }
            MutationOperation::ResolveThread { thread_id } => {
                Ok(vec![stamp, self.thread_directive(operation, thread_id, payload, true)?])
            }
            MutationOperation::UnresolveThread { thread_id } => {
                Ok(vec![stamp, self.thread_directive(operation, thread_id, payload, false)?])
            }
            MutationOperation::SubmitReview { comments, .. } => {
                let created: Vec<ConversationNode> = self.nodes(operation, payload)?;
                let mut batch = vec![stamp];
                batch.extend(comments.iter().map(|comment| {
                    Directive::RemoveNode(NodeRef {
                        id: comment.id.clone(),
                    })
                }));
                batch.push(Directive::AddNodes(created));
                batch.push(Directive::RemovePendingReview);
                Ok(batch)
            }
        }
    }

    fn node(
        &self,
        operation: &MutationOperation,
        payload: &Value,
    ) -> Result<ConversationNode, CompileError> {
        match self.family {
            GraphFamily::Discussion => decode::<Discussion>(operation, payload.clone())
                .map(ConversationNode::Discussion),
            GraphFamily::Timeline => {
                decode::<TimelineItem>(operation, payload.clone()).map(ConversationNode::Timeline)
            }
        }
    }

    fn nodes(
        &self,
        operation: &MutationOperation,
        payload: &Value,
    ) -> Result<Vec<ConversationNode>, CompileError> {
        let raw = payload
            .get("nodes")
            .cloned()
            .ok_or_else(|| malformed(operation, "payload carries no \"nodes\" array"))?;
        let Value::Array(entries) = raw else {
            return Err(malformed(operation, "\"nodes\" is not an array"));
        };
        entries
            .into_iter()
            .map(|entry| self.node(operation, &entry))
            .collect()
    }

    fn reply(
        &self,
        operation: &MutationOperation,
        parent_id: &str,
        payload: &Value,
    ) -> Result<ConversationReply, CompileError> {
        match self.family {
            GraphFamily::Discussion => {
                let reply: Note = decode(operation, payload.clone())?;
                if reply.discussion.is_none() {
                    return Err(malformed(
                        operation,
                        "reply note carries no discussion back-reference",
                    ));
                }
                Ok(ConversationReply::Discussion(reply))
            }
            GraphFamily::Timeline => {
                let comment: ReviewComment = match payload.get("comment") {
                    Some(raw) => decode(operation, raw.clone())?,
                    None => decode(operation, payload.clone())?,
                };
                Ok(ConversationReply::Timeline(TimelineReply {
                    parent_id: parent_id.to_owned(),
                    comment,
                }))
            }
        }
    }

    fn comment_update(
        &self,
        operation: &MutationOperation,
        comment_id: &str,
        payload: &Value,
    ) -> Result<Directive, CompileError> {
        match self.family {
            GraphFamily::Discussion => {
                let mut update: DiscussionNoteUpdate = decode(operation, payload.clone())?;
                if update.id.is_empty() {
                    update.id = comment_id.to_owned();
                }
                Ok(Directive::UpdateDiscussionNote(update))
            }
            GraphFamily::Timeline => {
                let fields = object_fields(operation, payload)?;
                Ok(Directive::UpdateNode(NodeUpdate {
                    id: comment_id.to_owned(),
                    fields: without_key(fields, "id"),
                }))
            }
        }
    }

    fn thread_directive(
        &self,
        operation: &MutationOperation,
        thread_id: &str,
        payload: &Value,
        resolve: bool,
    ) -> Result<Directive, CompileError> {
        let fields = object_fields(operation, payload)?;
        match self.family {
            GraphFamily::Discussion => Ok(Directive::UpdateNode(NodeUpdate {
                id: thread_id.to_owned(),
                fields: without_key(fields, "id"),
            })),
            GraphFamily::Timeline => {
                let resolution = ThreadResolution {
                    thread_id: thread_id.to_owned(),
                    fields: without_key(fields, "id"),
                };
                if resolve {
                    Ok(Directive::ResolveReviewThread(resolution))
                } else {
                    Ok(Directive::UnresolveReviewThread(resolution))
                }
            }
        }
    }
}

fn stamp_fields(issued_at: DateTime<Utc>) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(
        "updatedAt".to_owned(),
        Value::String(issued_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
    );
    fields
}

fn decode<T: DeserializeOwned>(
    operation: &MutationOperation,
    payload: Value,
) -> Result<T, CompileError> {
    serde_json::from_value(payload).map_err(|error| malformed(operation, &error.to_string()))
}

fn field<T: DeserializeOwned>(
    operation: &MutationOperation,
    payload: &Value,
    key: &'static str,
) -> Result<T, CompileError> {
    let raw = payload
        .get(key)
        .cloned()
        .ok_or_else(|| malformed(operation, &format!("payload carries no \"{key}\" key")))?;
    decode(operation, raw)
}

fn object_fields(
    operation: &MutationOperation,
    payload: &Value,
) -> Result<Map<String, Value>, CompileError> {
    payload
        .as_object()
        .cloned()
        .ok_or_else(|| malformed(operation, "payload is not an object"))
}

fn without_key(mut fields: Map<String, Value>, key: &str) -> Map<String, Value> {
    fields.remove(key);
    fields
}

fn payload_user(payload: &Value) -> Option<Actor> {
    #[derive(Deserialize)]
    struct UserEnvelope {
        user: Actor,
    }
    serde_json::from_value::<UserEnvelope>(payload.clone())
        .map(|envelope| envelope.user)
        .ok()
}

fn malformed(operation: &MutationOperation, message: &str) -> CompileError {
    CompileError::MalformedPayload {
        operation: operation.name(),
        message: message.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use serde_json::json;

    use super::{CompileError, DirectiveCompiler, MutationOperation};
    use crate::conversation::GraphFamily;
    use crate::conversation::test_support::actor;
    use crate::directive::{ConversationNode, ConversationReply, Directive};

    fn issued_at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-08-01T10:00:00Z")
            .map(|stamp| stamp.with_timezone(&Utc))
            .unwrap_or_else(|error| panic!("timestamp should parse: {error}"))
    }

    #[test]
    fn create_comment_compiles_to_a_stamp_and_an_add_node() {
        let compiler = DirectiveCompiler::new(GraphFamily::Discussion);
        let payload = json!({
            "id": "gid://gitlab/IndividualNoteDiscussion/777",
            "notes": {"nodes": [{
                "id": "gid://gitlab/Note/555",
                "author": {"login": "octocat"},
                "body": "first comment"
            }]}
        });

        let batch = compiler
            .compile(
                &MutationOperation::CreateComment {
                    text: "first comment".to_owned(),
                },
                &payload,
                issued_at(),
            )
            .unwrap_or_else(|error| panic!("compile should succeed: {error}"));

        let kinds: Vec<&str> = batch.iter().map(Directive::kind).collect();
        assert_eq!(kinds, vec!["updatePullRequest", "addNode"]);
        match batch.last() {
            Some(Directive::AddNode(ConversationNode::Discussion(node))) => {
                assert_eq!(node.id, "gid://gitlab/IndividualNoteDiscussion/777");
            }
            other => panic!("expected an addNode directive, got {other:?}"),
        }
    }

    #[test]
    fn comment_replies_bump_the_counter_before_attaching() {
        let compiler = DirectiveCompiler::new(GraphFamily::Discussion);
        let payload = json!({
            "id": "gid://gitlab/DiscussionNote/900",
            "body": "a reply",
            "discussion": {"id": "gid://gitlab/Discussion/777"}
        });

        let batch = compiler
            .compile(
                &MutationOperation::CreateCommentReply {
                    parent_id: "gid://gitlab/Discussion/777".to_owned(),
                    text: "a reply".to_owned(),
                },
                &payload,
                issued_at(),
            )
            .unwrap_or_else(|error| panic!("compile should succeed: {error}"));

        let kinds: Vec<&str> = batch.iter().map(Directive::kind).collect();
        assert_eq!(
            kinds,
            vec!["updatePullRequest", "updateReviewCommentsCount", "addReply"]
        );
        match batch.last() {
            Some(Directive::AddReply(ConversationReply::Discussion(reply))) => {
                assert_eq!(
                    reply.discussion.as_ref().map(|reference| reference.id.as_str()),
                    Some("gid://gitlab/Discussion/777")
                );
            }
            other => panic!("expected an addReply directive, got {other:?}"),
        }
    }

    #[test]
    fn timeline_replies_carry_their_parent_comment_id() {
        let compiler = DirectiveCompiler::new(GraphFamily::Timeline);
        let payload = json!({"comment": {"id": "rc-2", "body": "a reply"}});

        let batch = compiler
            .compile(
                &MutationOperation::CreateCommentReply {
                    parent_id: "rc-1".to_owned(),
                    text: "a reply".to_owned(),
                },
                &payload,
                issued_at(),
            )
            .unwrap_or_else(|error| panic!("compile should succeed: {error}"));

        match batch.last() {
            Some(Directive::AddReply(ConversationReply::Timeline(reply))) => {
                assert_eq!(reply.parent_id, "rc-1");
                assert_eq!(reply.comment.id, "rc-2");
            }
            other => panic!("expected a timeline addReply, got {other:?}"),
        }
    }

    #[test]
    fn reaction_toggles_prefer_the_provider_reported_user() {
        let compiler = DirectiveCompiler::new(GraphFamily::Timeline);
        let payload = json!({"user": {"login": "recorded-by-provider"}});

        let batch = compiler
            .compile(
                &MutationOperation::ToggleReaction {
                    subject_id: Some("c1".to_owned()),
                    content: "thumbsup".to_owned(),
                    enable: true,
                    actor: actor("local-user"),
                },
                &payload,
                issued_at(),
            )
            .unwrap_or_else(|error| panic!("compile should succeed: {error}"));

        match batch.last() {
            Some(Directive::AddReaction(reaction)) => {
                assert_eq!(reaction.user.login, "recorded-by-provider");
            }
            other => panic!("expected an addReaction directive, got {other:?}"),
        }
    }

    #[test]
    fn malformed_payloads_fail_compilation_with_a_typed_error() {
        let compiler = DirectiveCompiler::new(GraphFamily::Discussion);

        let error = compiler
            .compile(
                &MutationOperation::CreateComment {
                    text: "orphan".to_owned(),
                },
                &json!({"notAnId": true}),
                issued_at(),
            )
            .expect_err("a node without an id should fail to compile");

        assert!(
            matches!(
                error,
                CompileError::MalformedPayload {
                    operation: "createComment",
                    ..
                }
            ),
            "expected MalformedPayload, got {error:?}"
        );
    }

    #[test]
    fn submit_review_swaps_synthetic_nodes_for_created_ones() {
        use camino::Utf8PathBuf;

        let compiler = DirectiveCompiler::new(GraphFamily::Discussion);
        let staged = crate::review::PendingReviewComment {
            id: "1700000000000".to_owned(),
            file_path: Utf8PathBuf::from("src/lib.rs"),
            start_line: 4,
            end_line: None,
            text: "needs a test".to_owned(),
            created_at: issued_at(),
        };
        let payload = json!({"nodes": [{
            "id": "gid://gitlab/Discussion/801",
            "notes": {"nodes": [{"id": "gid://gitlab/DiscussionNote/901", "body": "needs a test"}]}
        }]});

        let batch = compiler
            .compile(
                &MutationOperation::SubmitReview {
                    text: None,
                    event: super::ReviewEvent::Comment,
                    comments: vec![staged],
                },
                &payload,
                issued_at(),
            )
            .unwrap_or_else(|error| panic!("compile should succeed: {error}"));

        let kinds: Vec<&str> = batch.iter().map(Directive::kind).collect();
        assert_eq!(
            kinds,
            vec![
                "updatePullRequest",
                "removeNode",
                "addNodes",
                "removePendingReview"
            ]
        );
    }
}
