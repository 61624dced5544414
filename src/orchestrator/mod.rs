//! Orchestrates one mutation from gateway call to replica notification.
//!
//! For a gateway-backed mutation the flow is: decode the logical id, call
//! the provider, compile the payload into a directive batch, apply the
//! batch to the backend cache entry, clear any pending error, publish the
//! identical batch to the presentation surface, and hand it back to the
//! caller. On any failure no directives are applied; the error is recorded
//! on the cache entry and propagated with its classification.
//!
//! Pending-review staging operations never touch the gateway: their batches
//! are built from the durable review store and flow through the same
//! apply-and-publish tail.
//!
//! Mutations and refetches for one logical id are serialised through the
//! store's per-key locks, so two calls issued concurrently cannot
//! interleave their gateway calls and apply out of completion order.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::compiler::{CompileError, DirectiveCompiler, MutationOperation, ReviewEvent};
use crate::conversation::{Actor, ConversationGraph, GraphFamily};
use crate::directive::{Directive, DiscussionNoteUpdate, NodeRef, NodeUpdate};
use crate::gateway::{GatewayError, GuardedGateway, ProviderGateway};
use crate::identity::{CompositeKey, IdentityError};
use crate::notify::{DirectiveBatchNotification, NotificationBus};
use crate::review::{NewReviewComment, PendingReviewStore, ReviewKey, ReviewStoreError, synthetic};
use crate::store::{CacheKey, PullRequestCacheStore, ReadDecision, RefetchReason};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

/// Operation name used for full conversation fetches.
const FETCH_CONVERSATIONS: &str = "fetchConversations";

/// Errors surfaced by the mutation orchestrator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestrationError {
    /// The logical pull request id could not be decoded.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The provider call failed; see the classification.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The provider payload did not match the operation's contract.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The pending review store failed.
    #[error(transparent)]
    ReviewStore(#[from] ReviewStoreError),

    /// A full fetch returned a payload that is not a conversation graph.
    #[error("conversation payload could not be decoded: {message}")]
    MalformedConversations {
        /// Parse error detail.
        message: String,
    },
}

/// Drives mutations for one provider's pull requests.
pub struct MutationOrchestrator<G, B> {
    provider_id: String,
    family: GraphFamily,
    gateway: GuardedGateway<G>,
    bus: B,
    store: Arc<PullRequestCacheStore>,
    reviews: PendingReviewStore,
    compiler: DirectiveCompiler,
    telemetry: Arc<dyn TelemetrySink>,
}

impl<G, B> MutationOrchestrator<G, B>
where
    G: ProviderGateway,
    B: NotificationBus,
{
    /// Creates an orchestrator for one provider.
    #[must_use]
    pub fn new(
        provider_id: impl Into<String>,
        family: GraphFamily,
        gateway: G,
        bus: B,
        store: Arc<PullRequestCacheStore>,
        reviews: PendingReviewStore,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            family,
            gateway: GuardedGateway::new(gateway),
            bus,
            store,
            reviews,
            compiler: DirectiveCompiler::new(family),
            telemetry,
        }
    }

    /// Executes one gateway-backed mutation and returns its directive
    /// batch, already applied locally and published to the surface.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError`] when the id cannot be decoded, the
    /// gateway call fails (classified), or the payload fails compilation.
    /// No directives are applied on any error path.
    pub async fn execute(
        &self,
        pull_request_id: &str,
        operation: MutationOperation,
    ) -> Result<Vec<Directive>, OrchestrationError> {
        let key = CompositeKey::decode(pull_request_id)?;
        self.execute_with_key(pull_request_id, &key, operation).await
    }

    async fn execute_with_key(
        &self,
        pull_request_id: &str,
        key: &CompositeKey,
        operation: MutationOperation,
    ) -> Result<Vec<Directive>, OrchestrationError> {
        let cache_key = self.cache_key(key);
        let lock = self.store.key_lock(&cache_key).await;
        let _serialised = lock.lock().await;

        let issued_at = Utc::now();
        match self.gateway.call(operation.name(), operation.params()).await {
            Ok(payload) => {
                let directives = match self.compiler.compile(&operation, &payload, issued_at) {
                    Ok(directives) => directives,
                    Err(error) => {
                        self.store.record_error(&cache_key, error.to_string()).await;
                        return Err(error.into());
                    }
                };
                self.apply_and_publish(pull_request_id, &cache_key, &directives)
                    .await;
                self.store.clear_error(&cache_key).await;
                Ok(directives)
            }
            Err(error) => {
                if matches!(error, GatewayError::AuthInvalid { .. }) {
                    self.telemetry.record(TelemetryEvent::ProviderTokenInvalidated {
                        provider_id: self.provider_id.clone(),
                    });
                }
                self.store.record_error(&cache_key, error.to_string()).await;
                Err(error.into())
            }
        }
    }

    /// Returns the conversation graph, preferring the cached copy.
    ///
    /// A missing, stale, or force-refreshed entry triggers a full fetch
    /// through the gateway; concurrent refetches of the same id coalesce
    /// behind the per-key lock.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError`] when the id cannot be decoded, the
    /// fetch fails, or the payload is not a conversation graph.
    pub async fn conversations(
        &self,
        pull_request_id: &str,
        force: bool,
    ) -> Result<ConversationGraph, OrchestrationError> {
        let key = CompositeKey::decode(pull_request_id)?;
        let cache_key = self.cache_key(&key);

        let decision = self.store.read(&cache_key, Utc::now(), force).await;
        let reason = match decision {
            ReadDecision::Cached(graph) => return Ok(graph),
            ReadDecision::Refetch(reason) => reason,
        };

        let lock = self.store.key_lock(&cache_key).await;
        let _serialised = lock.lock().await;

        // A concurrent caller may have completed the refetch while this one
        // waited on the lock; serve its result instead of fetching twice.
        if reason != RefetchReason::Forced
            && let ReadDecision::Cached(graph) = self.store.read(&cache_key, Utc::now(), false).await
        {
            return Ok(graph);
        }

        let payload = self
            .gateway
            .call(FETCH_CONVERSATIONS, fetch_params(&key))
            .await?;
        let graph: ConversationGraph = serde_json::from_value(payload).map_err(|error| {
            OrchestrationError::MalformedConversations {
                message: error.to_string(),
            }
        })?;

        self.store
            .insert_conversations(&cache_key, graph.clone(), Utc::now())
            .await;
        if reason == RefetchReason::Stale {
            self.telemetry
                .record(TelemetryEvent::StaleConversationsRefetched {
                    provider_id: self.provider_id.clone(),
                });
        }
        Ok(graph)
    }

    /// Stages a review comment locally and advertises it as a synthetic
    /// pending node. No gateway call is made.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError`] when the id cannot be decoded or the
    /// review store fails.
    pub async fn stage_review_comment(
        &self,
        pull_request_id: &str,
        comment: NewReviewComment,
        author: &Actor,
    ) -> Result<Vec<Directive>, OrchestrationError> {
        let key = CompositeKey::decode(pull_request_id)?;
        let cache_key = self.cache_key(&key);
        let review_key = ReviewKey::from_composite(&key);
        let lock = self.store.key_lock(&cache_key).await;
        let _serialised = lock.lock().await;

        let staged_at = Utc::now();
        let staged_comment = self.reviews.add(&review_key, comment, staged_at)?;
        debug!(comment_id = %staged_comment.id, "staged review comment");

        let staged = self.reviews.comments(&review_key)?;
        let directives = synthetic::staging_batch(self.family, &staged, author, staged_at);
        self.apply_and_publish(pull_request_id, &cache_key, &directives)
            .await;
        Ok(directives)
    }

    /// Rewrites the text of a staged review comment. Returns an empty batch
    /// when no staged comment matches.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError`] when the id cannot be decoded or the
    /// review store fails.
    pub async fn update_pending_comment(
        &self,
        pull_request_id: &str,
        comment_id: &str,
        text: &str,
    ) -> Result<Vec<Directive>, OrchestrationError> {
        let key = CompositeKey::decode(pull_request_id)?;
        let cache_key = self.cache_key(&key);
        let review_key = ReviewKey::from_composite(&key);
        let lock = self.store.key_lock(&cache_key).await;
        let _serialised = lock.lock().await;

        let Some(updated) = self.reviews.update(&review_key, comment_id, text)? else {
            debug!(%comment_id, "no staged comment to update");
            return Ok(Vec::new());
        };

        let directives = vec![self.pending_update_directive(&updated.id, text)];
        self.apply_and_publish(pull_request_id, &cache_key, &directives)
            .await;
        Ok(directives)
    }

    /// Discards a staged review comment, refreshing or clearing the
    /// pending-review marker.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError`] when the id cannot be decoded or the
    /// review store fails.
    pub async fn discard_pending_comment(
        &self,
        pull_request_id: &str,
        comment_id: &str,
        author: &Actor,
    ) -> Result<Vec<Directive>, OrchestrationError> {
        let key = CompositeKey::decode(pull_request_id)?;
        let cache_key = self.cache_key(&key);
        let review_key = ReviewKey::from_composite(&key);
        let lock = self.store.key_lock(&cache_key).await;
        let _serialised = lock.lock().await;

        let remaining = self.reviews.delete_comment(&review_key, comment_id)?;

        let mut directives = vec![
            Directive::updated_at_stamp(Utc::now()),
            Directive::RemoveNode(NodeRef {
                id: comment_id.to_owned(),
            }),
            Directive::UpdateReviewCommentsCount(-1),
        ];
        if remaining.is_empty() {
            directives.push(Directive::RemovePendingReview);
        } else {
            directives.push(Directive::AddPendingReview(synthetic::staged_review_marker(
                &remaining, author,
            )));
        }
        self.apply_and_publish(pull_request_id, &cache_key, &directives)
            .await;
        Ok(directives)
    }

    /// Submits the staged review through the gateway, swapping the
    /// synthetic nodes for the provider's real ones, then drains the
    /// staging file.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError`] on id, gateway, compile, or review
    /// store failures. The staging file survives a failed submission.
    pub async fn submit_review(
        &self,
        pull_request_id: &str,
        text: Option<String>,
        event: ReviewEvent,
    ) -> Result<Vec<Directive>, OrchestrationError> {
        let key = CompositeKey::decode(pull_request_id)?;
        let review_key = ReviewKey::from_composite(&key);
        let staged = self.reviews.comments(&review_key)?;

        let operation = MutationOperation::SubmitReview {
            text,
            event,
            comments: staged,
        };
        let directives = self
            .execute_with_key(pull_request_id, &key, operation)
            .await?;
        self.reviews.delete_review(&review_key)?;
        Ok(directives)
    }

    /// Returns the token rejection currently short-circuiting this
    /// provider, when one exists.
    pub async fn token_error(&self) -> Option<crate::gateway::TokenError> {
        self.gateway.token_error().await
    }

    fn cache_key(&self, key: &CompositeKey) -> CacheKey {
        CacheKey::new(self.provider_id.clone(), key.exact_id())
    }

    fn pending_update_directive(&self, comment_id: &str, text: &str) -> Directive {
        let mut fields = Map::new();
        fields.insert("body".to_owned(), Value::String(text.to_owned()));
        match self.family {
            GraphFamily::Discussion => Directive::UpdateDiscussionNote(DiscussionNoteUpdate {
                id: comment_id.to_owned(),
                discussion: NodeRef {
                    id: comment_id.to_owned(),
                },
                fields,
            }),
            GraphFamily::Timeline => Directive::UpdateNode(NodeUpdate {
                id: comment_id.to_owned(),
                fields,
            }),
        }
    }

    async fn apply_and_publish(
        &self,
        pull_request_id: &str,
        cache_key: &CacheKey,
        directives: &[Directive],
    ) {
        if let Some(outcome) = self.store.apply_directives(cache_key, directives).await {
            self.telemetry.record(TelemetryEvent::DirectiveBatchApplied {
                provider_id: self.provider_id.clone(),
                applied: outcome.applied,
                skipped: outcome.skipped,
            });
        }

        let notification = DirectiveBatchNotification {
            provider_id: self.provider_id.clone(),
            pull_request_id: pull_request_id.to_owned(),
            directives: directives.to_vec(),
        };
        if let Err(error) = self.bus.publish(notification).await {
            // Lost notifications are tolerated: the surface corroborates
            // against the server updatedAt stamp and refetches on a gap.
            warn!(%error, "failed to publish directive batch");
        }
    }
}


fn fetch_params(key: &CompositeKey) -> Value {
    key.secondary.as_ref().map_or_else(
        || json!({ "id": key.native_id }),
        |compound| {
            json!({
                "id": key.native_id,
                "full": format!("{}!{}", compound.path, compound.index),
            })
        },
    )
}
