//! Colloquy keeps two independently held copies of a pull request
//! conversation graph consistent after mutations.
//!
//! The backend agent and the presentation surface each cache the same
//! conversation. Instead of refetching the whole conversation after every
//! write, a mutation's raw provider payload is compiled into a small,
//! serialisable directive batch; the batch applies to the backend cache and
//! travels over the notification bus so the surface applies the identical
//! delta. One shared replica engine implements the state transition for
//! both graph families, so the two copies cannot drift apart.

pub mod compiler;
pub mod config;
pub mod conversation;
pub mod directive;
pub mod gateway;
pub mod identity;
pub mod notify;
pub mod orchestrator;
pub mod replica;
pub mod review;
pub mod store;
pub mod telemetry;

pub use compiler::{CompileError, DirectiveCompiler, MutationOperation, ReviewEvent};
pub use config::ColloquyConfig;
pub use conversation::{ConversationGraph, GraphFamily};
pub use directive::Directive;
pub use gateway::{GatewayError, GuardedGateway, ProviderGateway};
pub use identity::{CompositeKey, IdentityError};
pub use notify::{DirectiveBatchNotification, NotificationBus};
pub use orchestrator::{MutationOrchestrator, OrchestrationError};
pub use replica::{ApplyOutcome, apply_batch};
pub use review::{NewReviewComment, PendingReviewComment, PendingReviewStore, ReviewKey};
pub use store::{CacheEntry, CacheKey, PullRequestCacheStore};
