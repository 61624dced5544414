//! Behavioural tests for end-to-end directive replication.
//!
//! The backend replica is the orchestrator's cache store; the presentation
//! surface replica is reconstructed by applying every published directive
//! batch to a copy of the same prior graph. Both must end in identical
//! states whatever the mutation outcome.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use camino::Utf8Path;
use chrono::Utc;
use colloquy::ConversationGraph;
use colloquy::compiler::MutationOperation;
use colloquy::conversation::GraphFamily;
use colloquy::conversation::test_support::{discussion, discussion_graph, note};
use colloquy::directive::Directive;
use colloquy::gateway::{GatewayError, ProviderGateway};
use colloquy::notify::{DirectiveBatchNotification, NotificationBus, NotifyError};
use colloquy::orchestrator::{MutationOrchestrator, OrchestrationError};
use colloquy::replica::apply_batch;
use colloquy::review::PendingReviewStore;
use colloquy::store::{CacheKey, PullRequestCacheStore};
use colloquy::telemetry::NoopTelemetrySink;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::{ScenarioState, given, scenario, then, when};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::runtime::Runtime;

const PROVIDER_ID: &str = "gitlab*com";
const OPAQUE_ID: &str = r#"{"id":"42","full":"grp/proj!7"}"#;

/// Shared runtime wrapper that can be stored in an rstest-bdd Slot.
#[derive(Clone)]
struct SharedRuntime(Rc<RefCell<Runtime>>);

impl SharedRuntime {
    fn new(runtime: Runtime) -> Self {
        Self(Rc::new(RefCell::new(runtime)))
    }

    fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.0.borrow().block_on(future)
    }
}

/// Handle used by steps to script the gateway response after construction.
type ScriptHandle = Arc<Mutex<Option<Result<Value, GatewayError>>>>;

/// Gateway stub that replays whatever response the scenario scripted.
struct ScriptedGateway {
    script: ScriptHandle,
}

#[async_trait]
impl ProviderGateway for ScriptedGateway {
    async fn call(&self, operation: &str, _params: Value) -> Result<Value, GatewayError> {
        self.script
            .lock()
            .ok()
            .and_then(|script| script.clone())
            .unwrap_or_else(|| {
                Err(GatewayError::Unclassified {
                    message: format!("no scripted response for {operation}"),
                })
            })
    }
}

/// Bus that captures every published batch for surface-side replay.
#[derive(Clone, Default)]
struct CapturingBus {
    sent: Arc<Mutex<Vec<DirectiveBatchNotification>>>,
}

impl CapturingBus {
    fn batches(&self) -> Vec<DirectiveBatchNotification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl NotificationBus for CapturingBus {
    async fn publish(&self, notification: DirectiveBatchNotification) -> Result<(), NotifyError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
        Ok(())
    }
}

struct Harness {
    _temp_dir: TempDir,
    store: Arc<PullRequestCacheStore>,
    bus: CapturingBus,
    script: ScriptHandle,
    orchestrator: MutationOrchestrator<ScriptedGateway, CapturingBus>,
    prior_graph: ConversationGraph,
}

impl Harness {
    fn new() -> Self {
        let temp_dir =
            TempDir::new().unwrap_or_else(|error| panic!("temp dir should be created: {error}"));
        let directory = Utf8Path::from_path(temp_dir.path())
            .unwrap_or_else(|| panic!("temp dir path should be UTF-8"));
        let reviews = PendingReviewStore::open(directory)
            .unwrap_or_else(|error| panic!("review store should open: {error}"));

        let store = Arc::new(PullRequestCacheStore::with_default_ttl());
        let bus = CapturingBus::default();
        let script: ScriptHandle = Arc::new(Mutex::new(None));
        let orchestrator = MutationOrchestrator::new(
            PROVIDER_ID,
            GraphFamily::Discussion,
            ScriptedGateway {
                script: Arc::clone(&script),
            },
            bus.clone(),
            Arc::clone(&store),
            reviews,
            Arc::new(NoopTelemetrySink),
        );

        Self {
            _temp_dir: temp_dir,
            store,
            bus,
            script,
            orchestrator,
            prior_graph: prior_graph(),
        }
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey::new(PROVIDER_ID, "42")
    }

    fn script_response(&self, response: Result<Value, GatewayError>) {
        if let Ok(mut script) = self.script.lock() {
            *script = Some(response);
        }
    }

    /// Rebuilds the presentation-surface replica by replaying every
    /// published batch over the shared prior graph.
    fn surface_graph(&self) -> ConversationGraph {
        let mut graph = self.prior_graph.clone();
        for notification in self.bus.batches() {
            let outcome = apply_batch(&mut graph, &notification.directives);
            assert!(
                outcome.is_clean(),
                "surface replica skipped directives: {outcome:?}"
            );
        }
        graph
    }
}

fn prior_graph() -> ConversationGraph {
    discussion_graph(vec![discussion(
        "gid://gitlab/Discussion/1",
        note("gid://gitlab/DiscussionNote/2", "octocat", "existing thread"),
    )])
}

fn created_comment_payload() -> Value {
    json!({
        "id": "gid://gitlab/IndividualNoteDiscussion/777",
        "notes": {"nodes": [{
            "id": "gid://gitlab/Note/555",
            "author": {"login": "octocat"},
            "body": "a brand-new comment"
        }]}
    })
}

#[derive(ScenarioState, Default)]
struct ReplicationState {
    runtime: Slot<SharedRuntime>,
    harness: Slot<Rc<Harness>>,
    batch: Slot<Vec<Directive>>,
    error: Slot<OrchestrationError>,
}

#[fixture]
fn replication_state() -> ReplicationState {
    ReplicationState::default()
}

fn runtime(replication_state: &ReplicationState) -> SharedRuntime {
    if replication_state.runtime.with_ref(|_| ()).is_none() {
        let built =
            Runtime::new().unwrap_or_else(|error| panic!("tokio runtime should build: {error}"));
        replication_state.runtime.set(SharedRuntime::new(built));
    }
    replication_state
        .runtime
        .get()
        .unwrap_or_else(|| panic!("runtime should be initialised"))
}

fn current_harness(replication_state: &ReplicationState) -> Rc<Harness> {
    replication_state
        .harness
        .get()
        .unwrap_or_else(|| panic!("harness should be initialised"))
}

#[given("a cached conversation shared by both replicas")]
fn seed_shared_conversation(replication_state: &ReplicationState) {
    let shared_runtime = runtime(replication_state);
    let harness = Rc::new(Harness::new());
    shared_runtime.block_on(harness.store.insert_conversations(
        &harness.cache_key(),
        harness.prior_graph.clone(),
        Utc::now(),
    ));
    replication_state.harness.set(harness);
}

#[when("a comment is created through the orchestrator")]
fn create_comment(replication_state: &ReplicationState) {
    let harness = current_harness(replication_state);
    harness.script_response(Ok(created_comment_payload()));
    let shared_runtime = runtime(replication_state);

    let batch = shared_runtime
        .block_on(harness.orchestrator.execute(
            OPAQUE_ID,
            MutationOperation::CreateComment {
                text: "a brand-new comment".to_owned(),
            },
        ))
        .unwrap_or_else(|error| panic!("mutation should succeed: {error}"));
    replication_state.batch.set(batch);
}

#[when("a comment creation fails with bad credentials")]
fn create_comment_fails(replication_state: &ReplicationState) {
    let harness = current_harness(replication_state);
    harness.script_response(Err(GatewayError::classify("Bad credentials")));
    let shared_runtime = runtime(replication_state);

    let result = shared_runtime.block_on(harness.orchestrator.execute(
        OPAQUE_ID,
        MutationOperation::CreateComment {
            text: "never lands".to_owned(),
        },
    ));
    match result {
        Ok(batch) => panic!("mutation should fail, got batch {batch:?}"),
        Err(error) => replication_state.error.set(error),
    }
}

#[then("the batch leads with an update stamp and adds one node")]
fn assert_batch_shape(replication_state: &ReplicationState) {
    let batch = replication_state
        .batch
        .get()
        .unwrap_or_else(|| panic!("batch should be recorded"));
    let kinds: Vec<&str> = batch.iter().map(Directive::kind).collect();
    assert_eq!(kinds, vec!["updatePullRequest", "addNode"]);
}

#[then("the mutation surfaces an authentication failure and no directives")]
fn assert_auth_failure(replication_state: &ReplicationState) {
    let error = replication_state
        .error
        .with_ref(Clone::clone)
        .unwrap_or_else(|| panic!("error should be recorded"));
    assert!(
        matches!(
            error,
            OrchestrationError::Gateway(GatewayError::AuthInvalid { .. })
        ),
        "expected an AuthInvalid classification, got {error:?}"
    );

    let harness = current_harness(replication_state);
    assert!(
        harness.bus.batches().is_empty(),
        "no directives may be published for a failed mutation"
    );
}

#[then("both replicas hold identical conversation graphs")]
fn assert_replicas_identical(replication_state: &ReplicationState) {
    let harness = current_harness(replication_state);
    let shared_runtime = runtime(replication_state);

    let backend = shared_runtime
        .block_on(harness.store.entry(&harness.cache_key()))
        .unwrap_or_else(|| panic!("backend entry should exist"))
        .graph;
    let surface = harness.surface_graph();

    assert_eq!(backend, surface, "replicas diverged");
}

#[scenario(path = "tests/features/replication.feature", index = 0)]
fn created_comment_reaches_both_replicas(replication_state: ReplicationState) {
    let _ = replication_state;
}

#[scenario(path = "tests/features/replication.feature", index = 1)]
fn failed_mutation_leaves_replicas_untouched(replication_state: ReplicationState) {
    let _ = replication_state;
}
