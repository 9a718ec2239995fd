use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use rudder_core::actions::{ActionRegistry, ActionSet};
use rudder_core::approval::{
    ApprovalGate, ApprovalOutcome, ExecutionResult, PendingApproval,
};
use rudder_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use rudder_core::errors::ApplicationError;
use rudder_core::router::{RoutedTurn, StageRouter};
use rudder_core::session::{MessageRecord, PlanDraft, SessionId, SessionState, Stage};

use crate::executor::{ActionExecutor, Credentials, ResourceApi};
use crate::llm::{ActionProposal, LanguageModel, ValidatingModel};
use crate::suggestions::SuggestionGenerator;

/// One inbound chat turn, as received from the host application.
#[derive(Clone, Debug, Deserialize)]
pub struct TurnInput {
    pub session_id: SessionId,
    pub user_message: String,
    pub stage: Option<Stage>,
    pub project_context: Option<Value>,
    pub resource_context: Option<Value>,
}

/// The single terminal outcome of a turn. Exactly one of the optional
/// fields beyond `assistant_message` is populated for action turns: a
/// suspension carries `pending_approval`, a completed execution carries
/// `execution_result`.
#[derive(Clone, Debug, Serialize)]
pub struct TurnOutput {
    pub next_stage: Stage,
    pub assistant_message: Option<String>,
    pub pending_approval: Option<PendingApproval>,
    pub execution_result: Option<ExecutionResult>,
}

impl TurnOutput {
    fn message(next_stage: Stage, message: impl Into<String>) -> Self {
        Self {
            next_stage,
            assistant_message: Some(message.into()),
            pending_approval: None,
            execution_result: None,
        }
    }
}

/// Composes the router, action registry, approval gate, executor, and
/// suggestion generator into the conversation state machine and drives a
/// single turn from entry to a terminal stage.
///
/// Stages run strictly sequentially. The only suspension point is the
/// approval gate's `propose`: the returned record is handed to the host for
/// persistence, and `resume` may run in a different process invocation.
pub struct GraphDriver<M, A, S> {
    model: ValidatingModel<M>,
    executor: ActionExecutor<A>,
    registry: ActionRegistry,
    router: StageRouter,
    gate: ApprovalGate,
    suggestions: SuggestionGenerator,
    audit: S,
}

impl<M, A, S> GraphDriver<M, A, S>
where
    M: LanguageModel,
    A: ResourceApi,
    S: AuditSink,
{
    pub fn new(model: M, api: A, registry: ActionRegistry, audit: S) -> Self {
        Self {
            model: ValidatingModel::new(model),
            executor: ActionExecutor::new(api),
            registry,
            router: StageRouter,
            gate: ApprovalGate,
            suggestions: SuggestionGenerator,
            audit,
        }
    }

    pub async fn run_turn(
        &self,
        state: &mut SessionState,
        input: TurnInput,
        credentials: Option<&Credentials>,
    ) -> Result<TurnOutput, ApplicationError> {
        state.stage = input.stage;
        if input.project_context.is_some() {
            state.project_context = input.project_context;
        }
        if input.resource_context.is_some() {
            state.resource_context = input.resource_context;
        }
        state.push_message(MessageRecord::user(input.user_message));

        let RoutedTurn { next_stage, patch, diagnostic } =
            self.router.route(state, &self.model).await;
        patch.apply(state);
        // The routed stage is the owning stage for anything suspended this
        // turn; a rejection at resume time loops control back to it, so it
        // must survive in persisted state even when routing was classified.
        state.stage = Some(next_stage);

        self.emit(
            AuditEvent::new(
                Some(state.session_id.clone()),
                "turn",
                "router.stage_selected",
                AuditCategory::Routing,
                "graph-driver",
                if diagnostic.is_some() { AuditOutcome::Failed } else { AuditOutcome::Success },
            )
            .with_metadata("stage", next_stage.as_str()),
        );

        if let Some(diagnostic) = diagnostic {
            let message = format!("I couldn't continue with this request: {diagnostic}");
            state.push_message(MessageRecord::assistant(&message));
            return Ok(TurnOutput::message(Stage::End, message));
        }

        info!(stage = next_stage.as_str(), session = %state.session_id.0, "running stage");
        match next_stage {
            Stage::End | Stage::Idle => {
                let message = "There is nothing further to do in this conversation.".to_string();
                state.push_message(MessageRecord::assistant(&message));
                Ok(TurnOutput::message(Stage::End, message))
            }
            Stage::Propose => self.run_propose(state).await,
            Stage::Suggest => self.run_suggest(state).await,
            stage => self.run_acting_stage(stage, state, credentials).await,
        }
    }

    /// Resume a previously suspended action. Resumption picks up exactly at
    /// the suspension point; the owning stage is not re-entered from the
    /// top, so no pre-suspension side effects run twice.
    pub async fn resume(
        &self,
        state: &mut SessionState,
        record: &PendingApproval,
        raw_decision: &str,
        credentials: Option<&Credentials>,
    ) -> Result<TurnOutput, ApplicationError> {
        match self.gate.resume(record, raw_decision) {
            ApprovalOutcome::Approved { action_name, final_parameters } => {
                self.emit(
                    AuditEvent::new(
                        Some(state.session_id.clone()),
                        record.correlation_id.0.clone(),
                        "approval.resolved",
                        AuditCategory::Approval,
                        "graph-driver",
                        AuditOutcome::Success,
                    )
                    .with_metadata("action", action_name.clone()),
                );
                self.execute_and_record(state, &action_name, final_parameters, credentials).await
            }
            ApprovalOutcome::Rejected(rejection) => {
                self.emit(
                    AuditEvent::new(
                        Some(state.session_id.clone()),
                        record.correlation_id.0.clone(),
                        "approval.resolved",
                        AuditCategory::Approval,
                        "graph-driver",
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("action", rejection.action_name.clone()),
                );
                let resource = resource_name(&rejection.final_parameters);
                let message = format!(
                    "The `{}` operation on '{}' was not approved; nothing was changed.",
                    rejection.action_name, resource
                );
                state.push_message(MessageRecord::assistant(&message));
                // Rejection loops control back to the owning stage; the
                // action itself is never retried automatically.
                let next_stage = state.stage.unwrap_or(Stage::End);
                Ok(TurnOutput::message(next_stage, message))
            }
        }
    }

    async fn run_propose(
        &self,
        state: &mut SessionState,
    ) -> Result<TurnOutput, ApplicationError> {
        match self.model.draft_plan(&state.history).await {
            Ok(plan) => {
                let message = summarize_plan(&plan);
                state.pending_plan = Some(plan);
                state.push_message(MessageRecord::assistant(&message));
                Ok(TurnOutput::message(Stage::End, message))
            }
            Err(error) => {
                let message =
                    format!("I couldn't draft a project plan right now ({error}). Please retry.");
                state.push_message(MessageRecord::assistant(&message));
                Ok(TurnOutput::message(Stage::End, message))
            }
        }
    }

    async fn run_suggest(
        &self,
        state: &mut SessionState,
    ) -> Result<TurnOutput, ApplicationError> {
        let suggestions = self.suggestions.suggest(&self.model, state).await;
        self.emit(
            AuditEvent::new(
                Some(state.session_id.clone()),
                "turn",
                "suggestion.generated",
                AuditCategory::Suggestion,
                "graph-driver",
                AuditOutcome::Success,
            )
            .with_metadata("count", suggestions.len().to_string()),
        );

        let message = if suggestions.is_empty() {
            "No follow-up suggestions right now.".to_string()
        } else {
            format!("You could try next: {}", suggestions.join(" | "))
        };
        state.push_message(MessageRecord::assistant(&message));
        Ok(TurnOutput::message(Stage::End, message))
    }

    async fn run_acting_stage(
        &self,
        stage: Stage,
        state: &mut SessionState,
        credentials: Option<&Credentials>,
    ) -> Result<TurnOutput, ApplicationError> {
        let actions = self.actions_for(stage, state);
        let turn = match self.model.propose_action(&state.history, actions).await {
            Ok(turn) => turn,
            Err(error) => {
                // Collaborator failure or out-of-set action: recover locally
                // by forcing the terminal stage, never retry within the turn.
                let message = format!("I couldn't continue with this request: {error}");
                state.push_message(MessageRecord::assistant(&message));
                return Ok(TurnOutput::message(Stage::End, message));
            }
        };

        let Some(action) = turn.action else {
            let message = turn
                .message
                .unwrap_or_else(|| "How else can I help with your resources?".to_string());
            state.push_message(MessageRecord::assistant(&message));
            return Ok(TurnOutput::message(Stage::End, message));
        };

        // Membership was validated by the adapter, so the descriptor lookup
        // cannot miss here.
        let mutating =
            actions.get(&action.action_name).map(|descriptor| descriptor.mutating).unwrap_or(true);

        if mutating {
            self.suspend_for_approval(stage, state, turn.message, action)
        } else {
            let ActionProposal { action_name, parameters } = action;
            self.execute_and_record(state, &action_name, parameters, credentials).await
        }
    }

    fn suspend_for_approval(
        &self,
        stage: Stage,
        state: &mut SessionState,
        model_message: Option<String>,
        action: ActionProposal,
    ) -> Result<TurnOutput, ApplicationError> {
        let record = self.gate.propose(action.action_name, action.parameters);
        self.emit(
            AuditEvent::new(
                Some(state.session_id.clone()),
                record.correlation_id.0.clone(),
                "approval.suspended",
                AuditCategory::Approval,
                "graph-driver",
                AuditOutcome::Success,
            )
            .with_metadata("action", record.action_name.clone()),
        );

        let resource = resource_name(&record.proposed_parameters);
        let message = model_message.unwrap_or_else(|| {
            format!("Approval required before running `{}` on '{}'.", record.action_name, resource)
        });
        state.push_message(MessageRecord::assistant(&message));

        Ok(TurnOutput {
            next_stage: stage,
            assistant_message: Some(message),
            pending_approval: Some(record),
            execution_result: None,
        })
    }

    async fn execute_and_record(
        &self,
        state: &mut SessionState,
        action_name: &str,
        final_parameters: Map<String, Value>,
        credentials: Option<&Credentials>,
    ) -> Result<TurnOutput, ApplicationError> {
        let result = self
            .executor
            .execute(action_name, final_parameters, credentials)
            .await
            .map_err(ApplicationError::from)?;

        self.emit(
            AuditEvent::new(
                Some(state.session_id.clone()),
                "turn",
                "executor.completed",
                AuditCategory::Execution,
                "graph-driver",
                if result.success { AuditOutcome::Success } else { AuditOutcome::Failed },
            )
            .with_metadata("action", action_name),
        );

        if let Ok(serialized) = serde_json::to_string(&result) {
            state.push_message(MessageRecord::action(serialized));
        }
        state.push_message(MessageRecord::assistant(&result.human_message));

        Ok(TurnOutput {
            next_stage: Stage::End,
            assistant_message: Some(result.human_message.clone()),
            pending_approval: None,
            execution_result: Some(result),
        })
    }

    fn actions_for(&self, stage: Stage, state: &SessionState) -> &ActionSet {
        match stage {
            Stage::ManageResource => self.registry.resolve(state.resource_context.as_ref()),
            _ => self.registry.all(),
        }
    }

    fn emit(&self, event: AuditEvent) {
        self.audit.emit(event);
    }
}

fn resource_name(parameters: &Map<String, Value>) -> String {
    parameters
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("the requested resource")
        .to_string()
}

fn summarize_plan(plan: &PlanDraft) -> String {
    let name = if plan.name.is_empty() { "your project" } else { plan.name.as_str() };
    format!(
        "Drafted a plan for {name}: {} devbox(es), {} database(s), {} bucket(s).",
        plan.resources.devboxes.len(),
        plan.resources.databases.len(),
        plan.resources.buckets.len(),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Map, Value};

    use rudder_core::actions::{ActionRegistry, ActionSet};
    use rudder_core::audit::InMemoryAuditSink;
    use rudder_core::session::{
        DevboxPlan, MessageRecord, PlanDraft, SessionId, SessionState, Stage,
    };

    use crate::executor::{Credentials, ResourceApi, ResourceApiError};
    use crate::llm::{ActionProposal, CollaboratorError, LanguageModel, ModelTurn};

    use super::{GraphDriver, TurnInput};

    #[derive(Clone, Default)]
    struct ScriptedModel {
        classify_answer: Option<Stage>,
        classify_calls: Arc<AtomicUsize>,
        turn: ModelTurn,
        plan: Option<PlanDraft>,
        suggestions: Vec<String>,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn classify_stage(
            &self,
            _history: &[MessageRecord],
            _candidates: &[Stage],
        ) -> Result<Stage, CollaboratorError> {
            self.classify_calls.fetch_add(1, Ordering::SeqCst);
            self.classify_answer
                .ok_or_else(|| CollaboratorError::Transport("no scripted answer".to_string()))
        }

        async fn propose_action(
            &self,
            _history: &[MessageRecord],
            _actions: &ActionSet,
        ) -> Result<ModelTurn, CollaboratorError> {
            Ok(self.turn.clone())
        }

        async fn draft_plan(
            &self,
            _history: &[MessageRecord],
        ) -> Result<PlanDraft, CollaboratorError> {
            self.plan
                .clone()
                .ok_or_else(|| CollaboratorError::Transport("no scripted plan".to_string()))
        }

        async fn suggest(
            &self,
            _history_tail: &[MessageRecord],
        ) -> Result<Vec<String>, CollaboratorError> {
            Ok(self.suggestions.clone())
        }
    }

    #[derive(Clone)]
    struct ScriptedApi {
        response: Result<Value, ResourceApiError>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedApi {
        fn succeeding(payload: Value) -> Self {
            Self { response: Ok(payload), calls: Arc::new(AtomicUsize::new(0)) }
        }
    }

    #[async_trait]
    impl ResourceApi for ScriptedApi {
        async fn invoke(
            &self,
            _action_name: &str,
            _parameters: &Map<String, Value>,
            _credentials: &Credentials,
        ) -> Result<Value, ResourceApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            kubeconfig: secrecy::SecretString::from("kc-test"),
            region_url: "https://region.example".to_string(),
        }
    }

    fn driver(
        model: ScriptedModel,
        api: ScriptedApi,
    ) -> GraphDriver<ScriptedModel, ScriptedApi, InMemoryAuditSink> {
        GraphDriver::new(model, api, ActionRegistry::with_default_catalog(), InMemoryAuditSink::default())
    }

    fn pause_database_turn() -> ModelTurn {
        let mut parameters = Map::new();
        parameters.insert("name".to_string(), json!("main-db"));
        ModelTurn {
            message: None,
            action: Some(ActionProposal {
                action_name: "pause_database".to_string(),
                parameters,
            }),
        }
    }

    fn input(stage: Option<Stage>, message: &str) -> TurnInput {
        TurnInput {
            session_id: SessionId("s-1".to_string()),
            user_message: message.to_string(),
            stage,
            project_context: None,
            resource_context: None,
        }
    }

    #[tokio::test]
    async fn pause_database_scenario_suspends_then_executes_on_approval() {
        let model = ScriptedModel { turn: pause_database_turn(), ..Default::default() };
        let classify_calls = model.classify_calls.clone();
        let api = ScriptedApi::succeeding(json!({ "status": "Paused" }));
        let api_calls = api.calls.clone();
        let driver = driver(model, api);
        let mut state = SessionState::new(SessionId("s-1".to_string()));

        // Explicit stage: the router must not consult the classifier.
        let output = driver
            .run_turn(
                &mut state,
                input(Some(Stage::ManageResource), "pause my database `main-db`"),
                Some(&credentials()),
            )
            .await
            .expect("turn");

        assert_eq!(classify_calls.load(Ordering::SeqCst), 0);
        assert_eq!(output.next_stage, Stage::ManageResource);
        let record = output.pending_approval.expect("suspension");
        assert_eq!(record.action_name, "pause_database");
        assert_eq!(api_calls.load(Ordering::SeqCst), 0, "no execution before approval");

        let resumed = driver
            .resume(&mut state, &record, "{\"approve\": true, \"payload\": {}}", Some(&credentials()))
            .await
            .expect("resume");

        assert_eq!(resumed.next_stage, Stage::End);
        let result = resumed.execution_result.expect("execution result");
        assert!(result.success);
        assert_eq!(result.final_parameters.get("name"), Some(&json!("main-db")));
        assert!(result.human_message.contains("main-db"));
        assert_eq!(api_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_resume_payload_rejects_without_executing() {
        let model = ScriptedModel { turn: pause_database_turn(), ..Default::default() };
        let api = ScriptedApi::succeeding(json!({}));
        let api_calls = api.calls.clone();
        let driver = driver(model, api);
        let mut state = SessionState::new(SessionId("s-1".to_string()));

        let output = driver
            .run_turn(
                &mut state,
                input(Some(Stage::ManageResource), "pause my database `main-db`"),
                Some(&credentials()),
            )
            .await
            .expect("turn");
        let record = output.pending_approval.expect("suspension");

        let resumed = driver
            .resume(&mut state, &record, "not json", Some(&credentials()))
            .await
            .expect("resume");

        assert!(resumed.execution_result.is_none());
        assert_eq!(resumed.next_stage, Stage::ManageResource);
        assert!(resumed.assistant_message.expect("message").contains("not approved"));
        assert_eq!(api_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn classified_turn_rejection_loops_back_to_owning_stage() {
        let model = ScriptedModel {
            classify_answer: Some(Stage::ManageResource),
            turn: pause_database_turn(),
            ..Default::default()
        };
        let api = ScriptedApi::succeeding(json!({}));
        let api_calls = api.calls.clone();
        let driver = driver(model, api);
        let mut state = SessionState::new(SessionId("s-1".to_string()));

        // No explicit stage: the owning stage is only known through routing.
        let output = driver
            .run_turn(&mut state, input(None, "pause my database `main-db`"), None)
            .await
            .expect("turn");
        let record = output.pending_approval.expect("suspension");
        assert_eq!(state.stage, Some(Stage::ManageResource));

        let resumed = driver
            .resume(&mut state, &record, "{\"approve\": false}", None)
            .await
            .expect("resume");

        assert_eq!(resumed.next_stage, Stage::ManageResource);
        assert!(resumed.execution_result.is_none());
        assert_eq!(api_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejection_does_not_taint_a_later_identical_proposal() {
        let model = ScriptedModel { turn: pause_database_turn(), ..Default::default() };
        let api = ScriptedApi::succeeding(json!({ "status": "Paused" }));
        let driver = driver(model, api);
        let mut state = SessionState::new(SessionId("s-1".to_string()));

        let first = driver
            .run_turn(&mut state, input(Some(Stage::ManageResource), "pause main-db"), None)
            .await
            .expect("turn")
            .pending_approval
            .expect("suspension");
        driver
            .resume(&mut state, &first, "{\"approve\": false}", None)
            .await
            .expect("rejection");

        let second = driver
            .run_turn(&mut state, input(Some(Stage::ManageResource), "pause main-db"), None)
            .await
            .expect("turn")
            .pending_approval
            .expect("second suspension");

        assert_ne!(first.correlation_id, second.correlation_id);
        let resumed = driver
            .resume(&mut state, &second, "{\"approve\": true, \"payload\": {}}", Some(&credentials()))
            .await
            .expect("resume");
        assert!(resumed.execution_result.expect("result").success);
    }

    #[tokio::test]
    async fn classification_routes_when_stage_is_absent() {
        let model = ScriptedModel {
            classify_answer: Some(Stage::ManageResource),
            turn: pause_database_turn(),
            ..Default::default()
        };
        let classify_calls = model.classify_calls.clone();
        let driver = driver(model, ScriptedApi::succeeding(json!({})));
        let mut state = SessionState::new(SessionId("s-1".to_string()));

        let output = driver
            .run_turn(&mut state, input(None, "pause my database `main-db`"), None)
            .await
            .expect("turn");

        assert_eq!(classify_calls.load(Ordering::SeqCst), 1);
        assert!(output.pending_approval.is_some());
    }

    #[tokio::test]
    async fn classifier_failure_ends_the_turn_with_a_message() {
        let model = ScriptedModel::default();
        let driver = driver(model, ScriptedApi::succeeding(json!({})));
        let mut state = SessionState::new(SessionId("s-1".to_string()));

        let output = driver
            .run_turn(&mut state, input(None, "do something"), None)
            .await
            .expect("turn");

        assert_eq!(output.next_stage, Stage::End);
        assert!(output.assistant_message.expect("message").contains("couldn't continue"));
    }

    #[tokio::test]
    async fn out_of_set_action_forces_end_instead_of_executing() {
        let mut parameters = Map::new();
        parameters.insert("name".to_string(), json!("main-db"));
        let model = ScriptedModel {
            turn: ModelTurn {
                message: None,
                action: Some(ActionProposal {
                    action_name: "pause_devbox".to_string(),
                    parameters,
                }),
            },
            ..Default::default()
        };
        let api = ScriptedApi::succeeding(json!({}));
        let api_calls = api.calls.clone();
        let driver = driver(model, api);

        let mut state = SessionState::new(SessionId("s-1".to_string()));
        // Cluster context constrains the set; a devbox action is unlisted.
        state.resource_context = Some(json!({ "name": "main-db", "resourceType": "cluster" }));

        let output = driver
            .run_turn(&mut state, input(Some(Stage::ManageResource), "pause it"), None)
            .await
            .expect("turn");

        assert_eq!(output.next_stage, Stage::End);
        assert!(output.pending_approval.is_none());
        assert_eq!(api_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_mutating_action_executes_without_suspension() {
        let mut parameters = Map::new();
        parameters.insert("name".to_string(), json!("main-db"));
        let model = ScriptedModel {
            turn: ModelTurn {
                message: None,
                action: Some(ActionProposal {
                    action_name: "get_database".to_string(),
                    parameters,
                }),
            },
            ..Default::default()
        };
        let driver = driver(model, ScriptedApi::succeeding(json!({ "status": "Running" })));
        let mut state = SessionState::new(SessionId("s-1".to_string()));

        let output = driver
            .run_turn(
                &mut state,
                input(Some(Stage::ManageResource), "show main-db"),
                Some(&credentials()),
            )
            .await
            .expect("turn");

        assert!(output.pending_approval.is_none());
        assert_eq!(output.next_stage, Stage::End);
        assert!(output.execution_result.expect("result").success);
    }

    #[tokio::test]
    async fn propose_stage_fills_the_seeded_plan() {
        let model = ScriptedModel {
            plan: Some(PlanDraft {
                name: "blog-platform".to_string(),
                description: "A publishing site".to_string(),
                resources: rudder_core::session::PlanResources {
                    devboxes: vec![DevboxPlan {
                        name: "blog-box".to_string(),
                        runtime: "Node.js".to_string(),
                        description: "main runtime".to_string(),
                    }],
                    databases: Vec::new(),
                    buckets: Vec::new(),
                },
            }),
            ..Default::default()
        };
        let driver = driver(model, ScriptedApi::succeeding(json!({})));
        let mut state = SessionState::new(SessionId("s-1".to_string()));

        let output = driver
            .run_turn(&mut state, input(Some(Stage::Propose), "I want a blog site"), None)
            .await
            .expect("turn");

        assert_eq!(output.next_stage, Stage::End);
        assert!(output.assistant_message.expect("message").contains("blog-platform"));
        let plan = state.pending_plan.expect("plan stored");
        assert_eq!(plan.resources.devboxes.len(), 1);
    }

    #[tokio::test]
    async fn suggest_stage_reports_followups() {
        let model = ScriptedModel {
            suggestions: vec!["add port 8080".to_string()],
            ..Default::default()
        };
        let driver = driver(model, ScriptedApi::succeeding(json!({})));
        let mut state = SessionState::new(SessionId("s-1".to_string()));
        state.push_message(MessageRecord::assistant("Your devbox is running."));

        let output = driver
            .run_turn(&mut state, input(Some(Stage::Suggest), "what next?"), None)
            .await
            .expect("turn");

        assert_eq!(output.next_stage, Stage::End);
        assert!(output.assistant_message.expect("message").contains("add port 8080"));
    }

    #[tokio::test]
    async fn every_turn_ends_with_exactly_one_new_assistant_message() {
        let model = ScriptedModel { turn: pause_database_turn(), ..Default::default() };
        let driver = driver(model, ScriptedApi::succeeding(json!({})));
        let mut state = SessionState::new(SessionId("s-1".to_string()));

        driver
            .run_turn(&mut state, input(Some(Stage::ManageResource), "pause main-db"), None)
            .await
            .expect("turn");

        let assistant_messages = state
            .history
            .iter()
            .filter(|message| message.role == rudder_core::session::MessageRole::Assistant)
            .count();
        assert_eq!(assistant_messages, 1);
    }
}
