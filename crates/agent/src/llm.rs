use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use rudder_core::actions::ActionSet;
use rudder_core::errors::{ApplicationError, DomainError};
use rudder_core::router::{ClassifierError, StageClassifier};
use rudder_core::session::{MessageRecord, PlanDraft, Stage};

/// One action the model elected, with the parameter values it chose.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionProposal {
    pub action_name: String,
    pub parameters: Map<String, Value>,
}

/// A single model response for an acting stage: free text, at most one
/// action, or both. At most one action per response is a deliberate policy,
/// it keeps the approval gate to one in-flight record per turn.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelTurn {
    pub message: Option<String>,
    pub action: Option<ActionProposal>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("language model transport failure: {0}")]
    Transport(String),
}

/// Narrow interface over the language-model collaborator. Prompt
/// construction, structured-output parsing, and model selection live behind
/// implementations of this trait; the core never sees them.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn classify_stage(
        &self,
        history: &[MessageRecord],
        candidates: &[Stage],
    ) -> Result<Stage, CollaboratorError>;

    async fn propose_action(
        &self,
        history: &[MessageRecord],
        actions: &ActionSet,
    ) -> Result<ModelTurn, CollaboratorError>;

    async fn draft_plan(&self, history: &[MessageRecord]) -> Result<PlanDraft, CollaboratorError>;

    async fn suggest(&self, history_tail: &[MessageRecord])
        -> Result<Vec<String>, CollaboratorError>;
}

/// Validating adapter around a language model. Out-of-set responses are
/// rejected at this boundary instead of trusting the collaborator's own
/// schema enforcement.
#[derive(Clone, Debug)]
pub struct ValidatingModel<M> {
    inner: M,
}

impl<M> ValidatingModel<M>
where
    M: LanguageModel,
{
    pub fn new(inner: M) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    /// Ask for an action and enforce that any elected action belongs to the
    /// offered set. An unlisted action is a collaborator contract violation,
    /// never a routing outcome.
    pub async fn propose_action(
        &self,
        history: &[MessageRecord],
        actions: &ActionSet,
    ) -> Result<ModelTurn, ApplicationError> {
        let turn = self
            .inner
            .propose_action(history, actions)
            .await
            .map_err(|error| ApplicationError::Collaborator(error.to_string()))?;

        if let Some(action) = &turn.action {
            if !actions.contains(&action.action_name) {
                return Err(DomainError::CollaboratorContractViolation {
                    collaborator: "language_model",
                    detail: format!(
                        "proposed action `{}` is not in the offered action set",
                        action.action_name
                    ),
                }
                .into());
            }
        }

        Ok(turn)
    }

    pub async fn draft_plan(
        &self,
        history: &[MessageRecord],
    ) -> Result<PlanDraft, CollaboratorError> {
        self.inner.draft_plan(history).await
    }

    pub async fn suggest(
        &self,
        history_tail: &[MessageRecord],
    ) -> Result<Vec<String>, CollaboratorError> {
        self.inner.suggest(history_tail).await
    }
}

#[async_trait]
impl<M> StageClassifier for ValidatingModel<M>
where
    M: LanguageModel,
{
    async fn classify(
        &self,
        history: &[MessageRecord],
        candidates: &[Stage],
    ) -> Result<Stage, ClassifierError> {
        let stage = self
            .inner
            .classify_stage(history, candidates)
            .await
            .map_err(|error| ClassifierError::Transport(error.to_string()))?;

        if candidates.contains(&stage) {
            Ok(stage)
        } else {
            Err(ClassifierError::OutOfSet { returned: stage.as_str().to_string() })
        }
    }
}
