use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::session::{MessageRecord, PlanDraft, SessionState, Stage};

/// Language-model collaborator for intent classification. Implementations
/// must return one of the offered candidates; the router still validates the
/// returned value and treats anything unlisted as a contract violation.
#[async_trait]
pub trait StageClassifier: Send + Sync {
    async fn classify(
        &self,
        history: &[MessageRecord],
        candidates: &[Stage],
    ) -> Result<Stage, ClassifierError>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("classifier transport failure: {0}")]
    Transport(String),
    #[error("classifier returned `{returned}` which is not among the offered candidates")]
    OutOfSet { returned: String },
}

/// State updates the router wants applied before the selected stage runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatePatch {
    pub pending_plan: Option<PlanDraft>,
}

impl StatePatch {
    pub fn apply(self, state: &mut SessionState) {
        if let Some(plan) = self.pending_plan {
            state.pending_plan = Some(plan);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending_plan.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutedTurn {
    pub next_stage: Stage,
    pub patch: StatePatch,
    /// Present when the router recovered from a collaborator failure by
    /// forcing the terminal stage.
    pub diagnostic: Option<String>,
}

/// Stage candidates offered to the classifier when a project or resource
/// context is in focus.
pub const CONTEXTUAL_CANDIDATES: &[Stage] =
    &[Stage::ManageProject, Stage::ManageResource, Stage::Deploy, Stage::Suggest];

/// Stage candidates offered when no context is present.
pub const BARE_CANDIDATES: &[Stage] =
    &[Stage::Propose, Stage::ManageProject, Stage::ManageResource, Stage::Suggest];

#[derive(Clone, Copy, Debug, Default)]
pub struct StageRouter;

impl StageRouter {
    /// Route one turn. A known explicit stage tag transitions directly with
    /// no collaborator call; absent (or `Idle`) stage falls through to
    /// classification against a closed candidate set.
    pub async fn route<C>(&self, state: &SessionState, classifier: &C) -> RoutedTurn
    where
        C: StageClassifier + ?Sized,
    {
        match state.stage {
            Some(Stage::End) => return RoutedTurn {
                next_stage: Stage::End,
                patch: StatePatch::default(),
                diagnostic: None,
            },
            Some(stage) if stage != Stage::Idle => {
                return RoutedTurn {
                    next_stage: stage,
                    patch: self.patch_for(state, stage),
                    diagnostic: None,
                };
            }
            _ => {}
        }

        let candidates = self.candidates_for(state);
        match classifier.classify(&state.history, candidates).await {
            Ok(stage) if candidates.contains(&stage) => RoutedTurn {
                next_stage: stage,
                patch: self.patch_for(state, stage),
                diagnostic: None,
            },
            Ok(stage) => {
                let diagnostic = format!(
                    "classifier selected `{}` outside the offered candidate set",
                    stage.as_str()
                );
                warn!(returned = stage.as_str(), "stage classification contract violation");
                RoutedTurn {
                    next_stage: Stage::End,
                    patch: StatePatch::default(),
                    diagnostic: Some(diagnostic),
                }
            }
            Err(error) => {
                warn!(%error, "stage classification failed");
                RoutedTurn {
                    next_stage: Stage::End,
                    patch: StatePatch::default(),
                    diagnostic: Some(error.to_string()),
                }
            }
        }
    }

    pub fn candidates_for(&self, state: &SessionState) -> &'static [Stage] {
        if state.project_context.is_some() || state.resource_context.is_some() {
            CONTEXTUAL_CANDIDATES
        } else {
            BARE_CANDIDATES
        }
    }

    fn patch_for(&self, state: &SessionState, next_stage: Stage) -> StatePatch {
        let mut patch = StatePatch::default();
        // The composition stage expects a draft plan to exist before it runs.
        if next_stage == Stage::Propose && state.pending_plan.is_none() {
            patch.pending_plan = Some(PlanDraft::empty());
        }
        patch
    }
}
