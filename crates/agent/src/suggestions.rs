use tracing::warn;

use rudder_core::session::SessionState;

use crate::llm::{LanguageModel, ValidatingModel};

pub const MAX_SUGGESTIONS: usize = 2;

/// Terminal, optional follow-up generator. Reads only the most recent
/// assistant turn; collaborator failures degrade to an empty list with a
/// diagnostic instead of aborting the turn.
#[derive(Clone, Copy, Debug, Default)]
pub struct SuggestionGenerator;

impl SuggestionGenerator {
    pub async fn suggest<M>(&self, model: &ValidatingModel<M>, state: &SessionState) -> Vec<String>
    where
        M: LanguageModel,
    {
        let tail = match state.last_assistant_message() {
            Some(message) => std::slice::from_ref(message),
            None => return Vec::new(),
        };

        match model.suggest(tail).await {
            Ok(suggestions) => suggestions
                .into_iter()
                .map(|suggestion| suggestion.trim().to_string())
                .filter(|suggestion| !suggestion.is_empty())
                .take(MAX_SUGGESTIONS)
                .collect(),
            Err(error) => {
                warn!(%error, "suggestion generation failed, degrading to empty list");
                Vec::new()
            }
        }
    }
}
