//! OpenAI-compatible chat client behind the [`LanguageModel`] trait.
//!
//! Each trait method sends one chat completion with a task-specific system
//! prompt and parses the structured reply. Replies that cannot be parsed are
//! transport failures; semantic validation (candidate and action-set
//! membership) stays in the adapters that sit above this client.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use rudder_core::actions::ActionSet;
use rudder_core::config::LlmConfig;
use rudder_core::session::{MessageRecord, MessageRole, PlanDraft, Stage};

use crate::llm::{ActionProposal, CollaboratorError, LanguageModel, ModelTurn};

pub struct OpenAiModel {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
}

impl OpenAiModel {
    pub fn from_config(config: &LlmConfig) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| CollaboratorError::Transport(error.to_string()))?;

        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/')
            .to_string();

        Ok(Self { client, base_url, api_key: config.api_key.clone(), model: config.model.clone() })
    }

    async fn chat(&self, system: &str, history: &[MessageRecord]) -> Result<String, CollaboratorError> {
        let mut messages = vec![serde_json::json!({ "role": "system", "content": system })];
        for record in history {
            // Action records are internal bookkeeping; the model sees them as
            // system context rather than dialogue.
            let role = match record.role {
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
                MessageRole::System | MessageRole::Action => "system",
            };
            messages.push(serde_json::json!({ "role": role, "content": record.content }));
        }

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.0,
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| CollaboratorError::Transport(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Transport(format!(
                "chat completion returned {status}: {detail}"
            )));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|error| CollaboratorError::Transport(error.to_string()))?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CollaboratorError::Transport("chat completion had no content".to_string()))
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn classify_stage(
        &self,
        history: &[MessageRecord],
        candidates: &[Stage],
    ) -> Result<Stage, CollaboratorError> {
        let names: Vec<&str> = candidates.iter().map(Stage::as_str).collect();
        let system = format!(
            "You route conversation turns for a cloud resource assistant. \
             Reply with exactly one of these stage names and nothing else: {}.",
            names.join(", ")
        );

        let reply = self.chat(&system, history).await?;
        parse_stage(&reply)
            .ok_or_else(|| CollaboratorError::Transport(format!("unparseable stage reply: {reply}")))
    }

    async fn propose_action(
        &self,
        history: &[MessageRecord],
        actions: &ActionSet,
    ) -> Result<ModelTurn, CollaboratorError> {
        let catalog: Vec<Value> = actions
            .iter()
            .map(|descriptor| {
                serde_json::json!({
                    "name": descriptor.name,
                    "parameters": descriptor.parameters,
                })
            })
            .collect();
        let system = format!(
            "You operate cloud resources on the user's behalf. Choose at most one \
             action from this catalog: {}. Reply with JSON of the shape \
             {{\"message\": string or null, \"action\": {{\"action_name\": string, \
             \"parameters\": object}} or null}} and nothing else.",
            serde_json::to_string(&catalog)
                .map_err(|error| CollaboratorError::Transport(error.to_string()))?
        );

        let reply = self.chat(&system, history).await?;
        parse_model_turn(&reply)
            .ok_or_else(|| CollaboratorError::Transport(format!("unparseable action reply: {reply}")))
    }

    async fn draft_plan(&self, history: &[MessageRecord]) -> Result<PlanDraft, CollaboratorError> {
        let system = "You draft cloud project plans. Reply with JSON of the shape \
                      {\"name\": string, \"description\": string, \"resources\": \
                      {\"devboxes\": [{\"name\", \"runtime\", \"description\"}], \
                      \"databases\": [{\"name\", \"engine\", \"description\"}], \
                      \"buckets\": [{\"name\", \"access\", \"description\"}]}} \
                      and nothing else.";

        let reply = self.chat(system, history).await?;
        serde_json::from_str(strip_code_fences(&reply))
            .map_err(|error| CollaboratorError::Transport(format!("unparseable plan reply: {error}")))
    }

    async fn suggest(
        &self,
        history_tail: &[MessageRecord],
    ) -> Result<Vec<String>, CollaboratorError> {
        let system = "Suggest up to two short follow-up actions the user could take \
                      next. Reply with a JSON array of strings and nothing else.";

        let reply = self.chat(system, history_tail).await?;
        serde_json::from_str(strip_code_fences(&reply)).map_err(|error| {
            CollaboratorError::Transport(format!("unparseable suggestion reply: {error}"))
        })
    }
}

fn parse_stage(reply: &str) -> Option<Stage> {
    Stage::parse(reply.trim().trim_matches('"').to_ascii_lowercase().as_str())
}

fn parse_model_turn(reply: &str) -> Option<ModelTurn> {
    let value: Value = serde_json::from_str(strip_code_fences(reply)).ok()?;
    let object = value.as_object()?;

    let message = object
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string);

    let action = match object.get("action") {
        None | Some(Value::Null) => None,
        Some(action) => {
            let action = action.as_object()?;
            let action_name = action.get("action_name").and_then(Value::as_str)?.to_string();
            let parameters = action
                .get("parameters")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            Some(ActionProposal { action_name, parameters })
        }
    };

    Some(ModelTurn { message, action })
}

/// Models wrap JSON in markdown fences often enough that stripping them here
/// is cheaper than re-prompting.
fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use rudder_core::session::Stage;

    use super::{parse_model_turn, parse_stage, strip_code_fences};

    #[test]
    fn stage_replies_parse_with_noise_trimmed() {
        assert_eq!(parse_stage("manage_resource"), Some(Stage::ManageResource));
        assert_eq!(parse_stage(" \"propose\" "), Some(Stage::Propose));
        assert_eq!(parse_stage("PROPOSE"), Some(Stage::Propose));
        assert_eq!(parse_stage("something else"), None);
    }

    #[test]
    fn model_turn_parses_message_and_action() {
        let turn = parse_model_turn(
            r#"{"message": "Pausing it now.", "action": {"action_name": "pause_database", "parameters": {"name": "main-db"}}}"#,
        )
        .expect("turn");

        assert_eq!(turn.message.as_deref(), Some("Pausing it now."));
        let action = turn.action.expect("action");
        assert_eq!(action.action_name, "pause_database");
        assert_eq!(action.parameters.get("name"), Some(&serde_json::json!("main-db")));
    }

    #[test]
    fn model_turn_with_null_action_is_message_only() {
        let turn = parse_model_turn(r#"{"message": "All set.", "action": null}"#).expect("turn");
        assert!(turn.action.is_none());
        assert_eq!(turn.message.as_deref(), Some("All set."));
    }

    #[test]
    fn fenced_json_replies_still_parse() {
        let fenced = "```json\n{\"message\": null, \"action\": null}\n```";
        let turn = parse_model_turn(fenced).expect("turn");
        assert!(turn.message.is_none());
        assert!(turn.action.is_none());

        assert_eq!(strip_code_fences("```json\n[]\n```"), "[]");
        assert_eq!(strip_code_fences("plain"), "plain");
    }

    #[test]
    fn garbage_reply_fails_to_parse() {
        assert!(parse_model_turn("I would pause the database for you").is_none());
    }
}
