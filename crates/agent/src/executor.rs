use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use rudder_core::approval::ExecutionResult;
use rudder_core::errors::DomainError;

/// Read-only per-session credential material for the downstream control
/// plane. The core never mutates or logs the kubeconfig.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub kubeconfig: SecretString,
    pub region_url: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResourceApiError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("request rejected by control plane: {0}")]
    Validation(String),
}

/// Downstream resource API collaborator: one operation per action name.
/// The core passes payloads through without interpreting their internals.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn invoke(
        &self,
        action_name: &str,
        parameters: &Map<String, Value>,
        credentials: &Credentials,
    ) -> Result<Value, ResourceApiError>;
}

/// Invokes the downstream operation for an approved action and normalizes
/// every outcome, success or failure, into a uniform `ExecutionResult`.
/// Raw downstream errors never propagate past this point.
#[derive(Clone, Debug)]
pub struct ActionExecutor<A> {
    api: A,
}

impl<A> ActionExecutor<A>
where
    A: ResourceApi,
{
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub async fn execute(
        &self,
        action_name: &str,
        final_parameters: Map<String, Value>,
        credentials: Option<&Credentials>,
    ) -> Result<ExecutionResult, DomainError> {
        let Some(credentials) = credentials else {
            return Err(DomainError::MissingSessionField { field: "credentials" });
        };

        let resource = resource_name(&final_parameters);
        match self.api.invoke(action_name, &final_parameters, credentials).await {
            Ok(payload) => {
                info!(action = action_name, resource = %resource, "action executed");
                Ok(ExecutionResult::succeeded(
                    action_name,
                    final_parameters,
                    payload,
                    format!("Completed `{action_name}` for '{resource}'."),
                ))
            }
            Err(error) => {
                warn!(action = action_name, resource = %resource, %error, "action failed");
                Ok(ExecutionResult::failed(
                    action_name,
                    final_parameters,
                    error.to_string(),
                    format!("Failed to run `{action_name}` for '{resource}': {error}"),
                ))
            }
        }
    }
}

fn resource_name(parameters: &Map<String, Value>) -> String {
    parameters
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("the requested resource")
        .to_string()
}
