use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const REJECTED_BY_USER: &str = "rejected_by_user";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Durable record of a proposed-but-unresolved mutating action. Created at
/// the suspension point, consumed exactly once by `ApprovalGate::resume`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub correlation_id: CorrelationId,
    pub action_name: String,
    pub proposed_parameters: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// Boundary contract for the host resume channel. Anything that does not
/// parse into `{approve: bool, payload: object}` collapses to a rejection
/// with an empty payload: the gate fails closed, never open.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeDecision {
    pub approve: bool,
    pub payload: Map<String, Value>,
}

impl ResumeDecision {
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_value(&value),
            Err(_) => Self::default(),
        }
    }

    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };
        let approve = object.get("approve").and_then(Value::as_bool).unwrap_or(false);
        let payload = object
            .get("payload")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Self { approve, payload }
    }
}

/// For every key in the proposal, take the edited value when present and the
/// proposed value otherwise. Unedited fields never revert to defaults; edit
/// keys outside the proposal are ignored.
pub fn merge_parameters(
    proposed: &Map<String, Value>,
    edits: &Map<String, Value>,
) -> Map<String, Value> {
    proposed
        .iter()
        .map(|(key, proposed_value)| {
            let value = edits.get(key).unwrap_or(proposed_value).clone();
            (key.clone(), value)
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub action_name: String,
    pub final_parameters: Map<String, Value>,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApprovalOutcome {
    Approved { action_name: String, final_parameters: Map<String, Value> },
    Rejected(RejectionRecord),
}

/// Uniform result envelope for an executed action. Downstream failures are
/// captured here rather than propagated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub action_name: String,
    pub final_parameters: Map<String, Value>,
    pub success: bool,
    pub payload: Option<Value>,
    pub error: Option<String>,
    pub human_message: String,
}

impl ExecutionResult {
    pub fn succeeded(
        action_name: impl Into<String>,
        final_parameters: Map<String, Value>,
        payload: Value,
        human_message: impl Into<String>,
    ) -> Self {
        Self {
            action_name: action_name.into(),
            final_parameters,
            success: true,
            payload: Some(payload),
            error: None,
            human_message: human_message.into(),
        }
    }

    pub fn failed(
        action_name: impl Into<String>,
        final_parameters: Map<String, Value>,
        error: impl Into<String>,
        human_message: impl Into<String>,
    ) -> Self {
        Self {
            action_name: action_name.into(),
            final_parameters,
            success: false,
            payload: None,
            error: Some(error.into()),
            human_message: human_message.into(),
        }
    }
}

/// Two-phase suspend/resume checkpoint. `propose` is the single suspension
/// point in the core: the record it returns is persisted by the host, and
/// `resume` may run in a different process invocation arbitrarily later.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApprovalGate;

impl ApprovalGate {
    pub fn propose(
        &self,
        action_name: impl Into<String>,
        proposed_parameters: Map<String, Value>,
    ) -> PendingApproval {
        PendingApproval {
            correlation_id: CorrelationId::random(),
            action_name: action_name.into(),
            proposed_parameters,
            created_at: Utc::now(),
        }
    }

    /// Consume the pending record with a raw host decision. The record is
    /// independent of any earlier approval or rejection; nothing here
    /// carries over between correlation ids.
    pub fn resume(&self, record: &PendingApproval, raw_decision: &str) -> ApprovalOutcome {
        let decision = ResumeDecision::parse(raw_decision);
        self.resume_with(record, &decision)
    }

    pub fn resume_with(
        &self,
        record: &PendingApproval,
        decision: &ResumeDecision,
    ) -> ApprovalOutcome {
        let final_parameters = merge_parameters(&record.proposed_parameters, &decision.payload);
        if decision.approve {
            ApprovalOutcome::Approved { action_name: record.action_name.clone(), final_parameters }
        } else {
            ApprovalOutcome::Rejected(RejectionRecord {
                action_name: record.action_name.clone(),
                final_parameters,
                reason: REJECTED_BY_USER.to_string(),
            })
        }
    }
}
