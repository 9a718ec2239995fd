use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Named step in the conversation state machine. `End` is the only terminal
/// stage; every turn eventually routes there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Propose,
    ManageProject,
    ManageResource,
    Deploy,
    Suggest,
    End,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Propose => "propose",
            Self::ManageProject => "manage_project",
            Self::ManageResource => "manage_resource",
            Self::Deploy => "deploy",
            Self::Suggest => "suggest",
            Self::End => "end",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "propose" => Some(Self::Propose),
            "manage_project" => Some(Self::ManageProject),
            "manage_resource" => Some(Self::ManageResource),
            "deploy" => Some(Self::Deploy),
            "suggest" => Some(Self::Suggest),
            "end" => Some(Self::End),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Action,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Action => "action",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            "action" => Some(Self::Action),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), created_at: Utc::now() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn action(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Action, content)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BucketAccess {
    Private,
    PublicRead,
    PublicReadwrite,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevboxPlan {
    pub name: String,
    pub runtime: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabasePlan {
    pub name: String,
    pub engine: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketPlan {
    pub name: String,
    pub access: BucketAccess,
    pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanResources {
    pub devboxes: Vec<DevboxPlan>,
    pub databases: Vec<DatabasePlan>,
    pub buckets: Vec<BucketPlan>,
}

/// Draft project plan produced by the composition stage. The router seeds an
/// empty draft so downstream stages always observe a consistent shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDraft {
    pub name: String,
    pub description: String,
    pub resources: PlanResources,
}

impl PlanDraft {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.resources.devboxes.is_empty()
            && self.resources.databases.is_empty()
            && self.resources.buckets.is_empty()
    }
}

/// Per-conversation state. Owned by the graph driver for the lifetime of one
/// turn and persisted between turns by the host application. History is
/// append-only within a turn; "no context" is a first-class state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: SessionId,
    pub history: Vec<MessageRecord>,
    pub stage: Option<Stage>,
    pub project_context: Option<Value>,
    pub resource_context: Option<Value>,
    pub pending_plan: Option<PlanDraft>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            history: Vec::new(),
            stage: None,
            project_context: None,
            resource_context: None,
            pending_plan: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push_message(&mut self, message: MessageRecord) {
        self.updated_at = Utc::now();
        self.history.push(message);
    }

    pub fn last_assistant_message(&self) -> Option<&MessageRecord> {
        self.history.iter().rev().find(|message| message.role == MessageRole::Assistant)
    }
}
