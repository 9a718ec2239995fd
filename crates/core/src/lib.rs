//! Core orchestration types for the Rudder conversational agent.
//!
//! Rudder routes a user's chat turns through a small set of named stages,
//! lets a language model decide what to do next, and forces a
//! human-approval checkpoint before any action that mutates cloud
//! resources is executed.
//!
//! This crate holds the deterministic heart of that machinery:
//!
//! - `session` - per-conversation state, stages, and message history
//! - `router` - explicit-tag and LLM-classified stage routing
//! - `actions` - the registry mapping resource kinds to legal action sets
//! - `approval` - the two-phase suspend/resume gate over mutating actions
//! - `audit` - structured audit events for routing and approval decisions
//! - `config` / `errors` - typed configuration and the layered error model
//!
//! # Safety Principle
//!
//! The language model is strictly a selector. It chooses a stage from a
//! closed candidate set and an action from a constrained action set; it
//! never executes anything. Execution happens only after the approval gate
//! resolves, and the gate fails closed on any malformed approval input.

pub mod actions;
pub mod approval;
pub mod audit;
pub mod config;
pub mod errors;
pub mod router;
pub mod session;

pub use actions::{ActionDescriptor, ActionRegistry, ActionSet, ResourceKind};
pub use approval::{
    merge_parameters, ApprovalGate, ApprovalOutcome, CorrelationId, ExecutionResult,
    PendingApproval, RejectionRecord, ResumeDecision, REJECTED_BY_USER,
};
pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{AppConfig, ConfigError, DatabaseConfig, LlmConfig, LogFormat, LoggingConfig};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use router::{
    ClassifierError, RoutedTurn, StageClassifier, StageRouter, StatePatch, BARE_CANDIDATES,
    CONTEXTUAL_CANDIDATES,
};
pub use session::{
    MessageRecord, MessageRole, PlanDraft, PlanResources, SessionId, SessionState, Stage,
};
