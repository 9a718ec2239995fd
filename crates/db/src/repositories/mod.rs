use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use rudder_core::approval::{CorrelationId, PendingApproval};
use rudder_core::audit::AuditEvent;
use rudder_core::session::{SessionId, SessionState};

pub mod approval;
pub mod audit;
pub mod memory;
pub mod session;

pub use approval::SqlPendingApprovalRepository;
pub use audit::SqlAuditEventRepository;
pub use memory::{InMemoryPendingApprovalRepository, InMemorySessionRepository};
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Terminal disposition of a stored pending approval. A record leaves
/// `Pending` exactly once and never returns to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalRecordStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// A pending approval as stored, with its owning session and disposition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredPendingApproval {
    pub record: PendingApproval,
    pub session_id: SessionId,
    pub status: ApprovalRecordStatus,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<SessionState>, RepositoryError>;
    async fn save(&self, state: &SessionState) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PendingApprovalRepository: Send + Sync {
    async fn find_by_correlation_id(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Option<StoredPendingApproval>, RepositoryError>;

    async fn save(
        &self,
        session_id: &SessionId,
        record: &PendingApproval,
    ) -> Result<(), RepositoryError>;

    /// Transition a pending record to a terminal status. Fails with
    /// `Conflict` when the record was already resolved; a record resolves
    /// exactly once.
    async fn mark_resolved(
        &self,
        correlation_id: &CorrelationId,
        status: ApprovalRecordStatus,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AuditEventRepository: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<(), RepositoryError>;
    async fn list_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<AuditEvent>, RepositoryError>;
}
