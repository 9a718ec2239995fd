use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use rudder_core::approval::{CorrelationId, PendingApproval};
use rudder_core::session::{SessionId, SessionState};

use super::{
    ApprovalRecordStatus, PendingApprovalRepository, RepositoryError, SessionRepository,
    StoredPendingApproval,
};

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, SessionState>>,
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<SessionState>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id.0).cloned())
    }

    async fn save(&self, state: &SessionState) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(state.session_id.0.clone(), state.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPendingApprovalRepository {
    records: RwLock<HashMap<String, StoredPendingApproval>>,
}

#[async_trait::async_trait]
impl PendingApprovalRepository for InMemoryPendingApprovalRepository {
    async fn find_by_correlation_id(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Option<StoredPendingApproval>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(&correlation_id.0).cloned())
    }

    async fn save(
        &self,
        session_id: &SessionId,
        record: &PendingApproval,
    ) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.insert(
            record.correlation_id.0.clone(),
            StoredPendingApproval {
                record: record.clone(),
                session_id: session_id.clone(),
                status: ApprovalRecordStatus::Pending,
                resolved_at: None,
            },
        );
        Ok(())
    }

    async fn mark_resolved(
        &self,
        correlation_id: &CorrelationId,
        status: ApprovalRecordStatus,
    ) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        match records.get_mut(&correlation_id.0) {
            Some(stored) if stored.status == ApprovalRecordStatus::Pending => {
                stored.status = status;
                stored.resolved_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(RepositoryError::Conflict(format!(
                "pending approval `{}` was already resolved or does not exist",
                correlation_id.0
            ))),
        }
    }
}
