use chrono::{DateTime, Utc};
use sqlx::Row;

use rudder_core::approval::{CorrelationId, PendingApproval};
use rudder_core::session::SessionId;

use super::{
    ApprovalRecordStatus, PendingApprovalRepository, RepositoryError, StoredPendingApproval,
};
use crate::DbPool;

pub struct SqlPendingApprovalRepository {
    pool: DbPool,
}

impl SqlPendingApprovalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_stored(row: &sqlx::sqlite::SqliteRow) -> Result<StoredPendingApproval, RepositoryError> {
    let correlation_id: String =
        row.try_get("correlation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let session_id: String =
        row.try_get("session_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let action_name: String =
        row.try_get("action_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let parameters_str: String = row
        .try_get("proposed_parameters")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let resolved_at_str: Option<String> =
        row.try_get("resolved_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let proposed_parameters = serde_json::from_str(&parameters_str)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status = ApprovalRecordStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown approval status `{status_str}`")))?;

    Ok(StoredPendingApproval {
        record: PendingApproval {
            correlation_id: CorrelationId(correlation_id),
            action_name,
            proposed_parameters,
            created_at: parse_timestamp(&created_at_str),
        },
        session_id: SessionId(session_id),
        status,
        resolved_at: resolved_at_str.as_deref().map(parse_timestamp),
    })
}

#[async_trait::async_trait]
impl PendingApprovalRepository for SqlPendingApprovalRepository {
    async fn find_by_correlation_id(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Option<StoredPendingApproval>, RepositoryError> {
        let row = sqlx::query(
            "SELECT correlation_id, session_id, action_name, proposed_parameters,
                    status, created_at, resolved_at
             FROM pending_approval WHERE correlation_id = ?",
        )
        .bind(&correlation_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_stored(row)?)),
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        session_id: &SessionId,
        record: &PendingApproval,
    ) -> Result<(), RepositoryError> {
        let parameters_str = serde_json::to_string(&record.proposed_parameters)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO pending_approval (correlation_id, session_id, action_name,
                                           proposed_parameters, status, created_at)
             VALUES (?, ?, ?, ?, 'pending', ?)",
        )
        .bind(&record.correlation_id.0)
        .bind(&session_id.0)
        .bind(&record.action_name)
        .bind(&parameters_str)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_resolved(
        &self,
        correlation_id: &CorrelationId,
        status: ApprovalRecordStatus,
    ) -> Result<(), RepositoryError> {
        // The status guard makes resolution a compare-and-set; a second
        // resolution attempt matches zero rows.
        let result = sqlx::query(
            "UPDATE pending_approval
             SET status = ?, resolved_at = ?
             WHERE correlation_id = ? AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(&correlation_id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "pending approval `{}` was already resolved or does not exist",
                correlation_id.0
            )));
        }
        Ok(())
    }
}
