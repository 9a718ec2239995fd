use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::Row;

use rudder_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use rudder_core::session::SessionId;

use super::{AuditEventRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditEventRepository {
    pool: DbPool,
}

impl SqlAuditEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub fn category_as_str(category: &AuditCategory) -> &'static str {
    match category {
        AuditCategory::Routing => "routing",
        AuditCategory::Approval => "approval",
        AuditCategory::Execution => "execution",
        AuditCategory::Suggestion => "suggestion",
        AuditCategory::System => "system",
    }
}

fn parse_category(value: &str) -> Option<AuditCategory> {
    match value {
        "routing" => Some(AuditCategory::Routing),
        "approval" => Some(AuditCategory::Approval),
        "execution" => Some(AuditCategory::Execution),
        "suggestion" => Some(AuditCategory::Suggestion),
        "system" => Some(AuditCategory::System),
        _ => None,
    }
}

pub fn outcome_as_str(outcome: &AuditOutcome) -> &'static str {
    match outcome {
        AuditOutcome::Success => "success",
        AuditOutcome::Rejected => "rejected",
        AuditOutcome::Failed => "failed",
    }
}

fn parse_outcome(value: &str) -> Option<AuditOutcome> {
    match value {
        "success" => Some(AuditOutcome::Success),
        "rejected" => Some(AuditOutcome::Rejected),
        "failed" => Some(AuditOutcome::Failed),
        _ => None,
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let event_id: String =
        row.try_get("event_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let session_id: Option<String> =
        row.try_get("session_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let correlation_id: String =
        row.try_get("correlation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let event_type: String =
        row.try_get("event_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let category_str: String =
        row.try_get("category").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let actor: String =
        row.try_get("actor").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let outcome_str: String =
        row.try_get("outcome").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let metadata_str: String =
        row.try_get("metadata").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let occurred_at_str: String =
        row.try_get("occurred_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let category = parse_category(&category_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown category `{category_str}`")))?;
    let outcome = parse_outcome(&outcome_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown outcome `{outcome_str}`")))?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_str)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let occurred_at = DateTime::parse_from_rfc3339(&occurred_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(AuditEvent {
        event_id,
        session_id: session_id.map(SessionId),
        correlation_id,
        event_type,
        category,
        actor,
        outcome,
        metadata,
        occurred_at,
    })
}

#[async_trait::async_trait]
impl AuditEventRepository for SqlAuditEventRepository {
    async fn append(&self, event: &AuditEvent) -> Result<(), RepositoryError> {
        let metadata_str = serde_json::to_string(&event.metadata)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO audit_event (event_id, session_id, correlation_id, event_type,
                                      category, actor, outcome, metadata, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(event.session_id.as_ref().map(|id| id.0.as_str()))
        .bind(&event.correlation_id)
        .bind(&event.event_type)
        .bind(category_as_str(&event.category))
        .bind(&event.actor)
        .bind(outcome_as_str(&event.outcome))
        .bind(&metadata_str)
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT event_id, session_id, correlation_id, event_type, category,
                    actor, outcome, metadata, occurred_at
             FROM audit_event WHERE session_id = ? ORDER BY occurred_at ASC",
        )
        .bind(&session_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect::<Result<Vec<_>, _>>()
    }
}

#[cfg(test)]
mod tests {
    use rudder_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
    use rudder_core::session::SessionId;

    use super::SqlAuditEventRepository;
    use crate::repositories::AuditEventRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_event(session_id: &str, event_type: &str) -> AuditEvent {
        AuditEvent::new(
            Some(SessionId(session_id.to_string())),
            "corr-1",
            event_type,
            AuditCategory::Approval,
            "graph-driver",
            AuditOutcome::Success,
        )
        .with_metadata("action", "pause_database")
    }

    #[tokio::test]
    async fn append_and_list_round_trips_metadata() {
        let pool = setup().await;
        let repo = SqlAuditEventRepository::new(pool);

        repo.append(&sample_event("s-1", "approval.suspended")).await.expect("append");
        repo.append(&sample_event("s-1", "approval.resolved")).await.expect("append");
        repo.append(&sample_event("s-2", "approval.suspended")).await.expect("append");

        let events =
            repo.list_for_session(&SessionId("s-1".to_string())).await.expect("list");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].metadata.get("action").map(String::as_str), Some("pause_database"));
        assert_eq!(events[0].correlation_id, "corr-1");
    }
}
