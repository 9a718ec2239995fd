use chrono::{DateTime, Utc};
use sqlx::Row;

use rudder_core::session::{
    MessageRecord, MessageRole, PlanDraft, SessionId, SessionState, Stage,
};

use super::{RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn encode_json<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>, RepositoryError> {
    value
        .as_ref()
        .map(|inner| serde_json::to_string(inner))
        .transpose()
        .map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<SessionState, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let stage_str: Option<String> =
        row.try_get("stage").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let project_context_str: Option<String> =
        row.try_get("project_context").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let resource_context_str: Option<String> =
        row.try_get("resource_context").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let pending_plan_str: Option<String> =
        row.try_get("pending_plan").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let stage = stage_str.as_deref().and_then(Stage::parse);
    let project_context = project_context_str
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let resource_context = resource_context_str
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let pending_plan: Option<PlanDraft> = pending_plan_str
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(SessionState {
        session_id: SessionId(id),
        history: Vec::new(),
        stage,
        project_context,
        resource_context,
        pending_plan,
        created_at: parse_timestamp(&created_at_str),
        updated_at: parse_timestamp(&updated_at_str),
    })
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<MessageRecord, RepositoryError> {
    let role_str: String =
        row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let content: String =
        row.try_get("content").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let role = MessageRole::parse(&role_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown message role `{role_str}`")))?;

    Ok(MessageRecord { role, content, created_at: parse_timestamp(&created_at_str) })
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<SessionState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, stage, project_context, resource_context, pending_plan,
                    created_at, updated_at
             FROM session WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(ref row) = row else {
            return Ok(None);
        };
        let mut state = row_to_session(row)?;

        let message_rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT role, content, created_at
             FROM session_message WHERE session_id = ? ORDER BY id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        state.history =
            message_rows.iter().map(row_to_message).collect::<Result<Vec<_>, _>>()?;
        Ok(Some(state))
    }

    /// Persist the whole aggregate. Messages are rewritten from the in-memory
    /// history so the stored transcript always matches the state object.
    async fn save(&self, state: &SessionState) -> Result<(), RepositoryError> {
        let stage_str = state.stage.map(|stage| stage.as_str());
        let project_context_str = encode_json(&state.project_context)?;
        let resource_context_str = encode_json(&state.resource_context)?;
        let pending_plan_str = encode_json(&state.pending_plan)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO session (id, stage, project_context, resource_context, pending_plan,
                                  created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 stage = excluded.stage,
                 project_context = excluded.project_context,
                 resource_context = excluded.resource_context,
                 pending_plan = excluded.pending_plan,
                 updated_at = excluded.updated_at",
        )
        .bind(&state.session_id.0)
        .bind(stage_str)
        .bind(&project_context_str)
        .bind(&resource_context_str)
        .bind(&pending_plan_str)
        .bind(state.created_at.to_rfc3339())
        .bind(state.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM session_message WHERE session_id = ?")
            .bind(&state.session_id.0)
            .execute(&mut *tx)
            .await?;

        for message in &state.history {
            sqlx::query(
                "INSERT INTO session_message (session_id, role, content, created_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&state.session_id.0)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(message.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use rudder_core::session::{MessageRecord, SessionId, SessionState, Stage};

    use super::SqlSessionRepository;
    use crate::repositories::SessionRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_session(id: &str) -> SessionState {
        let mut state = SessionState::new(SessionId(id.to_string()));
        state.stage = Some(Stage::ManageResource);
        state.resource_context = Some(json!({ "name": "main-db", "resourceType": "cluster" }));
        state.push_message(MessageRecord::user("pause my database main-db"));
        state.push_message(MessageRecord::assistant("Approval required."));
        state
    }

    #[tokio::test]
    async fn save_and_find_round_trips_state_and_transcript() {
        let pool = setup().await;
        let repo = SqlSessionRepository::new(pool);
        let state = sample_session("s-1");

        repo.save(&state).await.expect("save");
        let found = repo.find_by_id(&state.session_id).await.expect("find").expect("exists");

        assert_eq!(found.stage, Some(Stage::ManageResource));
        assert_eq!(found.resource_context, state.resource_context);
        assert_eq!(found.history.len(), 2);
        assert_eq!(found.history[0].content, "pause my database main-db");
    }

    #[tokio::test]
    async fn find_missing_session_returns_none() {
        let pool = setup().await;
        let repo = SqlSessionRepository::new(pool);

        let found = repo.find_by_id(&SessionId("absent".to_string())).await.expect("find");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn save_upserts_and_rewrites_the_transcript() {
        let pool = setup().await;
        let repo = SqlSessionRepository::new(pool);
        let mut state = sample_session("s-1");

        repo.save(&state).await.expect("save");

        state.stage = Some(Stage::End);
        state.push_message(MessageRecord::assistant("Done."));
        repo.save(&state).await.expect("upsert");

        let found = repo.find_by_id(&state.session_id).await.expect("find").expect("exists");
        assert_eq!(found.stage, Some(Stage::End));
        assert_eq!(found.history.len(), 3);
        assert_eq!(found.history[2].content, "Done.");
    }
}
