use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::session::{CodeRotation, IssuedCode, NewSession, Session};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait::async_trait]
pub trait SessionRepository {
    async fn create_session(&self, new_session: &NewSession) -> Result<Session, AppError>;
    async fn get_session(&self, id: &Uuid) -> Result<Option<Session>, AppError>;
    async fn list_sessions(&self, include_closed: bool) -> Result<Vec<Session>, AppError>;
    /// Swap the active code if the session still holds `rotation.expected_code` and is open.
    /// Returns `None` when the swap did not happen.
    async fn replace_code(&self, id: &Uuid, rotation: &CodeRotation) -> Result<Option<Session>, AppError>;
    async fn close_session(&self, id: &Uuid, closed_at: DateTime<Utc>) -> Result<Option<Session>, AppError>;
    /// Open sessions whose active code expired at or before `now`.
    async fn list_expired_sessions(&self, now: DateTime<Utc>) -> Result<Vec<Session>, AppError>;
    async fn list_issued_codes(&self, session_id: &Uuid) -> Result<Vec<IssuedCode>, AppError>;
}

#[async_trait::async_trait]
impl SessionRepository for PostgresRepository {
    async fn create_session(&self, new_session: &NewSession) -> Result<Session, AppError> {
        let mut tx = self.pool.begin().await?;

        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO attendance_session (course_label, active_code, code_issued_at, rotation_interval_seconds, created_at)
            VALUES ($1, $2, $3, $4, $3)
            RETURNING id, course_label, active_code, code_issued_at, rotation_interval_seconds,
                      previous_code, previous_code_expires_at, created_at, closed_at
            "#,
        )
        .bind(&new_session.course_label)
        .bind(&new_session.code)
        .bind(new_session.issued_at)
        .bind(new_session.rotation_interval_seconds)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO session_code (session_id, code, source, issued_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session.id)
        .bind(&new_session.code)
        .bind(&new_session.code_source)
        .bind(new_session.issued_at)
        .bind(session.code_expires_at())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(session)
    }

    async fn get_session(&self, id: &Uuid) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, course_label, active_code, code_issued_at, rotation_interval_seconds,
                   previous_code, previous_code_expires_at, created_at, closed_at
            FROM attendance_session
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn list_sessions(&self, include_closed: bool) -> Result<Vec<Session>, AppError> {
        let sessions = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, course_label, active_code, code_issued_at, rotation_interval_seconds,
                   previous_code, previous_code_expires_at, created_at, closed_at
            FROM attendance_session
            WHERE $1 OR closed_at IS NULL
            ORDER BY created_at DESC
            "#,
        )
        .bind(include_closed)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn replace_code(&self, id: &Uuid, rotation: &CodeRotation) -> Result<Option<Session>, AppError> {
        let mut tx = self.pool.begin().await?;

        let session = sqlx::query_as::<_, Session>(
            r#"
            UPDATE attendance_session
            SET previous_code = active_code,
                previous_code_expires_at = $3,
                active_code = $4,
                code_issued_at = $5
            WHERE id = $1
              AND active_code = $2
              AND closed_at IS NULL
            RETURNING id, course_label, active_code, code_issued_at, rotation_interval_seconds,
                      previous_code, previous_code_expires_at, created_at, closed_at
            "#,
        )
        .bind(id)
        .bind(&rotation.expected_code)
        .bind(rotation.previous_code_expires_at)
        .bind(&rotation.new_code)
        .bind(rotation.issued_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(session) = session else {
            // Lost the race or the session is gone; dropping the transaction rolls back.
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE session_code
            SET expires_at = $3
            WHERE id = (
                SELECT id FROM session_code
                WHERE session_id = $1 AND code = $2
                ORDER BY issued_at DESC
                LIMIT 1
            )
            "#,
        )
        .bind(id)
        .bind(&rotation.expected_code)
        .bind(rotation.previous_code_expires_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO session_code (session_id, code, source, issued_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(&rotation.new_code)
        .bind(&rotation.code_source)
        .bind(rotation.issued_at)
        .bind(session.code_expires_at())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(session))
    }

    async fn close_session(&self, id: &Uuid, closed_at: DateTime<Utc>) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            UPDATE attendance_session
            SET closed_at = COALESCE(closed_at, $2)
            WHERE id = $1
            RETURNING id, course_label, active_code, code_issued_at, rotation_interval_seconds,
                      previous_code, previous_code_expires_at, created_at, closed_at
            "#,
        )
        .bind(id)
        .bind(closed_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn list_expired_sessions(&self, now: DateTime<Utc>) -> Result<Vec<Session>, AppError> {
        let sessions = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, course_label, active_code, code_issued_at, rotation_interval_seconds,
                   previous_code, previous_code_expires_at, created_at, closed_at
            FROM attendance_session
            WHERE closed_at IS NULL
              AND code_issued_at + rotation_interval_seconds * INTERVAL '1 second' <= $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn list_issued_codes(&self, session_id: &Uuid) -> Result<Vec<IssuedCode>, AppError> {
        let codes = sqlx::query_as::<_, IssuedCode>(
            r#"
            SELECT id, session_id, code, source, issued_at, expires_at
            FROM session_code
            WHERE session_id = $1
            ORDER BY issued_at ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(codes)
    }
}
