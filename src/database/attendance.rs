use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::attendance::{AttendanceRecord, NewAttendanceRecord, RecordOutcome};
use uuid::Uuid;

#[async_trait::async_trait]
pub trait AttendanceRepository {
    /// Insert a record unless one already exists for (session, roll number).
    async fn record_attendance(&self, record: &NewAttendanceRecord) -> Result<RecordOutcome, AppError>;
    async fn list_attendance(&self, session_id: &Uuid) -> Result<Vec<AttendanceRecord>, AppError>;
}

#[async_trait::async_trait]
impl AttendanceRepository for PostgresRepository {
    async fn record_attendance(&self, record: &NewAttendanceRecord) -> Result<RecordOutcome, AppError> {
        let inserted = sqlx::query_as::<_, AttendanceRecord>(
            r#"
            INSERT INTO attendance_record (session_id, roll_number, code_used, submitted_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (session_id, roll_number) DO NOTHING
            RETURNING id, session_id, roll_number, code_used, submitted_at
            "#,
        )
        .bind(record.session_id)
        .bind(&record.roll_number)
        .bind(&record.code_used)
        .bind(record.submitted_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(inserted) = inserted {
            return Ok(RecordOutcome::Created(inserted));
        }

        let existing = sqlx::query_as::<_, AttendanceRecord>(
            r#"
            SELECT id, session_id, roll_number, code_used, submitted_at
            FROM attendance_record
            WHERE session_id = $1 AND roll_number = $2
            "#,
        )
        .bind(record.session_id)
        .bind(&record.roll_number)
        .fetch_one(&self.pool)
        .await?;

        Ok(RecordOutcome::Existing(existing))
    }

    async fn list_attendance(&self, session_id: &Uuid) -> Result<Vec<AttendanceRecord>, AppError> {
        let records = sqlx::query_as::<_, AttendanceRecord>(
            r#"
            SELECT id, session_id, roll_number, code_used, submitted_at
            FROM attendance_record
            WHERE session_id = $1
            ORDER BY submitted_at ASC, roll_number ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
