use crate::database::attendance::AttendanceRepository;
use crate::database::session::SessionRepository;
use crate::error::app_error::AppError;
use crate::models::attendance::{AttendanceRecord, NewAttendanceRecord, RecordOutcome};
use crate::models::session::{CodeRotation, IssuedCode, NewSession, Session};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    sessions: HashMap<Uuid, Session>,
    codes: Vec<IssuedCode>,
    records: HashMap<(Uuid, String), AttendanceRecord>,
}

/// Process-local storage. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: Mutex<MemoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SessionRepository for InMemoryRepository {
    async fn create_session(&self, new_session: &NewSession) -> Result<Session, AppError> {
        let session = Session {
            id: Uuid::new_v4(),
            course_label: new_session.course_label.clone(),
            active_code: new_session.code.clone(),
            code_issued_at: new_session.issued_at,
            rotation_interval_seconds: new_session.rotation_interval_seconds,
            previous_code: None,
            previous_code_expires_at: None,
            created_at: new_session.issued_at,
            closed_at: None,
        };

        let mut state = self.state.lock().await;
        state.codes.push(IssuedCode {
            id: Uuid::new_v4(),
            session_id: session.id,
            code: new_session.code.clone(),
            source: new_session.code_source.clone(),
            issued_at: new_session.issued_at,
            expires_at: session.code_expires_at(),
        });
        state.sessions.insert(session.id, session.clone());

        Ok(session)
    }

    async fn get_session(&self, id: &Uuid) -> Result<Option<Session>, AppError> {
        let state = self.state.lock().await;
        Ok(state.sessions.get(id).cloned())
    }

    async fn list_sessions(&self, include_closed: bool) -> Result<Vec<Session>, AppError> {
        let state = self.state.lock().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|session| include_closed || session.is_open())
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn replace_code(&self, id: &Uuid, rotation: &CodeRotation) -> Result<Option<Session>, AppError> {
        let mut state = self.state.lock().await;

        let updated = match state.sessions.get_mut(id) {
            Some(session) if session.is_open() && session.active_code == rotation.expected_code => {
                session.previous_code = Some(std::mem::replace(&mut session.active_code, rotation.new_code.clone()));
                session.previous_code_expires_at = Some(rotation.previous_code_expires_at);
                session.code_issued_at = rotation.issued_at;
                session.clone()
            }
            _ => return Ok(None),
        };

        if let Some(previous) = state
            .codes
            .iter_mut()
            .filter(|code| code.session_id == *id && code.code == rotation.expected_code)
            .max_by_key(|code| code.issued_at)
        {
            previous.expires_at = rotation.previous_code_expires_at;
        }

        state.codes.push(IssuedCode {
            id: Uuid::new_v4(),
            session_id: *id,
            code: rotation.new_code.clone(),
            source: rotation.code_source.clone(),
            issued_at: rotation.issued_at,
            expires_at: updated.code_expires_at(),
        });

        Ok(Some(updated))
    }

    async fn close_session(&self, id: &Uuid, closed_at: DateTime<Utc>) -> Result<Option<Session>, AppError> {
        let mut state = self.state.lock().await;
        Ok(state.sessions.get_mut(id).map(|session| {
            session.closed_at.get_or_insert(closed_at);
            session.clone()
        }))
    }

    async fn list_expired_sessions(&self, now: DateTime<Utc>) -> Result<Vec<Session>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .values()
            .filter(|session| session.is_open() && session.is_code_expired(now))
            .cloned()
            .collect())
    }

    async fn list_issued_codes(&self, session_id: &Uuid) -> Result<Vec<IssuedCode>, AppError> {
        let state = self.state.lock().await;
        let mut codes: Vec<IssuedCode> = state.codes.iter().filter(|code| code.session_id == *session_id).cloned().collect();
        codes.sort_by_key(|code| code.issued_at);
        Ok(codes)
    }
}

#[async_trait::async_trait]
impl AttendanceRepository for InMemoryRepository {
    async fn record_attendance(&self, record: &NewAttendanceRecord) -> Result<RecordOutcome, AppError> {
        let mut state = self.state.lock().await;

        if !state.sessions.contains_key(&record.session_id) {
            return Err(AppError::NotFound("Session not found".to_string()));
        }

        let key = (record.session_id, record.roll_number.clone());
        if let Some(existing) = state.records.get(&key) {
            return Ok(RecordOutcome::Existing(existing.clone()));
        }

        let created = AttendanceRecord {
            id: Uuid::new_v4(),
            session_id: record.session_id,
            roll_number: record.roll_number.clone(),
            code_used: record.code_used.clone(),
            submitted_at: record.submitted_at,
        };
        state.records.insert(key, created.clone());

        Ok(RecordOutcome::Created(created))
    }

    async fn list_attendance(&self, session_id: &Uuid) -> Result<Vec<AttendanceRecord>, AppError> {
        let state = self.state.lock().await;
        let mut records: Vec<AttendanceRecord> = state.records.values().filter(|record| record.session_id == *session_id).cloned().collect();
        records.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then_with(|| a.roll_number.cmp(&b.roll_number)));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_session(now: DateTime<Utc>) -> NewSession {
        NewSession {
            course_label: "CS101".to_string(),
            rotation_interval_seconds: 30,
            code: "AAAAAAAAA".to_string(),
            code_source: "test".to_string(),
            issued_at: now,
        }
    }

    #[rocket::async_test]
    async fn replace_code_requires_expected_code() {
        let repo = InMemoryRepository::new();
        let now = Utc::now();
        let session = repo.create_session(&new_session(now)).await.expect("create");

        let rotation = CodeRotation {
            expected_code: "AAAAAAAAA".to_string(),
            new_code: "BBBBBBBBB".to_string(),
            code_source: "test".to_string(),
            issued_at: now + Duration::seconds(30),
            previous_code_expires_at: now + Duration::seconds(30),
        };

        let rotated = repo.replace_code(&session.id, &rotation).await.expect("rotate").expect("swapped");
        assert_eq!(rotated.active_code, "BBBBBBBBB");
        assert_eq!(rotated.previous_code.as_deref(), Some("AAAAAAAAA"));

        let stale = repo.replace_code(&session.id, &rotation).await.expect("rotate again");
        assert!(stale.is_none());

        let codes = repo.list_issued_codes(&session.id).await.expect("codes");
        assert_eq!(codes.iter().map(|c| c.code.as_str()).collect::<Vec<_>>(), vec!["AAAAAAAAA", "BBBBBBBBB"]);
        assert_eq!(codes[0].expires_at, now + Duration::seconds(30));
        assert_eq!(codes[1].expires_at, now + Duration::seconds(60));
    }

    #[rocket::async_test]
    async fn closed_sessions_do_not_rotate_or_expire() {
        let repo = InMemoryRepository::new();
        let now = Utc::now();
        let session = repo.create_session(&new_session(now)).await.expect("create");

        let closed = repo.close_session(&session.id, now).await.expect("close").expect("exists");
        assert_eq!(closed.closed_at, Some(now));

        let later = now + Duration::seconds(120);
        let reclosed = repo.close_session(&session.id, later).await.expect("close").expect("exists");
        assert_eq!(reclosed.closed_at, Some(now));

        assert!(repo.list_expired_sessions(later).await.expect("expired").is_empty());
        assert!(repo.list_sessions(false).await.expect("open sessions").is_empty());
        assert_eq!(repo.list_sessions(true).await.expect("all sessions").len(), 1);
    }

    #[rocket::async_test]
    async fn record_attendance_is_idempotent_per_roll_number() {
        let repo = InMemoryRepository::new();
        let now = Utc::now();
        let session = repo.create_session(&new_session(now)).await.expect("create");

        let first = repo
            .record_attendance(&NewAttendanceRecord {
                session_id: session.id,
                roll_number: "S1".to_string(),
                code_used: "AAAAAAAAA".to_string(),
                submitted_at: now,
            })
            .await
            .expect("first");
        let second = repo
            .record_attendance(&NewAttendanceRecord {
                session_id: session.id,
                roll_number: "S1".to_string(),
                code_used: "BBBBBBBBB".to_string(),
                submitted_at: now + Duration::seconds(40),
            })
            .await
            .expect("second");

        assert!(first.is_new());
        assert!(!second.is_new());
        assert_eq!(second.record(), first.record());
        assert_eq!(repo.list_attendance(&session.id).await.expect("records").len(), 1);
    }
}
