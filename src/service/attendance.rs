use crate::database::Repository;
use crate::database::attendance::AttendanceRepository;
use crate::error::app_error::AppError;
use crate::models::attendance::{AttendanceRequest, NewAttendanceRecord, RecordOutcome, normalize_roll_number};
use crate::models::session::{CodeCheck, normalize_code};
use crate::service::code_issuer::load_session;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use validator::Validate;

/// Validate a submission, check its code and record it idempotently.
pub async fn submit_attendance(repo: &dyn Repository, request: &AttendanceRequest, grace: Duration, now: DateTime<Utc>) -> Result<RecordOutcome, AppError> {
    request.validate()?;

    let session = load_session(repo, &request.session_id).await?;
    if !session.is_open() {
        return Err(AppError::SessionClosed(session.id));
    }

    let roll_number = normalize_roll_number(&request.roll_number);
    let check = session.check_code(&request.code, now, grace);

    match check {
        CodeCheck::Active | CodeCheck::Previous => {}
        CodeCheck::Expired => {
            warn!(session_id = %session.id, roll_number = %roll_number, "attendance code expired");
            return Err(AppError::InvalidCode("code has expired".to_string()));
        }
        CodeCheck::Mismatch => {
            warn!(session_id = %session.id, roll_number = %roll_number, "attendance code mismatch");
            return Err(AppError::InvalidCode("code does not match the current session code".to_string()));
        }
    }

    let outcome = repo
        .record_attendance(&NewAttendanceRecord {
            session_id: session.id,
            roll_number,
            code_used: normalize_code(&request.code),
            submitted_at: now,
        })
        .await?;

    info!(
        session_id = %session.id,
        roll_number = %outcome.record().roll_number,
        new_record = outcome.is_new(),
        matched = ?check,
        "attendance submitted"
    );

    Ok(outcome)
}
