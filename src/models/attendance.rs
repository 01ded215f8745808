use chrono::{DateTime, Utc};
use regex::Regex;
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use std::borrow::Cow;
use std::sync::LazyLock;
use uuid::Uuid;
use validator::{Validate, ValidationError};

pub const ROLL_NUMBER_MAX_LENGTH: usize = 32;

static ROLL_NUMBER_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/-]*$").expect("valid roll number pattern"));

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub roll_number: String,
    pub code_used: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAttendanceRecord {
    pub session_id: Uuid,
    pub roll_number: String,
    pub code_used: String,
    pub submitted_at: DateTime<Utc>,
}

/// Outcome of an idempotent insert keyed on (session, roll number).
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Created(AttendanceRecord),
    Existing(AttendanceRecord),
}

impl RecordOutcome {
    pub fn record(&self) -> &AttendanceRecord {
        match self {
            RecordOutcome::Created(record) | RecordOutcome::Existing(record) => record,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, RecordOutcome::Created(_))
    }
}

/// Trim surrounding whitespace and upper-case ASCII letters.
pub fn normalize_roll_number(roll_number: &str) -> String {
    roll_number.trim().to_ascii_uppercase()
}

pub fn validate_roll_number(roll_number: &str) -> Result<(), ValidationError> {
    let trimmed = roll_number.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::new("roll_number_blank").with_message(Cow::from("Roll number is required")));
    }

    if trimmed.chars().count() > ROLL_NUMBER_MAX_LENGTH {
        return Err(ValidationError::new("roll_number_too_long").with_message(Cow::from("Roll number must be at most 32 characters")));
    }

    if !ROLL_NUMBER_PATTERN.is_match(trimmed) {
        return Err(ValidationError::new("roll_number_format").with_message(Cow::from(
            "Roll number may only contain letters, digits, '.', '_', '/' and '-'",
        )));
    }

    Ok(())
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct AttendanceRequest {
    pub session_id: Uuid,
    #[validate(custom(function = "crate::models::attendance::validate_roll_number"))]
    pub roll_number: String,
    #[validate(length(max = 64))]
    #[validate(custom(function = "crate::models::validate_not_blank"))]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AttendanceData {
    pub session_id: Uuid,
    pub roll_number: String,
    pub submitted_at: DateTime<Utc>,
    pub already_recorded: bool,
}

/// Envelope returned by the submission endpoint.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AttendanceResponse {
    pub status: String,
    pub message: String,
    pub data: AttendanceData,
}

impl From<&RecordOutcome> for AttendanceResponse {
    fn from(outcome: &RecordOutcome) -> Self {
        let record = outcome.record();
        let message = if outcome.is_new() {
            "Attendance recorded successfully"
        } else {
            "Attendance was already recorded for this session"
        };

        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: AttendanceData {
                session_id: record.session_id,
                roll_number: record.roll_number.clone(),
                submitted_at: record.submitted_at,
                already_recorded: !outcome.is_new(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AttendanceRecordResponse {
    pub id: Uuid,
    pub roll_number: String,
    pub code_used: String,
    pub submitted_at: DateTime<Utc>,
}

impl From<&AttendanceRecord> for AttendanceRecordResponse {
    fn from(record: &AttendanceRecord) -> Self {
        Self {
            id: record.id,
            roll_number: record.roll_number.clone(),
            code_used: record.code_used.clone(),
            submitted_at: record.submitted_at,
        }
    }
}
