use chrono::{DateTime, Duration, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::Validate;

/// An attendance session and the code it currently accepts.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub course_label: String,
    pub active_code: String,
    pub code_issued_at: DateTime<Utc>,
    pub rotation_interval_seconds: i32,
    pub previous_code: Option<String>,
    pub previous_code_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Result of matching a submitted code against a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    Active,
    Previous,
    Expired,
    Mismatch,
}

impl CodeCheck {
    pub fn is_accepted(self) -> bool {
        matches!(self, CodeCheck::Active | CodeCheck::Previous)
    }
}

impl Session {
    pub fn rotation_interval(&self) -> Duration {
        Duration::seconds(i64::from(self.rotation_interval_seconds))
    }

    pub fn code_expires_at(&self) -> DateTime<Utc> {
        self.code_issued_at + self.rotation_interval()
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    pub fn is_code_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.code_expires_at()
    }

    /// Whole seconds until the active code rotates, rounded up and clamped to `[0, interval]`.
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        let millis = (self.code_expires_at() - now).num_milliseconds();
        let seconds = (millis + 999).div_euclid(1000);
        seconds.clamp(0, i64::from(self.rotation_interval_seconds))
    }

    /// Match a submitted code against the active code and the recency window of the previous one.
    pub fn check_code(&self, submitted: &str, now: DateTime<Utc>, grace: Duration) -> CodeCheck {
        let submitted = normalize_code(submitted);

        if submitted == self.active_code {
            return if now <= self.code_expires_at() + grace {
                CodeCheck::Active
            } else {
                CodeCheck::Expired
            };
        }

        match (&self.previous_code, self.previous_code_expires_at) {
            (Some(previous), Some(expires_at)) if *previous == submitted => {
                if now <= expires_at + grace {
                    CodeCheck::Previous
                } else {
                    CodeCheck::Expired
                }
            }
            _ => CodeCheck::Mismatch,
        }
    }
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Values needed to persist a freshly opened session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub course_label: String,
    pub rotation_interval_seconds: i32,
    pub code: String,
    pub code_source: String,
    pub issued_at: DateTime<Utc>,
}

/// A code replacement, applied only if the session still holds `expected_code`.
#[derive(Debug, Clone)]
pub struct CodeRotation {
    pub expected_code: String,
    pub new_code: String,
    pub code_source: String,
    pub issued_at: DateTime<Utc>,
    pub previous_code_expires_at: DateTime<Utc>,
}

/// One row of a session's code history.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct IssuedCode {
    pub id: Uuid,
    pub session_id: Uuid,
    pub code: String,
    pub source: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct SessionRequest {
    #[validate(length(min = 1, max = 120))]
    #[validate(custom(function = "crate::models::validate_not_blank"))]
    pub course_label: String,
    /// Seconds between code rotations. Defaults to the server setting.
    #[validate(range(min = 5, max = 3600))]
    pub rotation_interval_seconds: Option<i32>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub course_label: String,
    pub active_code: String,
    pub code_issued_at: DateTime<Utc>,
    pub code_expires_at: DateTime<Utc>,
    pub rotation_interval_seconds: i32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            course_label: session.course_label.clone(),
            active_code: session.active_code.clone(),
            code_issued_at: session.code_issued_at,
            code_expires_at: session.code_expires_at(),
            rotation_interval_seconds: session.rotation_interval_seconds,
            created_at: session.created_at,
            closed_at: session.closed_at,
        }
    }
}

/// Payload polled by the projector.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DisplayResponse {
    pub session_id: Uuid,
    pub course_label: String,
    pub code: String,
    pub seconds_remaining: i64,
    pub rotation_interval_seconds: i32,
    pub issued_at: DateTime<Utc>,
    pub closed: bool,
    pub join_url: String,
    /// QR code for `join_url` as an SVG data URL.
    pub join_qr_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_at(issued_at: DateTime<Utc>) -> Session {
        Session {
            id: Uuid::new_v4(),
            course_label: "CS101".to_string(),
            active_code: "ABCDEF123".to_string(),
            code_issued_at: issued_at,
            rotation_interval_seconds: 30,
            previous_code: Some("999999999".to_string()),
            previous_code_expires_at: Some(issued_at),
            created_at: issued_at,
            closed_at: None,
        }
    }

    #[test]
    fn seconds_remaining_rounds_up_and_clamps() {
        let issued = Utc::now();
        let session = session_at(issued);

        assert_eq!(session.seconds_remaining(issued), 30);
        assert_eq!(session.seconds_remaining(issued + Duration::milliseconds(500)), 30);
        assert_eq!(session.seconds_remaining(issued + Duration::milliseconds(29_001)), 1);
        assert_eq!(session.seconds_remaining(issued + Duration::seconds(30)), 0);
        assert_eq!(session.seconds_remaining(issued + Duration::seconds(90)), 0);
        assert_eq!(session.seconds_remaining(issued - Duration::seconds(10)), 30);
    }

    #[test]
    fn code_expiry_boundary() {
        let issued = Utc::now();
        let session = session_at(issued);

        assert!(!session.is_code_expired(issued + Duration::seconds(29)));
        assert!(session.is_code_expired(issued + Duration::seconds(30)));
    }

    #[test]
    fn active_code_is_case_and_whitespace_insensitive() {
        let issued = Utc::now();
        let session = session_at(issued);

        assert_eq!(session.check_code("  abcdef123 ", issued, Duration::seconds(5)), CodeCheck::Active);
    }

    #[test]
    fn active_code_accepted_within_grace_after_expiry() {
        let issued = Utc::now();
        let session = session_at(issued);
        let grace = Duration::seconds(5);

        assert_eq!(session.check_code("ABCDEF123", issued + Duration::seconds(34), grace), CodeCheck::Active);
        assert_eq!(session.check_code("ABCDEF123", issued + Duration::seconds(36), grace), CodeCheck::Expired);
    }

    #[test]
    fn previous_code_honours_recency_window() {
        let issued = Utc::now();
        let session = session_at(issued);
        let grace = Duration::seconds(5);

        assert_eq!(session.check_code("999999999", issued + Duration::seconds(4), grace), CodeCheck::Previous);
        assert_eq!(session.check_code("999999999", issued + Duration::seconds(6), grace), CodeCheck::Expired);
    }

    #[test]
    fn unknown_code_is_a_mismatch() {
        let issued = Utc::now();
        let session = session_at(issued);

        let check = session.check_code("000000000", issued, Duration::seconds(5));
        assert_eq!(check, CodeCheck::Mismatch);
        assert!(!check.is_accepted());
    }

    #[test]
    fn missing_previous_code_never_matches() {
        let issued = Utc::now();
        let session = Session {
            previous_code: None,
            previous_code_expires_at: None,
            ..session_at(issued)
        };

        assert_eq!(session.check_code("999999999", issued, Duration::seconds(5)), CodeCheck::Mismatch);
    }
}
