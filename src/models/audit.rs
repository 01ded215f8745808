use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// The code was never issued for this session.
    UnknownCode,
    /// The code was issued, but not live when the record was submitted.
    OutsideWindow,
    /// Submitted after the session was closed.
    AfterClose,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AuditAnomaly {
    pub record_id: Uuid,
    pub roll_number: String,
    pub code_used: String,
    pub submitted_at: DateTime<Utc>,
    pub kind: AnomalyKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AuditReport {
    pub session_id: Uuid,
    pub course_label: String,
    pub codes_issued: usize,
    pub total_records: usize,
    pub verified_records: usize,
    pub anomalies: Vec<AuditAnomaly>,
    pub generated_at: DateTime<Utc>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
    }
}
