use crate::database::Repository;
use crate::error::app_error::AppError;
use crate::models::attendance::AttendanceRecord;
use crate::models::audit::{AnomalyKind, AuditAnomaly, AuditReport};
use crate::models::session::{IssuedCode, Session};
use crate::service::code_issuer::load_session;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Cross-check each record against the codes the session actually issued.
pub fn audit_records(session: &Session, issued: &[IssuedCode], records: &[AttendanceRecord], grace: Duration, generated_at: DateTime<Utc>) -> AuditReport {
    let anomalies: Vec<AuditAnomaly> = records
        .iter()
        .filter_map(|record| {
            classify(session, issued, record, grace).map(|kind| AuditAnomaly {
                record_id: record.id,
                roll_number: record.roll_number.clone(),
                code_used: record.code_used.clone(),
                submitted_at: record.submitted_at,
                kind,
            })
        })
        .collect();

    AuditReport {
        session_id: session.id,
        course_label: session.course_label.clone(),
        codes_issued: issued.len(),
        total_records: records.len(),
        verified_records: records.len() - anomalies.len(),
        anomalies,
        generated_at,
    }
}

fn classify(session: &Session, issued: &[IssuedCode], record: &AttendanceRecord, grace: Duration) -> Option<AnomalyKind> {
    if session.closed_at.is_some_and(|closed_at| record.submitted_at > closed_at) {
        return Some(AnomalyKind::AfterClose);
    }

    let mut matching = issued.iter().filter(|code| code.code == record.code_used).peekable();
    if matching.peek().is_none() {
        return Some(AnomalyKind::UnknownCode);
    }

    let live = matching.any(|code| code.issued_at <= record.submitted_at && record.submitted_at <= code.expires_at + grace);
    if live { None } else { Some(AnomalyKind::OutsideWindow) }
}

pub async fn audit_session(repo: &dyn Repository, session_id: &Uuid, grace: Duration, now: DateTime<Utc>) -> Result<AuditReport, AppError> {
    let session = load_session(repo, session_id).await?;
    let issued = repo.list_issued_codes(session_id).await?;
    let records = repo.list_attendance(session_id).await?;

    Ok(audit_records(&session, &issued, &records, grace, now))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(now: DateTime<Utc>) -> Session {
        Session {
            id: Uuid::new_v4(),
            course_label: "CS101".to_string(),
            active_code: "BBBB".to_string(),
            code_issued_at: now + Duration::seconds(30),
            rotation_interval_seconds: 30,
            previous_code: Some("AAAA".to_string()),
            previous_code_expires_at: Some(now + Duration::seconds(30)),
            created_at: now,
            closed_at: None,
        }
    }

    fn issued(session: &Session, code: &str, from: DateTime<Utc>, until: DateTime<Utc>) -> IssuedCode {
        IssuedCode {
            id: Uuid::new_v4(),
            session_id: session.id,
            code: code.to_string(),
            source: "test".to_string(),
            issued_at: from,
            expires_at: until,
        }
    }

    fn record(session: &Session, roll: &str, code: &str, at: DateTime<Utc>) -> AttendanceRecord {
        AttendanceRecord {
            id: Uuid::new_v4(),
            session_id: session.id,
            roll_number: roll.to_string(),
            code_used: code.to_string(),
            submitted_at: at,
        }
    }

    #[test]
    fn classifies_records() {
        let now = Utc::now();
        let session = session(now);
        let codes = vec![
            issued(&session, "AAAA", now, now + Duration::seconds(30)),
            issued(&session, "BBBB", now + Duration::seconds(30), now + Duration::seconds(60)),
        ];
        let records = vec![
            record(&session, "S1", "AAAA", now + Duration::seconds(10)),
            record(&session, "S2", "AAAA", now + Duration::seconds(33)),
            record(&session, "S3", "AAAA", now + Duration::seconds(50)),
            record(&session, "S4", "ZZZZ", now + Duration::seconds(10)),
            record(&session, "S5", "BBBB", now + Duration::seconds(45)),
        ];

        let report = audit_records(&session, &codes, &records, Duration::seconds(5), now);

        assert_eq!(report.codes_issued, 2);
        assert_eq!(report.total_records, 5);
        assert_eq!(report.verified_records, 3);
        assert!(!report.is_clean());

        let kinds: Vec<(&str, AnomalyKind)> = report.anomalies.iter().map(|a| (a.roll_number.as_str(), a.kind)).collect();
        assert_eq!(kinds, vec![("S3", AnomalyKind::OutsideWindow), ("S4", AnomalyKind::UnknownCode)]);
    }

    #[test]
    fn records_after_close_are_flagged() {
        let now = Utc::now();
        let session = Session {
            closed_at: Some(now + Duration::seconds(20)),
            ..session(now)
        };
        let codes = vec![issued(&session, "AAAA", now, now + Duration::seconds(30))];
        let records = vec![record(&session, "S1", "AAAA", now + Duration::seconds(25))];

        let report = audit_records(&session, &codes, &records, Duration::seconds(5), now);
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].kind, AnomalyKind::AfterClose);
    }

    #[test]
    fn empty_session_is_clean() {
        let now = Utc::now();
        let session = session(now);
        let report = audit_records(&session, &[], &[], Duration::seconds(5), now);

        assert!(report.is_clean());
        assert_eq!(report.verified_records, 0);
    }
}
