use crate::error::app_error::AppError;
use crate::models::session::{DisplayResponse, Session};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use qrcode::QrCode;
use uuid::Uuid;

/// Student form address with the session preselected.
pub fn join_url(student_form_url: &str, session_id: &Uuid) -> String {
    let separator = if student_form_url.contains('?') { '&' } else { '?' };
    format!("{}{}session={}", student_form_url, separator, urlencoding::encode(&session_id.to_string()))
}

/// Render `content` as an SVG QR code data URL.
pub fn qr_code_data_url(content: &str) -> Result<String, AppError> {
    let qr = QrCode::new(content.as_bytes()).map_err(|e| AppError::Internal(format!("Failed to generate QR code: {}", e)))?;
    let svg = qr.render::<qrcode::render::svg::Color>().min_dimensions(200, 200).build();

    Ok(format!("data:image/svg+xml;base64,{}", general_purpose::STANDARD.encode(svg.as_bytes())))
}

pub fn display_payload(session: &Session, student_form_url: &str, now: DateTime<Utc>) -> Result<DisplayResponse, AppError> {
    let join_url = join_url(student_form_url, &session.id);
    let join_qr_code = qr_code_data_url(&join_url)?;

    Ok(DisplayResponse {
        session_id: session.id,
        course_label: session.course_label.clone(),
        code: session.active_code.clone(),
        seconds_remaining: if session.is_open() { session.seconds_remaining(now) } else { 0 },
        rotation_interval_seconds: session.rotation_interval_seconds,
        issued_at: session.code_issued_at,
        closed: !session.is_open(),
        join_url,
        join_qr_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_appends_session_parameter() {
        let id = Uuid::nil();
        assert_eq!(
            join_url("https://class.example/attend", &id),
            "https://class.example/attend?session=00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            join_url("https://class.example/attend?lang=en", &id),
            "https://class.example/attend?lang=en&session=00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn qr_code_is_svg_data_url() {
        let url = qr_code_data_url("https://class.example/attend?session=1").expect("qr code");
        assert!(url.starts_with("data:image/svg+xml;base64,"));

        let encoded = url.trim_start_matches("data:image/svg+xml;base64,");
        let svg = general_purpose::STANDARD.decode(encoded).expect("valid base64");
        assert!(String::from_utf8(svg).expect("utf-8 svg").contains("<svg"));
    }

    #[test]
    fn oversized_qr_content_is_a_server_error() {
        let err = qr_code_data_url(&"x".repeat(8_000)).expect_err("too long for a QR code");
        assert!(matches!(err, AppError::Internal(_)));
    }
}
