use crate::auth::PresenterAuth;
use crate::config::Config;
use crate::database::SharedRepository;
use crate::error::app_error::AppError;
use crate::error::json::JsonBody;
use crate::middleware::rate_limit::RateLimit;
use crate::models::attendance::AttendanceRecordResponse;
use crate::models::audit::AuditReport;
use crate::models::session::{DisplayResponse, SessionRequest, SessionResponse};
use crate::routes::JsonWithStatus;
use crate::service::audit::audit_session;
use crate::service::code_issuer::{CodeIssuer, load_session};
use crate::service::display::display_payload;
use chrono::Utc;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use std::sync::Arc;
use uuid::Uuid;

/// Open a new attendance session
#[openapi(tag = "Sessions")]
#[post("/", data = "<payload>")]
pub async fn create_session(
    repo: &State<SharedRepository>,
    issuer: &State<Arc<CodeIssuer>>,
    _rate_limit: RateLimit,
    _presenter: PresenterAuth,
    payload: JsonBody<SessionRequest>,
) -> Result<JsonWithStatus<SessionResponse>, AppError> {
    let session = issuer.open_session(repo.inner().as_ref(), &payload, Utc::now()).await?;
    Ok(JsonWithStatus::created(SessionResponse::from(&session)))
}

/// List sessions, newest first
#[openapi(tag = "Sessions")]
#[get("/?<include_closed>")]
pub async fn list_sessions(repo: &State<SharedRepository>, _presenter: PresenterAuth, include_closed: Option<bool>) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let sessions = repo.list_sessions(include_closed.unwrap_or(false)).await?;
    Ok(Json(sessions.iter().map(SessionResponse::from).collect()))
}

/// Get a session, rotating its code if it has expired
#[openapi(tag = "Sessions")]
#[get("/<id>")]
pub async fn get_session(
    repo: &State<SharedRepository>,
    issuer: &State<Arc<CodeIssuer>>,
    _presenter: PresenterAuth,
    id: String,
) -> Result<Json<SessionResponse>, AppError> {
    let session_id = Uuid::parse_str(&id)?;
    let session = issuer.current(repo.inner().as_ref(), &session_id, Utc::now()).await?;
    Ok(Json(SessionResponse::from(&session)))
}

/// Everything the projector view needs: code, countdown and join QR code
#[openapi(tag = "Sessions")]
#[get("/<id>/display")]
pub async fn get_display(
    repo: &State<SharedRepository>,
    issuer: &State<Arc<CodeIssuer>>,
    config: &State<Config>,
    _rate_limit: RateLimit,
    _presenter: PresenterAuth,
    id: String,
) -> Result<Json<DisplayResponse>, AppError> {
    let session_id = Uuid::parse_str(&id)?;
    let now = Utc::now();
    let session = issuer.current(repo.inner().as_ref(), &session_id, now).await?;

    let student_form_url = config.attendance.student_form_url.clone();
    let payload = tokio::task::spawn_blocking(move || display_payload(&session, &student_form_url, now)).await??;
    Ok(Json(payload))
}

/// Replace the active code immediately
#[openapi(tag = "Sessions")]
#[post("/<id>/rotate")]
pub async fn rotate_code(
    repo: &State<SharedRepository>,
    issuer: &State<Arc<CodeIssuer>>,
    _rate_limit: RateLimit,
    _presenter: PresenterAuth,
    id: String,
) -> Result<Json<SessionResponse>, AppError> {
    let session_id = Uuid::parse_str(&id)?;
    let session = issuer.rotate(repo.inner().as_ref(), &session_id, Utc::now()).await?;
    Ok(Json(SessionResponse::from(&session)))
}

/// Stop accepting attendance for a session
#[openapi(tag = "Sessions")]
#[post("/<id>/close")]
pub async fn close_session(
    repo: &State<SharedRepository>,
    issuer: &State<Arc<CodeIssuer>>,
    _rate_limit: RateLimit,
    _presenter: PresenterAuth,
    id: String,
) -> Result<Json<SessionResponse>, AppError> {
    let session_id = Uuid::parse_str(&id)?;
    let session = issuer.close_session(repo.inner().as_ref(), &session_id, Utc::now()).await?;
    Ok(Json(SessionResponse::from(&session)))
}

/// Attendance recorded for a session, in submission order
#[openapi(tag = "Sessions")]
#[get("/<id>/attendance")]
pub async fn list_attendance(repo: &State<SharedRepository>, _presenter: PresenterAuth, id: String) -> Result<Json<Vec<AttendanceRecordResponse>>, AppError> {
    let session_id = Uuid::parse_str(&id)?;
    load_session(repo.inner().as_ref(), &session_id).await?;
    let records = repo.list_attendance(&session_id).await?;
    Ok(Json(records.iter().map(AttendanceRecordResponse::from).collect()))
}

/// Cross-check recorded attendance against the issued codes
#[openapi(tag = "Sessions")]
#[get("/<id>/audit")]
pub async fn get_audit(
    repo: &State<SharedRepository>,
    issuer: &State<Arc<CodeIssuer>>,
    _presenter: PresenterAuth,
    id: String,
) -> Result<Json<AuditReport>, AppError> {
    let session_id = Uuid::parse_str(&id)?;
    let report = audit_session(repo.inner().as_ref(), &session_id, issuer.grace(), Utc::now()).await?;
    Ok(Json(report))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![
        create_session,
        list_sessions,
        get_session,
        get_display,
        rotate_code,
        close_session,
        list_attendance,
        get_audit
    ]
}
