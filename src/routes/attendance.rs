use crate::database::SharedRepository;
use crate::error::app_error::AppError;
use crate::error::json::JsonBody;
use crate::middleware::rate_limit::SubmissionRateLimit;
use crate::models::attendance::{AttendanceRequest, AttendanceResponse};
use crate::routes::JsonWithStatus;
use crate::service::attendance::submit_attendance;
use crate::service::code_issuer::CodeIssuer;
use chrono::Utc;
use rocket::{State, post};
use rocket_okapi::openapi;
use std::sync::Arc;

/// Record attendance with the code shown on the display.
///
/// Returns `201` for a new record and `200` when the roll number was already recorded for the session.
#[openapi(tag = "Attendance")]
#[post("/", data = "<payload>")]
pub async fn submit(
    repo: &State<SharedRepository>,
    issuer: &State<Arc<CodeIssuer>>,
    _rate_limit: SubmissionRateLimit,
    payload: JsonBody<AttendanceRequest>,
) -> Result<JsonWithStatus<AttendanceResponse>, AppError> {
    let outcome = submit_attendance(repo.inner().as_ref(), &payload, issuer.grace(), Utc::now()).await?;
    let response = AttendanceResponse::from(&outcome);

    if outcome.is_new() {
        Ok(JsonWithStatus::created(response))
    } else {
        Ok(JsonWithStatus::ok(response))
    }
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![submit]
}
