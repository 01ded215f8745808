pub mod rate_limit;

use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::request::Request;
use rocket::{Data, Response};
use tracing::{info, warn};
use uuid::Uuid;

/// Per-request identifier, echoed back as `X-Request-Id`.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        RequestId(Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// Which part of the service a request is aimed at, for log filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Presenter,
    Student,
    Health,
    Other,
}

impl Surface {
    pub fn of(path: &str) -> Self {
        let mut segments = path.split('/').filter(|segment| !segment.is_empty());
        match segments.find(|segment| matches!(*segment, "sessions" | "attendance" | "health")) {
            Some("sessions") => Surface::Presenter,
            Some("attendance") => Surface::Student,
            Some("health") => Surface::Health,
            _ => Surface::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Surface::Presenter => "presenter",
            Surface::Student => "student",
            Surface::Health => "health",
            Surface::Other => "other",
        }
    }
}

/// Tags each request with a `RequestId` and logs how it finished, with the surface it hit.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let request_id = RequestId::new();
        let method = request.method();
        let uri = request.uri();
        let surface = Surface::of(uri.path().as_str());

        request.local_cache(|| Some(request_id.clone()));

        info!(
            request_id = %request_id.0,
            method = %method,
            uri = %uri,
            surface = surface.as_str(),
            "request received"
        );
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let request_id = request
            .local_cache(|| None::<RequestId>)
            .as_ref()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| "unknown".to_string());

        let status = response.status();
        let method = request.method();
        let uri = request.uri();
        let surface = Surface::of(uri.path().as_str());

        response.set_header(Header::new("X-Request-Id", request_id.clone()));

        response.set_header(Header::new("X-Content-Type-Options", "nosniff"));
        response.set_header(Header::new("X-Frame-Options", "DENY"));
        response.set_header(Header::new("Cache-Control", "no-store"));

        if status.class().is_server_error() || status.class().is_client_error() {
            warn!(
                request_id = %request_id,
                method = %method,
                uri = %uri,
                status = %status.code,
                surface = surface.as_str(),
                "request completed with error"
            );
        } else {
            info!(
                request_id = %request_id,
                method = %method,
                uri = %uri,
                status = %status.code,
                surface = surface.as_str(),
                "request completed"
            );
        }
    }
}
