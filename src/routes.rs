pub mod attendance;
pub mod error;
pub mod health;
pub mod session;

use rocket::Request;
use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket_okapi::OpenApiError;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use schemars::JsonSchema;
use serde::Serialize;

/// JSON body sent with a status chosen at runtime (`201 Created` or `200 OK`).
pub struct JsonWithStatus<T> {
    status: Status,
    body: Json<T>,
}

impl<T> JsonWithStatus<T> {
    pub fn created(body: T) -> Self {
        Self {
            status: Status::Created,
            body: Json(body),
        }
    }

    pub fn ok(body: T) -> Self {
        Self {
            status: Status::Ok,
            body: Json(body),
        }
    }
}

impl<'r, T: Serialize> Responder<'r, 'static> for JsonWithStatus<T> {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        (self.status, self.body).respond_to(req)
    }
}

impl<T: Serialize + JsonSchema + Send> OpenApiResponderInner for JsonWithStatus<T> {
    fn responses(generator: &mut OpenApiGenerator) -> Result<Responses, OpenApiError> {
        let mut responses = Json::<T>::responses(generator)?;
        if let Some(ok) = responses.responses.get("200").cloned() {
            responses.responses.insert("201".to_string(), ok);
        }
        Ok(responses)
    }
}
