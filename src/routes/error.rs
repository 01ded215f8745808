use crate::middleware::rate_limit::RateLimitRetryAfter;
use rocket::http::{Header, Status};
use rocket::response::{self, Responder};
use rocket::serde::Serialize;
use rocket::serde::json::Json;
use rocket::{Request, catch};

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Error {
    pub status: &'static str,
    pub message: String,
}

impl Error {
    fn new(message: &str) -> Self {
        Self {
            status: "error",
            message: message.to_string(),
        }
    }
}

/// JSON error body with an optional `Retry-After` header.
pub struct ErrorResponse {
    body: Json<Error>,
    retry_after: Option<u64>,
}

impl<'r> Responder<'r, 'static> for ErrorResponse {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let mut response = self.body.respond_to(req)?;
        if let Some(seconds) = self.retry_after {
            response.set_header(Header::new("Retry-After", seconds.to_string()));
        }
        Ok(response)
    }
}

#[catch(400)]
pub fn bad_request(_: &Request) -> Json<Error> {
    Json(Error::new("Bad request"))
}

#[catch(401)]
pub fn unauthorized(_: &Request) -> Json<Error> {
    Json(Error::new("Presenter token required"))
}

#[catch(403)]
pub fn forbidden(_: &Request) -> Json<Error> {
    Json(Error::new("Forbidden"))
}

#[catch(404)]
pub fn not_found(_: &Request) -> Json<Error> {
    Json(Error::new("Not found"))
}

#[catch(409)]
pub fn conflict(_: &Request) -> Json<Error> {
    Json(Error::new("Conflict"))
}

#[catch(422)]
pub fn unprocessable(_: &Request) -> Json<Error> {
    Json(Error::new("Request body could not be parsed"))
}

#[catch(429)]
pub fn too_many_requests(req: &Request) -> ErrorResponse {
    let retry_after = req.local_cache(|| None::<RateLimitRetryAfter>).map(|retry| retry.0);
    ErrorResponse {
        body: Json(Error::new("Too many requests")),
        retry_after,
    }
}

#[catch(default)]
pub fn default_catcher(status: Status, _: &Request) -> Json<Error> {
    Json(Error::new(status.reason().unwrap_or("Request failed")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::catchers;
    use rocket::http::ContentType;
    use rocket::local::asynchronous::Client;

    #[rocket::async_test]
    async fn not_found_is_json() {
        let rocket = rocket::build().register("/", catchers![not_found]);
        let client = Client::tracked(rocket).await.expect("valid rocket instance");

        let response = client.get("/missing").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(response.content_type(), Some(ContentType::JSON));

        let body: serde_json::Value = response.into_json().await.expect("json body");
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Not found");
    }
}
