use crate::config::Config;
use crate::error::app_error::AppError;
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{Object, RefOr, Response, Responses, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use sha2::{Digest, Sha256};
use tracing::warn;

pub const PRESENTER_TOKEN_HEADER: &str = "X-Presenter-Token";

/// Proof that the request carries the configured presenter token.
#[derive(Debug, Clone, Copy)]
pub struct PresenterAuth;

pub(crate) fn extract_token<'a>(presenter_header: Option<&'a str>, authorization: Option<&'a str>) -> Option<&'a str> {
    presenter_header
        .or_else(|| authorization.and_then(|value| value.strip_prefix("Bearer ")))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Compares SHA-256 digests of both tokens.
pub(crate) fn token_matches(incoming: &str, expected: &str) -> bool {
    Sha256::digest(incoming.as_bytes()) == Sha256::digest(expected.as_bytes())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PresenterAuth {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let config = match req.rocket().state::<Config>() {
            Some(config) => config,
            None => return Outcome::Error((Status::InternalServerError, AppError::Unauthorized)),
        };

        let expected = config.attendance.presenter_token.as_str();
        if expected.is_empty() {
            return Outcome::Error((
                Status::BadRequest,
                AppError::BadRequest("Presenter token is not configured".to_string()),
            ));
        }

        let headers = req.headers();
        match extract_token(headers.get_one(PRESENTER_TOKEN_HEADER), headers.get_one("Authorization")) {
            Some(token) if token_matches(token, expected) => Outcome::Success(PresenterAuth),
            Some(_) => {
                warn!(method = %req.method(), uri = %req.uri(), "presenter token rejected");
                Outcome::Error((Status::Forbidden, AppError::Forbidden))
            }
            None => Outcome::Error((Status::Unauthorized, AppError::Unauthorized)),
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for PresenterAuth {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        let security_scheme = SecurityScheme {
            description: Some("Shared presenter token. `Authorization: Bearer <token>` is accepted as well.".to_string()),
            data: SecuritySchemeData::ApiKey {
                name: PRESENTER_TOKEN_HEADER.to_string(),
                location: "header".to_string(),
            },
            extensions: Object::default(),
        };

        let mut security_req = SecurityRequirement::new();
        security_req.insert("presenterToken".to_string(), Vec::new());

        Ok(RequestHeaderInput::Security("presenterToken".to_string(), security_scheme, security_req))
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let mut responses = Responses::default();
        responses.responses.insert(
            "401".to_string(),
            RefOr::Object(Response {
                description: "Unauthorized - Presenter token required".to_string(),
                ..Default::default()
            }),
        );
        responses.responses.insert(
            "403".to_string(),
            RefOr::Object(Response {
                description: "Forbidden - Presenter token rejected".to_string(),
                ..Default::default()
            }),
        );
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::error::{bad_request, forbidden, unauthorized};
    use rocket::local::asynchronous::Client;
    use rocket::{catchers, get, routes};

    #[get("/guarded")]
    async fn guarded(_presenter: PresenterAuth) -> Status {
        Status::Ok
    }

    async fn client(token: &str) -> Client {
        let mut config = Config::default();
        config.attendance.presenter_token = token.to_string();

        let rocket = rocket::build()
            .manage(config)
            .mount("/", routes![guarded])
            .register("/", catchers![bad_request, unauthorized, forbidden]);
        Client::tracked(rocket).await.expect("valid rocket instance")
    }

    #[test]
    fn extract_token_prefers_presenter_header() {
        assert_eq!(extract_token(Some("abc"), Some("Bearer xyz")), Some("abc"));
        assert_eq!(extract_token(None, Some("Bearer xyz")), Some("xyz"));
        assert_eq!(extract_token(None, Some("Basic xyz")), None);
        assert_eq!(extract_token(Some("   "), None), None);
        assert_eq!(extract_token(None, None), None);
    }

    #[test]
    fn token_matches_only_identical_tokens() {
        assert!(token_matches("secret", "secret"));
        assert!(!token_matches("secret ", "secret"));
        assert!(!token_matches("", "secret"));
    }

    #[rocket::async_test]
    async fn accepts_header_and_bearer_token() {
        let client = client("s3cret").await;

        let response = client.get("/guarded").header(rocket::http::Header::new(PRESENTER_TOKEN_HEADER, "s3cret")).dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.get("/guarded").header(rocket::http::Header::new("Authorization", "Bearer s3cret")).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn rejects_missing_and_wrong_tokens() {
        let client = client("s3cret").await;

        let response = client.get("/guarded").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);

        let response = client.get("/guarded").header(rocket::http::Header::new(PRESENTER_TOKEN_HEADER, "guess")).dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn unconfigured_token_is_a_bad_request() {
        let client = client("").await;

        let response = client.get("/guarded").header(rocket::http::Header::new(PRESENTER_TOKEN_HEADER, "anything")).dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);
    }
}
