use rocket::data::{Data, FromData, Outcome};
use rocket::http::Status;
use rocket::request::Request;
use rocket::serde::json::{Json, serde_json};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::RequestBody;
use rocket_okapi::request::OpenApiFromData;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::ops::Deref;
use tracing::warn;

/// A custom JSON wrapper that provides meaningful error logging when parsing fails.
///
/// Unlike Rocket's built-in `Json`, this wrapper logs structured information about
/// parse failures including the field name and expected type when possible.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<T> JsonBody<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for JsonBody<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T: DeserializeOwned> FromData<'r> for JsonBody<T> {
    type Error = serde_json::Error;

    async fn from_data(req: &'r Request<'_>, data: Data<'r>) -> Outcome<'r, Self> {
        let limit = req.limits().get("json").unwrap_or_else(|| 1.mebibytes());

        let bytes = match data.open(limit).into_bytes().await {
            Ok(bytes) if bytes.is_complete() => bytes.into_inner(),
            Ok(_) => {
                warn!(
                    method = %req.method(),
                    uri = %req.uri(),
                    "JSON payload exceeded size limit"
                );
                return Outcome::Error((Status::PayloadTooLarge, serde_json::Error::io(std::io::Error::other("payload too large"))));
            }
            Err(e) => {
                warn!(
                    method = %req.method(),
                    uri = %req.uri(),
                    error = %e,
                    "Failed to read request body"
                );
                return Outcome::Error((Status::BadRequest, serde_json::Error::io(e)));
            }
        };

        match serde_json::from_slice::<T>(&bytes) {
            Ok(value) => Outcome::Success(JsonBody(value)),
            Err(e) => {
                let body_preview = String::from_utf8_lossy(&bytes);
                let body_preview = if body_preview.chars().count() > 500 {
                    format!("{}...", body_preview.chars().take(500).collect::<String>())
                } else {
                    body_preview.to_string()
                };

                warn!(
                    method = %req.method(),
                    uri = %req.uri(),
                    error_message = %e,
                    error_line = e.line(),
                    error_column = e.column(),
                    error_category = ?e.classify(),
                    request_body = %body_preview,
                    "Failed to parse JSON request body"
                );

                Outcome::Error((Status::UnprocessableEntity, e))
            }
        }
    }
}

impl<'r, T: DeserializeOwned + JsonSchema> OpenApiFromData<'r> for JsonBody<T> {
    fn request_body(generator: &mut OpenApiGenerator) -> rocket_okapi::Result<RequestBody> {
        Json::<T>::request_body(generator)
    }
}

use rocket::data::ByteUnit;

trait ByteUnitExt {
    fn mebibytes(self) -> ByteUnit;
}

impl ByteUnitExt for u64 {
    fn mebibytes(self) -> ByteUnit {
        ByteUnit::Mebibyte(self)
    }
}

#[cfg(test)]
mod tests {
    use super::JsonBody;
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use rocket::{post, routes};
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Probe {
        roll_number: String,
    }

    #[post("/probe", data = "<payload>")]
    fn probe(payload: JsonBody<Probe>) -> String {
        payload.into_inner().roll_number
    }

    #[rocket::async_test]
    async fn parses_valid_body() {
        let client = Client::tracked(rocket::build().mount("/", routes![probe])).await.expect("valid rocket instance");
        let response = client
            .post("/probe")
            .header(ContentType::JSON)
            .body(r#"{"roll_number":"S42"}"#)
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.as_deref(), Some("S42"));
    }

    #[rocket::async_test]
    async fn malformed_body_is_unprocessable() {
        let client = Client::tracked(rocket::build().mount("/", routes![probe])).await.expect("valid rocket instance");
        let response = client.post("/probe").header(ContentType::JSON).body(r#"{"roll_number": 7"#).dispatch().await;

        assert_eq!(response.status(), Status::UnprocessableEntity);
    }
}
