use crate::models::health::HealthResponse;
use rocket::get;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

/// Liveness probe
#[openapi(tag = "Health")]
#[get("/")]
pub async fn healthcheck() -> Status {
    Status::Ok
}

/// Connectivity check for display clients
#[openapi(tag = "Health")]
#[get("/ping")]
pub async fn ping() -> Json<HealthResponse> {
    Json(HealthResponse { status: "pong" })
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![healthcheck, ping]
}

#[cfg(test)]
mod tests {
    use crate::test_utils::test_client;
    use rocket::http::Status;

    #[rocket::async_test]
    async fn health_check_works() {
        let client = test_client().await;

        let response = client.get("/api/v1/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert!(response.headers().get_one("X-Request-Id").is_some());
    }

    #[rocket::async_test]
    async fn ping_returns_pong() {
        let client = test_client().await;

        let response = client.get("/api/v1/health/ping").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body: serde_json::Value = response.into_json().await.expect("json body");
        assert_eq!(body["status"], "pong");
    }
}
