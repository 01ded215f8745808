use crate::config::StorageBackend;
use crate::{Config, build_rocket};
use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;

pub const TEST_PRESENTER_TOKEN: &str = "test-presenter-token";

/// In-memory storage, no background sweep, limits high enough not to interfere.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.storage.backend = StorageBackend::Memory;
    config.api.enable_swagger = false;
    config.attendance.presenter_token = TEST_PRESENTER_TOKEN.to_string();
    config.attendance.sweep_interval_seconds = 0;
    config.rate_limit.read_limit = 10_000;
    config.rate_limit.mutation_limit = 10_000;
    config.rate_limit.submission_limit = 10_000;
    config
}

pub async fn test_client() -> Client {
    client_with(test_config()).await
}

pub async fn client_with(config: Config) -> Client {
    Client::tracked(build_rocket(config)).await.expect("valid rocket instance")
}

pub fn presenter() -> Header<'static> {
    Header::new("X-Presenter-Token", TEST_PRESENTER_TOKEN)
}

/// Open a session through the API and return its JSON representation.
pub async fn open_session(client: &Client, course_label: &str) -> serde_json::Value {
    let response = client
        .post("/api/v1/sessions")
        .header(presenter())
        .header(ContentType::JSON)
        .body(serde_json::json!({ "course_label": course_label }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);

    response.into_json().await.expect("session json")
}
