mod auth;
mod config;
mod cron_tasks;
mod database;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod service;

#[cfg(test)]
pub mod test_utils;

pub use config::Config;
pub use cron_tasks::{AuditSummary, RotationSummary, audit_session, follow_display, rotate_expired_codes};
pub use models::audit::{AnomalyKind, AuditAnomaly, AuditReport};

use crate::db::{stage_code_issuer, stage_storage};
use crate::middleware::RequestLogger;
use crate::middleware::rate_limit::RateLimiter;
use crate::routes as app_routes;
use rocket::fairing::AdHoc;
use rocket::{Build, Catcher, Rocket, catchers, http::Method};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};
use rocket_okapi::{get_openapi_route, okapi::merge::marge_spec_list};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the configured level,
/// e.g. `RUST_LOG=info,roll_call::service=debug`.
pub fn init_tracing(log_level: &str, json_format: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_line_number(true);

    // Tests build many rockets in one process; only the first subscriber sticks.
    let _ = if json_format { subscriber.json().try_init() } else { subscriber.try_init() };
}

fn build_cors(cors_config: &config::CorsConfig) -> Result<rocket_cors::Cors, String> {
    let is_wildcard = cors_config.allowed_origins.len() == 1 && cors_config.allowed_origins[0] == "*";

    if is_wildcard && cors_config.allow_credentials {
        return Err("Invalid CORS configuration: wildcard origins (*) cannot be combined with credentials".to_string());
    }

    let allowed_origins = if cors_config.allowed_origins.is_empty() {
        AllowedOrigins::some_exact::<&str>(&[])
    } else if is_wildcard {
        AllowedOrigins::all()
    } else {
        AllowedOrigins::some_exact(&cors_config.allowed_origins.iter().map(String::as_str).collect::<Vec<_>>())
    };

    CorsOptions {
        allowed_origins,
        allowed_methods: vec![Method::Get, Method::Post, Method::Options, Method::Head]
            .into_iter()
            .map(From::from)
            .collect(),
        allowed_headers: rocket_cors::AllowedHeaders::some(&["Content-Type", "Authorization", "Accept", auth::PRESENTER_TOKEN_HEADER]),
        allow_credentials: cors_config.allow_credentials,
        ..Default::default()
    }
    .to_cors()
    .map_err(|e| format!("Failed to create CORS fairing: {}", e))
}

fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return config::DEFAULT_API_BASE_PATH.to_string();
    }

    let mut normalized = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };

    while normalized.ends_with('/') && normalized.len() > 1 {
        normalized.pop();
    }

    normalized
}

fn join_base_path(base_path: &str, path: &str) -> String {
    let base = base_path.trim_end_matches('/');
    let suffix = path.trim_start_matches('/');

    if base.is_empty() {
        format!("/{}", suffix)
    } else {
        format!("{}/{}", base, suffix)
    }
}

fn collect_base_paths(api_config: &config::ApiConfig) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for raw in std::iter::once(&api_config.base_path).chain(api_config.additional_base_paths.iter()) {
        let path = normalize_base_path(raw);
        if !normalized.contains(&path) {
            normalized.push(path);
        }
    }
    normalized
}

struct RouteSpec {
    path: &'static str,
    routes: Vec<rocket::Route>,
    openapi: rocket_okapi::okapi::openapi3::OpenApi,
}

fn collect_route_specs() -> Vec<RouteSpec> {
    let (health_routes, health_openapi) = app_routes::health::routes();
    let (session_routes, session_openapi) = app_routes::session::routes();
    let (attendance_routes, attendance_openapi) = app_routes::attendance::routes();

    vec![
        RouteSpec {
            path: "/health",
            routes: health_routes,
            openapi: health_openapi,
        },
        RouteSpec {
            path: "/sessions",
            routes: session_routes,
            openapi: session_openapi,
        },
        RouteSpec {
            path: "/attendance",
            routes: attendance_routes,
            openapi: attendance_openapi,
        },
    ]
}

fn error_catchers() -> Vec<Catcher> {
    catchers![
        app_routes::error::bad_request,
        app_routes::error::unauthorized,
        app_routes::error::forbidden,
        app_routes::error::not_found,
        app_routes::error::conflict,
        app_routes::error::unprocessable,
        app_routes::error::too_many_requests,
        app_routes::error::default_catcher,
    ]
}

fn mount_api_routes(mut rocket: Rocket<Build>, base_path: &str, enable_swagger: bool) -> Rocket<Build> {
    let route_specs = collect_route_specs();
    let mut openapi_list = Vec::new();

    for spec in route_specs {
        rocket = rocket.mount(join_base_path(base_path, spec.path), spec.routes);
        openapi_list.push((spec.path, spec.openapi));
    }

    if enable_swagger {
        match marge_spec_list(&openapi_list) {
            Ok(openapi_docs) => {
                let settings = rocket_okapi::settings::OpenApiSettings::default();
                rocket = rocket.mount(base_path, vec![get_openapi_route(openapi_docs, &settings)]);

                let openapi_url = join_base_path(base_path, "openapi.json");
                rocket = rocket.mount(
                    join_base_path(base_path, "docs"),
                    make_swagger_ui(&SwaggerUIConfig {
                        url: openapi_url,
                        ..Default::default()
                    }),
                );
            }
            Err(e) => rocket = rocket.attach(startup_failure(format!("Could not merge OpenAPI spec: {}", e))),
        }
    }

    rocket.register(base_path, error_catchers())
}

fn stage_rate_limiter(rate_limit_config: config::RateLimitConfig) -> AdHoc {
    AdHoc::on_ignite("Rate Limiter", move |rocket| {
        let limiter = Arc::new(RateLimiter::new(rate_limit_config));
        limiter.clone().spawn_cleanup_task();

        Box::pin(async move { rocket.manage(limiter) })
    })
}

/// Assemble the HTTP service from `config`.
///
/// Invalid CORS or OpenAPI setup is reported by a failing ignite fairing, so `Client::tracked`
/// and `launch` both surface it as an error instead of a panic.
pub fn build_rocket(config: Config) -> Rocket<Build> {
    init_tracing(&config.logging.level, config.logging.json_format);

    let figment = rocket::Config::figment()
        .merge(("port", config.server.port))
        .merge(("address", config.server.address.clone()));

    let mut rocket = rocket::custom(figment)
        .manage(config.clone())
        .attach(stage_rate_limiter(config.rate_limit.clone()))
        .attach(RequestLogger)
        .attach(stage_storage(config.storage.clone(), config.database.clone()))
        .attach(stage_code_issuer(config.attendance.clone()));

    rocket = match build_cors(&config.cors) {
        Ok(cors) => rocket.attach(cors),
        Err(message) => rocket.attach(startup_failure(message)),
    };

    for base_path in collect_base_paths(&config.api) {
        rocket = mount_api_routes(rocket, &base_path, config.api.enable_swagger);
    }

    rocket
}

fn startup_failure(message: String) -> AdHoc {
    AdHoc::try_on_ignite("Startup check", |rocket| async move {
        tracing::error!(%message, "service configuration is invalid");
        Err(rocket)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{client_with, test_config};
    use rocket::http::Status;
    use rocket::local::asynchronous::Client;

    #[test]
    fn base_paths_are_normalized_and_deduplicated() {
        let api = config::ApiConfig {
            base_path: "api/v1/".to_string(),
            additional_base_paths: vec!["/api/v1".to_string(), " ".to_string(), "/legacy/".to_string()],
            enable_swagger: false,
        };

        assert_eq!(collect_base_paths(&api), vec!["/api/v1".to_string(), "/legacy".to_string()]);
    }

    #[test]
    fn join_base_path_handles_slashes() {
        assert_eq!(join_base_path("/api/v1", "/docs"), "/api/v1/docs");
        assert_eq!(join_base_path("/", "health"), "/health");
    }

    #[rocket::async_test]
    async fn wildcard_cors_with_credentials_fails_ignite() {
        let mut config = test_config();
        config.cors.allowed_origins = vec!["*".to_string()];
        config.cors.allow_credentials = true;

        let err = Client::tracked(build_rocket(config)).await.err().expect("ignite must fail");
        assert!(matches!(err.kind(), rocket::error::ErrorKind::FailedFairings(_)));
    }

    #[rocket::async_test]
    async fn routes_are_served_under_additional_base_paths() {
        let mut config = test_config();
        config.api.additional_base_paths = vec!["/legacy".to_string()];
        let client = client_with(config).await;

        assert_eq!(client.get("/legacy/health").dispatch().await.status(), Status::Ok);
        assert_eq!(client.get("/api/v1/health").dispatch().await.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn openapi_document_is_served_when_enabled() {
        let mut config = test_config();
        config.api.enable_swagger = true;
        let client = client_with(config).await;

        let response = client.get("/api/v1/openapi.json").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let document: serde_json::Value = response.into_json().await.expect("openapi json");
        let paths = document["paths"].as_object().expect("paths object");
        assert!(paths.keys().any(|path| path.starts_with("/sessions")));
        assert!(paths.keys().any(|path| path.starts_with("/attendance")));
    }
}
