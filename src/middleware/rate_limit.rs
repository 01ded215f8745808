use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use rocket::http::{Method, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RateLimitBucket {
    Read,
    Mutation,
    Submission,
}

impl RateLimitBucket {
    fn from_method(method: Method) -> Self {
        match method {
            Method::Post | Method::Put | Method::Patch | Method::Delete => RateLimitBucket::Mutation,
            Method::Get | Method::Head | Method::Options | Method::Trace | Method::Connect => RateLimitBucket::Read,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RateLimitKey {
    client: String,
    bucket: RateLimitBucket,
}

#[derive(Debug, Clone)]
struct Counter {
    window_start: Instant,
    count: u32,
}

#[derive(Debug)]
pub(crate) struct RateLimiter {
    config: RateLimitConfig,
    window: Duration,
    cleanup_interval: Duration,
    counters: Mutex<HashMap<RateLimitKey, Counter>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let window = Duration::from_secs(config.window_seconds.max(1));
        let cleanup_interval = Duration::from_secs(config.cleanup_interval_seconds.max(1));

        Self {
            config,
            window,
            cleanup_interval,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn spawn_cleanup_task(self: Arc<Self>) {
        let cleanup_interval = self.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let window = self.window;
                let mut counters = self.counters.lock().await;
                counters.retain(|_, counter| now.duration_since(counter.window_start) < window);
            }
        });
    }

    async fn check(&self, client: &str, bucket: RateLimitBucket) -> RateLimitDecision {
        // Fixed window: bursts can exceed the limit near window boundaries.
        let limit = self.limit_for_bucket(bucket);
        let now = Instant::now();
        let mut counters = self.counters.lock().await;

        let key = RateLimitKey {
            client: client.to_string(),
            bucket,
        };
        let counter = counters.entry(key).or_insert_with(|| Counter { window_start: now, count: 0 });

        if now.duration_since(counter.window_start) >= self.window {
            counter.window_start = now;
            counter.count = 0;
        }

        if counter.count >= limit {
            let elapsed = now.duration_since(counter.window_start);
            return RateLimitDecision::Limited {
                retry_after: self.window.saturating_sub(elapsed),
            };
        }

        counter.count += 1;
        RateLimitDecision::Allow
    }

    fn limit_for_bucket(&self, bucket: RateLimitBucket) -> u32 {
        match bucket {
            RateLimitBucket::Read => self.config.read_limit,
            RateLimitBucket::Mutation => self.config.mutation_limit,
            RateLimitBucket::Submission => self.config.submission_limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RateLimitDecision {
    Allow,
    Limited { retry_after: Duration },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RateLimit;

/// Limits attendance submissions per client, independent of the HTTP method buckets.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SubmissionRateLimit;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RateLimitRetryAfter(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RateLimitError {
    TooManyRequests,
    MissingClientIp,
}

impl RateLimitError {
    fn status(self) -> Status {
        match self {
            RateLimitError::TooManyRequests => Status::TooManyRequests,
            RateLimitError::MissingClientIp => Status::BadRequest,
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RateLimit {
    type Error = RateLimitError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match rate_limit_request(request, RateLimitBucket::from_method(request.method())).await {
            Outcome::Success(_) => Outcome::Success(RateLimit),
            Outcome::Error(error) => Outcome::Error(error),
            Outcome::Forward(status) => Outcome::Forward(status),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SubmissionRateLimit {
    type Error = RateLimitError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match rate_limit_request(request, RateLimitBucket::Submission).await {
            Outcome::Success(_) => Outcome::Success(SubmissionRateLimit),
            Outcome::Error(error) => Outcome::Error(error),
            Outcome::Forward(status) => Outcome::Forward(status),
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for RateLimit {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        too_many_requests_response()
    }
}

impl<'a> OpenApiFromRequest<'a> for SubmissionRateLimit {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        too_many_requests_response()
    }
}

async fn rate_limit_request(request: &Request<'_>, bucket: RateLimitBucket) -> Outcome<(), RateLimitError> {
    let limiter = match request.rocket().state::<Arc<RateLimiter>>() {
        Some(limiter) => limiter,
        None => return Outcome::Success(()),
    };

    let request_id = request
        .local_cache(|| None::<crate::middleware::RequestId>)
        .as_ref()
        .map(|r| r.0.as_str())
        .unwrap_or("unknown");

    let ip = request.client_ip().map(|addr| addr.to_string());
    if ip.is_none() {
        warn!(
            request_id = %request_id,
            method = %request.method(),
            uri = %request.uri(),
            "client ip unavailable for rate limiting"
        );
    }

    let client = match ip {
        Some(ip) => ip,
        None if limiter.config.require_client_ip => {
            return Outcome::Error((RateLimitError::MissingClientIp.status(), RateLimitError::MissingClientIp));
        }
        None => "missing-ip".to_string(),
    };

    match limiter.check(&client, bucket).await {
        RateLimitDecision::Allow => Outcome::Success(()),
        RateLimitDecision::Limited { retry_after } => {
            let retry_after_secs = retry_after.as_secs().max(1);
            request.local_cache(|| Some(RateLimitRetryAfter(retry_after_secs)));
            warn!(
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
                retry_after_secs = %retry_after_secs,
                "rate limit exceeded"
            );
            Outcome::Error((RateLimitError::TooManyRequests.status(), RateLimitError::TooManyRequests))
        }
    }
}

fn too_many_requests_response() -> rocket_okapi::Result<Responses> {
    let mut responses = Responses::default();
    responses.responses.insert(
        "429".to_string(),
        RefOr::Object(OpenApiResponse {
            description: "Too Many Requests".to_string(),
            ..Default::default()
        }),
    );
    Ok(responses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::error::too_many_requests;
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use rocket::{catchers, get, post, routes};

    fn config(read_limit: u32, mutation_limit: u32, submission_limit: u32, window_seconds: u64) -> RateLimitConfig {
        RateLimitConfig {
            read_limit,
            mutation_limit,
            submission_limit,
            window_seconds,
            cleanup_interval_seconds: 60,
            require_client_ip: false,
        }
    }

    #[get("/limited")]
    async fn limited(_rate_limit: RateLimit) -> Status {
        Status::Ok
    }

    #[post("/submit")]
    async fn submit(_rate_limit: SubmissionRateLimit) -> Status {
        Status::Ok
    }

    #[rocket::async_test]
    async fn rate_limiter_blocks_after_limit() {
        let limiter = RateLimiter::new(config(2, 1, 1, 60));

        assert_eq!(limiter.check("127.0.0.1", RateLimitBucket::Read).await, RateLimitDecision::Allow);
        assert_eq!(limiter.check("127.0.0.1", RateLimitBucket::Read).await, RateLimitDecision::Allow);
        assert!(matches!(
            limiter.check("127.0.0.1", RateLimitBucket::Read).await,
            RateLimitDecision::Limited { .. }
        ));
        assert_eq!(limiter.check("10.0.0.2", RateLimitBucket::Read).await, RateLimitDecision::Allow);
    }

    #[rocket::async_test]
    async fn rate_limiter_resets_after_window() {
        let limiter = RateLimiter::new(config(1, 1, 1, 1));

        assert_eq!(limiter.check("127.0.0.1", RateLimitBucket::Read).await, RateLimitDecision::Allow);
        assert!(matches!(
            limiter.check("127.0.0.1", RateLimitBucket::Read).await,
            RateLimitDecision::Limited { .. }
        ));

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(limiter.check("127.0.0.1", RateLimitBucket::Read).await, RateLimitDecision::Allow);
    }

    #[rocket::async_test]
    async fn buckets_are_counted_separately() {
        let limiter = RateLimiter::new(config(10, 5, 1, 60));

        assert_eq!(limiter.check("127.0.0.1", RateLimitBucket::Submission).await, RateLimitDecision::Allow);
        assert!(matches!(
            limiter.check("127.0.0.1", RateLimitBucket::Submission).await,
            RateLimitDecision::Limited { .. }
        ));
        assert_eq!(limiter.check("127.0.0.1", RateLimitBucket::Mutation).await, RateLimitDecision::Allow);
    }

    #[rocket::async_test]
    async fn rate_limiter_does_not_increment_when_limited() {
        let limiter = RateLimiter::new(config(1, 1, 1, 60));

        assert_eq!(limiter.check("10.0.0.1", RateLimitBucket::Read).await, RateLimitDecision::Allow);
        for _ in 0..3 {
            assert!(matches!(
                limiter.check("10.0.0.1", RateLimitBucket::Read).await,
                RateLimitDecision::Limited { .. }
            ));
        }

        assert_eq!(limiter.count_for("10.0.0.1", RateLimitBucket::Read).await, 1);
    }

    #[test]
    fn rate_limit_bucket_from_method() {
        assert_eq!(RateLimitBucket::from_method(Method::Get), RateLimitBucket::Read);
        assert_eq!(RateLimitBucket::from_method(Method::Head), RateLimitBucket::Read);
        assert_eq!(RateLimitBucket::from_method(Method::Options), RateLimitBucket::Read);
        assert_eq!(RateLimitBucket::from_method(Method::Post), RateLimitBucket::Mutation);
        assert_eq!(RateLimitBucket::from_method(Method::Put), RateLimitBucket::Mutation);
        assert_eq!(RateLimitBucket::from_method(Method::Delete), RateLimitBucket::Mutation);
    }

    #[rocket::async_test]
    async fn rate_limit_retry_after_header_is_set() {
        let limiter = Arc::new(RateLimiter::new(config(0, 0, 0, 60)));

        let rocket = rocket::build()
            .manage(limiter)
            .mount("/", routes![limited, submit])
            .register("/", catchers![too_many_requests]);

        let client = Client::tracked(rocket).await.expect("valid rocket instance");

        let response = client.get("/limited").dispatch().await;
        assert_eq!(response.status(), Status::TooManyRequests);
        assert_eq!(response.headers().get_one("Retry-After"), Some("60"));
        assert_eq!(response.content_type(), Some(ContentType::JSON));

        let response = client.post("/submit").dispatch().await;
        assert_eq!(response.status(), Status::TooManyRequests);
    }

    impl RateLimiter {
        async fn count_for(&self, client: &str, bucket: RateLimitBucket) -> u32 {
            let counters = self.counters.lock().await;
            counters
                .get(&RateLimitKey {
                    client: client.to_string(),
                    bucket,
                })
                .map(|counter| counter.count)
                .unwrap_or(0)
        }
    }
}
