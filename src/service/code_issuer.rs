use crate::config::AttendanceConfig;
use crate::database::Repository;
use crate::database::session::SessionRepository;
use crate::error::app_error::AppError;
use crate::models::session::{CodeRotation, NewSession, Session, SessionRequest};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

const ENTROPY_BYTES: usize = 32;
const MAX_ROTATION_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCode {
    pub code: String,
    /// Label stored with the code in the session history.
    pub source: String,
}

pub trait CodeSource: Send + Sync {
    fn generate(&self) -> GeneratedCode;
}

/// SHA-256 over OS entropy, upper-case hex, truncated.
#[derive(Debug, Clone)]
pub struct EntropyCodeSource {
    length: usize,
}

impl EntropyCodeSource {
    pub fn new(length: usize) -> Self {
        // A SHA-256 digest is 64 hex characters.
        Self { length: length.clamp(4, 64) }
    }
}

impl CodeSource for EntropyCodeSource {
    fn generate(&self) -> GeneratedCode {
        let mut entropy = [0u8; ENTROPY_BYTES];
        OsRng.fill_bytes(&mut entropy);

        let digest = Sha256::digest(entropy);
        let mut code = hex::encode_upper(digest);
        code.truncate(self.length);

        GeneratedCode {
            code,
            source: "os-entropy".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RotationSettings {
    pub default_interval_seconds: i32,
    pub grace: Duration,
}

impl From<&AttendanceConfig> for RotationSettings {
    fn from(config: &AttendanceConfig) -> Self {
        Self {
            default_interval_seconds: config.rotation_interval_seconds.clamp(5, 3600),
            grace: Duration::seconds(config.grace_seconds.max(0)),
        }
    }
}

/// Issues and rotates session codes.
pub struct CodeIssuer {
    source: Arc<dyn CodeSource>,
    settings: RotationSettings,
}

impl CodeIssuer {
    pub fn new(source: Arc<dyn CodeSource>, settings: RotationSettings) -> Self {
        Self { source, settings }
    }

    pub fn from_config(config: &AttendanceConfig) -> Self {
        Self::new(Arc::new(EntropyCodeSource::new(config.code_length)), RotationSettings::from(config))
    }

    pub fn grace(&self) -> Duration {
        self.settings.grace
    }

    /// Generate a code that differs from `current`, so a rotation always changes what is shown.
    fn next_code(&self, current: Option<&str>) -> GeneratedCode {
        let mut generated = self.source.generate();
        for _ in 0..MAX_ROTATION_ATTEMPTS {
            if Some(generated.code.as_str()) != current {
                break;
            }
            generated = self.source.generate();
        }
        generated
    }

    pub async fn open_session(&self, repo: &dyn Repository, request: &SessionRequest, now: DateTime<Utc>) -> Result<Session, AppError> {
        request.validate()?;

        let generated = self.next_code(None);
        let new_session = NewSession {
            course_label: request.course_label.trim().to_string(),
            rotation_interval_seconds: request.rotation_interval_seconds.unwrap_or(self.settings.default_interval_seconds),
            code: generated.code,
            code_source: generated.source,
            issued_at: now,
        };

        let session = repo.create_session(&new_session).await?;
        info!(
            session_id = %session.id,
            course_label = %session.course_label,
            rotation_interval_seconds = session.rotation_interval_seconds,
            "attendance session opened"
        );

        Ok(session)
    }

    /// Load a session, rotating its code first if it has expired.
    pub async fn current(&self, repo: &dyn Repository, session_id: &Uuid, now: DateTime<Utc>) -> Result<Session, AppError> {
        let mut session = load_session(repo, session_id).await?;

        for _ in 0..MAX_ROTATION_ATTEMPTS {
            if !session.is_open() || !session.is_code_expired(now) {
                return Ok(session);
            }

            let previous_code_expires_at = session.code_expires_at();
            match self.try_rotate(repo, &session, now, previous_code_expires_at).await? {
                Some(rotated) => return Ok(rotated),
                // Someone else rotated or closed it; look again.
                None => session = load_session(repo, session_id).await?,
            }
        }

        warn!(session_id = %session_id, "code rotation kept losing races");
        Ok(session)
    }

    /// Rotate immediately. The outgoing code stays acceptable for the grace window from now.
    pub async fn rotate(&self, repo: &dyn Repository, session_id: &Uuid, now: DateTime<Utc>) -> Result<Session, AppError> {
        for _ in 0..MAX_ROTATION_ATTEMPTS {
            let session = load_session(repo, session_id).await?;
            if !session.is_open() {
                return Err(AppError::SessionClosed(session.id));
            }

            let previous_code_expires_at = now.min(session.code_expires_at());
            if let Some(rotated) = self.try_rotate(repo, &session, now, previous_code_expires_at).await? {
                return Ok(rotated);
            }
        }

        Err(AppError::Internal(format!("could not rotate code for session {}", session_id)))
    }

    /// Rotate every open session whose code has expired. Returns how many were rotated.
    pub async fn rotate_expired(&self, repo: &dyn Repository, now: DateTime<Utc>) -> Result<usize, AppError> {
        let expired = repo.list_expired_sessions(now).await?;
        let mut rotated = 0;

        for session in expired {
            let previous_code_expires_at = session.code_expires_at();
            if self.try_rotate(repo, &session, now, previous_code_expires_at).await?.is_some() {
                rotated += 1;
            }
        }

        if rotated > 0 {
            debug!(rotated, "rotated expired session codes");
        }

        Ok(rotated)
    }

    pub async fn close_session(&self, repo: &dyn Repository, session_id: &Uuid, now: DateTime<Utc>) -> Result<Session, AppError> {
        let session = repo
            .close_session(session_id, now)
            .await?
            .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

        info!(session_id = %session.id, "attendance session closed");
        Ok(session)
    }

    async fn try_rotate(
        &self,
        repo: &dyn Repository,
        session: &Session,
        now: DateTime<Utc>,
        previous_code_expires_at: DateTime<Utc>,
    ) -> Result<Option<Session>, AppError> {
        let generated = self.next_code(Some(&session.active_code));
        let rotation = CodeRotation {
            expected_code: session.active_code.clone(),
            new_code: generated.code,
            code_source: generated.source,
            issued_at: now,
            previous_code_expires_at,
        };

        let rotated = repo.replace_code(&session.id, &rotation).await?;
        if let Some(rotated) = &rotated {
            debug!(session_id = %rotated.id, issued_at = %rotated.code_issued_at, "session code rotated");
        }

        Ok(rotated)
    }
}

pub async fn load_session(repo: &dyn Repository, session_id: &Uuid) -> Result<Session, AppError> {
    repo.get_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))
}

/// Run `rotate_expired` on a fixed interval until the runtime shuts down.
pub fn spawn_rotation_sweep(issuer: Arc<CodeIssuer>, repo: Arc<dyn Repository>, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = issuer.rotate_expired(repo.as_ref(), Utc::now()).await {
                warn!(error = ?err, "rotation sweep failed");
            }
        }
    });
}
