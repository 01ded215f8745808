use crate::Config;
use crate::database::{Repository, SharedRepository};
use crate::db::open_repository;
use crate::models::audit::AuditReport;
use crate::models::countdown::{Countdown, Tick};
use crate::models::session::Session;
use crate::service::audit;
use crate::service::code_issuer::CodeIssuer;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct RotationSummary {
    pub sessions_rotated: usize,
}

#[derive(Debug, Clone)]
pub struct AuditSummary {
    pub report: AuditReport,
}

impl AuditSummary {
    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(&self.report).map_err(|err| format!("Failed to serialize audit report: {err}"))
    }

    pub fn is_clean(&self) -> bool {
        self.report.is_clean()
    }
}

async fn open(config: &Config) -> Result<(CodeIssuer, SharedRepository), String> {
    let repo = open_repository(&config.storage, &config.database)
        .await
        .map_err(|err| format!("Failed to open storage: {err:?}"))?;
    Ok((CodeIssuer::from_config(&config.attendance), repo))
}

fn parse_session_id(raw: &str) -> Result<Uuid, String> {
    Uuid::parse_str(raw.trim()).map_err(|err| format!("Invalid session id '{raw}': {err}"))
}

pub async fn rotate_expired_codes(config: &Config) -> Result<RotationSummary, String> {
    let (issuer, repo) = open(config).await?;
    let sessions_rotated = issuer
        .rotate_expired(repo.as_ref(), Utc::now())
        .await
        .map_err(|err| format!("Failed to rotate expired codes: {err:?}"))?;

    Ok(RotationSummary { sessions_rotated })
}

pub async fn audit_session(config: &Config, session_id: &str) -> Result<AuditSummary, String> {
    let session_id = parse_session_id(session_id)?;
    let (issuer, repo) = open(config).await?;
    let report = audit::audit_session(repo.as_ref(), &session_id, issuer.grace(), Utc::now())
        .await
        .map_err(|err| format!("Failed to audit session {session_id}: {err}"))?;

    Ok(AuditSummary { report })
}

/// Print the session code with a one-second countdown, re-reading the session every tick,
/// until the session is closed.
pub async fn follow_display(config: &Config, session_id: &str) -> Result<(), String> {
    let session_id = parse_session_id(session_id)?;
    let (issuer, repo) = open(config).await?;
    let mut stdout = std::io::stdout();

    run_display(&issuer, repo.as_ref(), &session_id, Duration::from_secs(1), None, &mut stdout).await
}

fn render(session: &Session, countdown: &Countdown, out: &mut impl Write) -> Result<(), String> {
    writeln!(out, "{}  {}  {:>4}s", session.course_label, session.active_code, countdown.remaining()).map_err(|err| format!("Failed to write display line: {err}"))
}

fn interval_of(session: &Session) -> u32 {
    u32::try_from(session.rotation_interval_seconds).unwrap_or(1)
}

pub(crate) async fn run_display(
    issuer: &CodeIssuer,
    repo: &dyn Repository,
    session_id: &Uuid,
    tick_every: Duration,
    max_ticks: Option<usize>,
    out: &mut impl Write,
) -> Result<(), String> {
    let fetch = move |now: DateTime<Utc>| async move {
        issuer
            .current(repo, session_id, now)
            .await
            .map_err(|err| format!("Failed to load session {session_id}: {err}"))
    };

    let mut session = fetch(Utc::now()).await?;
    let mut countdown = Countdown::new(interval_of(&session));
    countdown.resync(session.seconds_remaining(Utc::now()), interval_of(&session));

    let mut ticker = tokio::time::interval(tick_every);
    ticker.tick().await;
    let mut ticks = 0usize;

    while session.is_open() {
        render(&session, &countdown, out)?;

        if max_ticks.is_some_and(|max| ticks >= max) {
            return Ok(());
        }
        ticker.tick().await;
        ticks += 1;

        let rotate = countdown.tick() == Tick::Rotate;
        let now = Utc::now();
        let latest = fetch(now).await?;
        if rotate || latest.active_code != session.active_code {
            countdown.resync(latest.seconds_remaining(now), interval_of(&latest));
        }
        session = latest;
    }

    writeln!(out, "{}  session closed", session.course_label).map_err(|err| format!("Failed to write display line: {err}"))
}
