use crate::config::{AttendanceConfig, DatabaseConfig, StorageBackend, StorageConfig};
use crate::database::SharedRepository;
use crate::database::memory::InMemoryRepository;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::service::code_issuer::{CodeIssuer, spawn_rotation_sweep};
use rocket::fairing::AdHoc;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;

pub async fn init_pool(db_config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .acquire_timeout(Duration::from_secs(db_config.acquire_timeout))
        .idle_timeout(Duration::from_secs(30))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&db_config.url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Connect to Postgres and apply migrations when configured.
pub async fn connect_repository(db_config: &DatabaseConfig) -> Result<PostgresRepository, AppError> {
    let pool = init_pool(db_config).await.map_err(|e| AppError::db("Failed to initialize database pool", e))?;
    if db_config.run_migrations {
        run_migrations(&pool).await?;
    }
    Ok(PostgresRepository { pool })
}

/// Build the repository for the configured backend.
pub async fn open_repository(storage: &StorageConfig, db_config: &DatabaseConfig) -> Result<SharedRepository, AppError> {
    match storage.backend {
        StorageBackend::Postgres => Ok(Arc::new(connect_repository(db_config).await?)),
        StorageBackend::Memory => Ok(Arc::new(InMemoryRepository::new())),
    }
}

pub fn stage_storage(storage: StorageConfig, db_config: DatabaseConfig) -> AdHoc {
    AdHoc::try_on_ignite("Attendance storage", |rocket| async move {
        match open_repository(&storage, &db_config).await {
            Ok(repo) => {
                tracing::info!(backend = ?storage.backend, "Attendance storage initialized");
                Ok(rocket.manage(repo))
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to initialize attendance storage");
                Err(rocket)
            }
        }
    })
}

/// Manage the code issuer and, once the server is live, start the rotation sweep.
pub fn stage_code_issuer(attendance: AttendanceConfig) -> AdHoc {
    AdHoc::on_ignite("Code issuer", |rocket| async move {
        let issuer = Arc::new(CodeIssuer::from_config(&attendance));
        let sweep_every = attendance.sweep_interval_seconds;

        rocket.manage(issuer).attach(AdHoc::on_liftoff("Rotation sweep", move |rocket| {
            Box::pin(async move {
                if sweep_every == 0 {
                    return;
                }

                match (rocket.state::<Arc<CodeIssuer>>(), rocket.state::<SharedRepository>()) {
                    (Some(issuer), Some(repo)) => {
                        spawn_rotation_sweep(issuer.clone(), repo.clone(), Duration::from_secs(sweep_every));
                        tracing::info!(interval_seconds = sweep_every, "Rotation sweep started");
                    }
                    _ => tracing::warn!("Rotation sweep not started: issuer or storage missing"),
                }
            })
        }))
    })
}
