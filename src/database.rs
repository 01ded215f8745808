pub mod attendance;
pub mod memory;
pub mod postgres_repository;
pub mod session;

use crate::database::attendance::AttendanceRepository;
use crate::database::session::SessionRepository;
use std::sync::Arc;

/// Storage used by the routes, regardless of backend.
pub trait Repository: SessionRepository + AttendanceRepository + Send + Sync {}

impl<T> Repository for T where T: SessionRepository + AttendanceRepository + Send + Sync {}

pub type SharedRepository = Arc<dyn Repository>;
