use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::Connection;
use thiserror::Error;

use crate::adapters::db;
use crate::adapters::db::{DbError, SandboxTable};
use crate::domain::models::{
    BindRecord, BookingRecord, DockSessionRecord, NewBookingRecord, NewDockSessionRecord,
    STATUS_CANCELLED, STATUS_CONFIRMED,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database lock poisoned")]
    DbLockPoisoned,
    #[error("database operation failed: {0}")]
    Database(#[from] DbError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
    #[error("session has expired")]
    Expired,
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
pub struct NewBookingInput {
    pub code: String,
    pub vehicle_model_id: Option<String>,
    pub station_name: Option<String>,
    pub starts_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BindInput {
    pub booking_code: String,
    pub soc_start: i64,
    pub target_soc: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundSession {
    pub session: DockSessionRecord,
    pub booking: BookingRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxStats {
    pub schema_version: u32,
    pub bookings: i64,
    pub dock_sessions: i64,
}

pub trait SandboxQueryHandler {
    fn list_bookings(
        &self,
        user_id: &str,
        status: Option<&str>,
    ) -> Result<Vec<BookingRecord>, ServiceError>;
    fn stats(&self) -> Result<SandboxStats, ServiceError>;
}

pub trait SandboxCommandHandler {
    fn create_booking(
        &self,
        user_id: &str,
        input: &NewBookingInput,
    ) -> Result<BookingRecord, ServiceError>;
    fn join_dock(&self, user_id: &str, dock_code: &str) -> Result<DockSessionRecord, ServiceError>;
    fn bind_booking(
        &self,
        user_id: &str,
        session_id: &str,
        input: &BindInput,
    ) -> Result<BoundSession, ServiceError>;
    fn cancel_booking(&self, user_id: &str, booking_id: &str)
    -> Result<BookingRecord, ServiceError>;
}

#[derive(Clone)]
pub struct SqliteSandboxService {
    connection: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
    join_ttl: Duration,
}

impl SqliteSandboxService {
    pub fn new(
        connection: Arc<Mutex<Connection>>,
        clock: Arc<dyn Clock>,
        join_ttl: Duration,
    ) -> Self {
        Self {
            connection,
            clock,
            join_ttl,
        }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| ServiceError::DbLockPoisoned)?;
        op(&connection)
    }

    fn now_iso(&self) -> String {
        self.clock.now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl SandboxQueryHandler for SqliteSandboxService {
    fn list_bookings(
        &self,
        user_id: &str,
        status: Option<&str>,
    ) -> Result<Vec<BookingRecord>, ServiceError> {
        self.with_connection(|connection| {
            Ok(db::list_bookings_for_user(connection, user_id, status)?)
        })
    }

    fn stats(&self) -> Result<SandboxStats, ServiceError> {
        self.with_connection(|connection| {
            Ok(SandboxStats {
                schema_version: db::schema_version(connection)?,
                bookings: db::count_rows(connection, SandboxTable::Bookings)?,
                dock_sessions: db::count_rows(connection, SandboxTable::DockSessions)?,
            })
        })
    }
}

impl SandboxCommandHandler for SqliteSandboxService {
    fn create_booking(
        &self,
        user_id: &str,
        input: &NewBookingInput,
    ) -> Result<BookingRecord, ServiceError> {
        let code = input.code.trim();
        if code.is_empty() {
            return Err(ServiceError::Invalid("booking code is required".to_string()));
        }
        let created_at = self.now_iso();

        self.with_connection(|connection| {
            if db::get_booking_by_code(connection, user_id, code)?.is_some() {
                return Err(ServiceError::Conflict(format!(
                    "booking code {code} already exists"
                )));
            }

            let record = db::insert_booking(
                connection,
                &NewBookingRecord {
                    code: code.to_string(),
                    user_id: user_id.to_string(),
                    vehicle_model_id: input.vehicle_model_id.clone(),
                    station_name: input.station_name.clone(),
                    starts_at: input.starts_at.clone(),
                    created_at,
                },
            )
            .map_err(|error| match error {
                DbError::Sqlite(rusqlite::Error::SqliteFailure(failure, _))
                    if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    ServiceError::Conflict(format!("booking code {code} already exists"))
                }
                other => ServiceError::Database(other),
            })?;

            tracing::info!(
                booking_id = %record.id,
                code = %record.code,
                user_id,
                "booking created"
            );
            Ok(record)
        })
    }

    fn join_dock(&self, user_id: &str, dock_code: &str) -> Result<DockSessionRecord, ServiceError> {
        let dock_code = dock_code.trim();
        if dock_code.is_empty() {
            return Err(ServiceError::Invalid("dock code is required".to_string()));
        }

        let now = self.clock.now();
        let new_session = NewDockSessionRecord {
            dock_code: dock_code.to_string(),
            user_id: user_id.to_string(),
            expires_at: (now + self.join_ttl).to_rfc3339_opts(SecondsFormat::Millis, true),
            created_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        self.with_connection(|connection| {
            let session = db::insert_dock_session(connection, &new_session)?;
            tracing::info!(
                session_id = %session.id,
                dock_code = %session.dock_code,
                expires_at = %session.expires_at,
                "dock session opened"
            );
            Ok(session)
        })
    }

    fn bind_booking(
        &self,
        user_id: &str,
        session_id: &str,
        input: &BindInput,
    ) -> Result<BoundSession, ServiceError> {
        if !(0..=100).contains(&input.soc_start) || !(0..=100).contains(&input.target_soc) {
            return Err(ServiceError::Invalid(
                "state of charge must be between 0 and 100".to_string(),
            ));
        }
        if input.target_soc <= input.soc_start {
            return Err(ServiceError::Invalid(
                "target state of charge must exceed the starting level".to_string(),
            ));
        }

        let now = self.clock.now();
        let bound_at = now.to_rfc3339_opts(SecondsFormat::Millis, true);

        self.with_connection(|connection| {
            let session = db::get_dock_session(connection, session_id)?
                .filter(|session| session.user_id == user_id)
                .ok_or(ServiceError::NotFound("session"))?;

            let expired = DateTime::parse_from_rfc3339(&session.expires_at)
                .map(|expires_at| expires_at.with_timezone(&Utc) < now)
                .unwrap_or(false);
            if expired {
                return Err(ServiceError::Expired);
            }
            if session.booking_id.is_some() {
                return Err(ServiceError::Conflict(
                    "Session is already bound to a booking".to_string(),
                ));
            }

            let booking = db::get_booking_by_code(connection, user_id, input.booking_code.trim())?
                .ok_or(ServiceError::NotFound("booking"))?;
            if booking.status != STATUS_CONFIRMED {
                return Err(ServiceError::Conflict(format!(
                    "Booking {} is {}",
                    booking.code, booking.status
                )));
            }

            let bound = db::bind_dock_session(
                connection,
                &BindRecord {
                    session_id: &session.id,
                    booking_id: &booking.id,
                    soc_start: input.soc_start,
                    target_soc: input.target_soc,
                    bound_at: &bound_at,
                },
            )?;
            if !bound {
                return Err(ServiceError::Conflict(
                    "Session is already bound to a booking".to_string(),
                ));
            }

            let session = db::get_dock_session(connection, session_id)?
                .ok_or(ServiceError::NotFound("session"))?;
            let booking = db::get_booking(connection, &booking.id)?
                .ok_or(ServiceError::NotFound("booking"))?;

            tracing::info!(
                session_id = %session.id,
                booking_id = %booking.id,
                target_soc = input.target_soc,
                "booking bound to session"
            );
            Ok(BoundSession { session, booking })
        })
    }

    fn cancel_booking(
        &self,
        user_id: &str,
        booking_id: &str,
    ) -> Result<BookingRecord, ServiceError> {
        self.with_connection(|connection| {
            let booking = db::get_booking(connection, booking_id)?
                .filter(|booking| booking.user_id == user_id)
                .ok_or(ServiceError::NotFound("booking"))?;

            if !db::transition_booking_status(
                connection,
                &booking.id,
                STATUS_CONFIRMED,
                STATUS_CANCELLED,
            )? {
                return Err(ServiceError::Conflict(format!(
                    "Only confirmed bookings can be cancelled; booking is {}",
                    booking.status
                )));
            }

            tracing::info!(booking_id = %booking.id, "booking cancelled");
            db::get_booking(connection, &booking.id)?.ok_or(ServiceError::NotFound("booking"))
        })
    }
}
