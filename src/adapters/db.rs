use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::{
    BindRecord, BookingRecord, DockSessionRecord, NewBookingRecord, NewDockSessionRecord,
    STATUS_CONFIRMED, STATUS_IN_USE,
};

pub const LATEST_SCHEMA_VERSION: u32 = 3;

const MIGRATIONS: &[(u32, &str)] = &[
    (
        1,
        r#"
CREATE TABLE IF NOT EXISTS bookings (
    id TEXT PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    vehicle_model_id TEXT,
    station_name TEXT,
    starts_at TEXT,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bookings_user_status
ON bookings (user_id, status);
"#,
    ),
    (
        2,
        r#"
CREATE TABLE IF NOT EXISTS dock_sessions (
    id TEXT PRIMARY KEY,
    dock_code TEXT NOT NULL,
    user_id TEXT NOT NULL,
    channel_id TEXT NOT NULL UNIQUE,
    realtime_token TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    booking_id TEXT REFERENCES bookings (id),
    soc_start INTEGER,
    target_soc INTEGER,
    bound_at TEXT,
    created_at TEXT NOT NULL
);
"#,
    ),
    (
        3,
        r#"
CREATE TABLE bookings_scoped (
    id TEXT PRIMARY KEY,
    code TEXT NOT NULL,
    user_id TEXT NOT NULL,
    vehicle_model_id TEXT,
    station_name TEXT,
    starts_at TEXT,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (user_id, code)
);

INSERT INTO bookings_scoped
SELECT id, code, user_id, vehicle_model_id, station_name, starts_at, status, created_at
FROM bookings;

CREATE TEMP TABLE dock_sessions_backup AS SELECT * FROM dock_sessions;
DROP TABLE dock_sessions;
DROP TABLE bookings;
ALTER TABLE bookings_scoped RENAME TO bookings;

CREATE INDEX idx_bookings_user_status
ON bookings (user_id, status);

CREATE TABLE dock_sessions (
    id TEXT PRIMARY KEY,
    dock_code TEXT NOT NULL,
    user_id TEXT NOT NULL,
    channel_id TEXT NOT NULL UNIQUE,
    realtime_token TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    booking_id TEXT REFERENCES bookings (id),
    soc_start INTEGER,
    target_soc INTEGER,
    bound_at TEXT,
    created_at TEXT NOT NULL
);

INSERT INTO dock_sessions
SELECT id, dock_code, user_id, channel_id, realtime_token, expires_at, booking_id,
       soc_start, target_soc, bound_at, created_at
FROM dock_sessions_backup;

DROP TABLE dock_sessions_backup;
"#,
    ),
];

const BOOKING_COLUMNS: &str =
    "id, code, user_id, vehicle_model_id, station_name, starts_at, status, created_at";
const DOCK_SESSION_COLUMNS: &str = "id, dock_code, user_id, channel_id, realtime_token, expires_at, booking_id, soc_start, target_soc, bound_at, created_at";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported schema version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
}

pub fn open_connection(path: &str) -> Result<Connection, DbError> {
    let connection = Connection::open(path)?;
    connection.pragma_update(None, "foreign_keys", true)?;
    Ok(connection)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), DbError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, DbError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

pub fn insert_booking(
    connection: &Connection,
    new_booking: &NewBookingRecord,
) -> Result<BookingRecord, DbError> {
    let record = BookingRecord {
        id: Uuid::new_v4().to_string(),
        code: new_booking.code.clone(),
        user_id: new_booking.user_id.clone(),
        vehicle_model_id: new_booking.vehicle_model_id.clone(),
        station_name: new_booking.station_name.clone(),
        starts_at: new_booking.starts_at.clone(),
        status: STATUS_CONFIRMED.to_string(),
        created_at: new_booking.created_at.clone(),
    };

    connection.execute(
        "INSERT INTO bookings (id, code, user_id, vehicle_model_id, station_name, starts_at, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.id,
            record.code,
            record.user_id,
            record.vehicle_model_id,
            record.station_name,
            record.starts_at,
            record.status,
            record.created_at,
        ],
    )?;

    Ok(record)
}

pub fn get_booking(connection: &Connection, id: &str) -> Result<Option<BookingRecord>, DbError> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1");
    let booking = connection
        .query_row(&sql, params![id], booking_from_row)
        .optional()?;
    Ok(booking)
}

pub fn get_booking_by_code(
    connection: &Connection,
    user_id: &str,
    code: &str,
) -> Result<Option<BookingRecord>, DbError> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = ?1 AND code = ?2");
    let booking = connection
        .query_row(&sql, params![user_id, code], booking_from_row)
        .optional()?;
    Ok(booking)
}

pub fn list_bookings_for_user(
    connection: &Connection,
    user_id: &str,
    status: Option<&str>,
) -> Result<Vec<BookingRecord>, DbError> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS}
         FROM bookings
         WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY starts_at IS NULL, starts_at ASC, created_at ASC"
    );
    let mut statement = connection.prepare(&sql)?;
    let rows = statement.query_map(params![user_id, status], booking_from_row)?;

    let mut bookings = Vec::new();
    for row in rows {
        bookings.push(row?);
    }

    Ok(bookings)
}

/// Moves a booking from `from_status` to `to_status`; returns whether a row
/// changed.
pub fn transition_booking_status(
    connection: &Connection,
    id: &str,
    from_status: &str,
    to_status: &str,
) -> Result<bool, DbError> {
    let changed = connection.execute(
        "UPDATE bookings SET status = ?3 WHERE id = ?1 AND status = ?2",
        params![id, from_status, to_status],
    )?;
    Ok(changed == 1)
}

pub fn insert_dock_session(
    connection: &Connection,
    new_session: &NewDockSessionRecord,
) -> Result<DockSessionRecord, DbError> {
    let id = Uuid::new_v4().to_string();
    let record = DockSessionRecord {
        channel_id: format!("session:{id}"),
        realtime_token: Uuid::new_v4().simple().to_string(),
        id,
        dock_code: new_session.dock_code.clone(),
        user_id: new_session.user_id.clone(),
        expires_at: new_session.expires_at.clone(),
        booking_id: None,
        soc_start: None,
        target_soc: None,
        bound_at: None,
        created_at: new_session.created_at.clone(),
    };

    connection.execute(
        "INSERT INTO dock_sessions (id, dock_code, user_id, channel_id, realtime_token, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.id,
            record.dock_code,
            record.user_id,
            record.channel_id,
            record.realtime_token,
            record.expires_at,
            record.created_at,
        ],
    )?;

    Ok(record)
}

pub fn get_dock_session(
    connection: &Connection,
    id: &str,
) -> Result<Option<DockSessionRecord>, DbError> {
    let sql = format!("SELECT {DOCK_SESSION_COLUMNS} FROM dock_sessions WHERE id = ?1");
    let session = connection
        .query_row(&sql, params![id], dock_session_from_row)
        .optional()?;
    Ok(session)
}

/// Binds a booking to an unbound session and marks the booking in use,
/// atomically. Returns `false` when the session was already bound or the
/// booking was no longer confirmed.
pub fn bind_dock_session(connection: &Connection, bind: &BindRecord<'_>) -> Result<bool, DbError> {
    let transaction = connection.unchecked_transaction()?;

    let session_changed = transaction.execute(
        "UPDATE dock_sessions
         SET booking_id = ?2, soc_start = ?3, target_soc = ?4, bound_at = ?5
         WHERE id = ?1 AND booking_id IS NULL",
        params![
            bind.session_id,
            bind.booking_id,
            bind.soc_start,
            bind.target_soc,
            bind.bound_at,
        ],
    )?;
    if session_changed != 1 {
        return Ok(false);
    }

    if !transition_booking_status(&transaction, bind.booking_id, STATUS_CONFIRMED, STATUS_IN_USE)? {
        return Ok(false);
    }

    transaction.commit()?;
    Ok(true)
}

pub fn count_rows(connection: &Connection, table: SandboxTable) -> Result<i64, DbError> {
    let sql = format!("SELECT COUNT(*) FROM {}", table.name());
    let count = connection.query_row(&sql, [], |row| row.get(0))?;
    Ok(count)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxTable {
    Bookings,
    DockSessions,
}

impl SandboxTable {
    fn name(self) -> &'static str {
        match self {
            Self::Bookings => "bookings",
            Self::DockSessions => "dock_sessions",
        }
    }
}

fn booking_from_row(row: &Row<'_>) -> rusqlite::Result<BookingRecord> {
    Ok(BookingRecord {
        id: row.get(0)?,
        code: row.get(1)?,
        user_id: row.get(2)?,
        vehicle_model_id: row.get(3)?,
        station_name: row.get(4)?,
        starts_at: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn dock_session_from_row(row: &Row<'_>) -> rusqlite::Result<DockSessionRecord> {
    Ok(DockSessionRecord {
        id: row.get(0)?,
        dock_code: row.get(1)?,
        user_id: row.get(2)?,
        channel_id: row.get(3)?,
        realtime_token: row.get(4)?,
        expires_at: row.get(5)?,
        booking_id: row.get(6)?,
        soc_start: row.get(7)?,
        target_soc: row.get(8)?,
        bound_at: row.get(9)?,
        created_at: row.get(10)?,
    })
}
