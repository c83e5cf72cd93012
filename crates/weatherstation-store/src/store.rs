//! Main store implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::types::Type;
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, info};

use crate::aggregate::{self, AggregateBucket, BucketWidth};
use crate::error::{Error, Result};
use crate::models::{NewReading, Reading};
use crate::queries::ReadingQuery;
use crate::schema;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

static MEMORY_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

enum Location {
    File(PathBuf),
    /// Shared-cache in-memory database URI.
    Memory(String),
}

/// SQLite-based store for weather readings.
///
/// The store does not hold a connection across operations. Every call opens
/// a short-lived connection, so concurrent readers and writers never queue
/// behind an application-level lock; on-disk databases use WAL so readers
/// do not block the writer either.
///
/// Timestamps returned by the store are converted to the configured
/// [`UtcOffset`] (UTC unless set with [`Store::with_offset`]).
pub struct Store {
    location: Location,
    offset: UtcOffset,
    /// Keeps a shared in-memory database alive between operations.
    _keepalive: Option<Mutex<Connection>>,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self {
            location: Location::File(path.to_path_buf()),
            offset: UtcOffset::UTC,
            _keepalive: None,
        })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open a private in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let n = MEMORY_DB_COUNTER.fetch_add(1, Ordering::Relaxed);
        let uri = format!(
            "file:weatherstation-mem-{}-{}?mode=memory&cache=shared",
            std::process::id(),
            n
        );

        let conn = Connection::open(&uri)?;
        schema::initialize(&conn)?;

        Ok(Self {
            location: Location::Memory(uri),
            offset: UtcOffset::UTC,
            _keepalive: Some(Mutex::new(conn)),
        })
    }

    /// Set the offset that returned timestamps are expressed in.
    pub fn with_offset(mut self, offset: UtcOffset) -> Self {
        self.offset = offset;
        self
    }

    /// The offset that returned timestamps are expressed in.
    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    fn connect(&self) -> Result<Connection> {
        let conn = match &self.location {
            Location::File(path) => Connection::open(path)?,
            Location::Memory(uri) => Connection::open(uri)?,
        };
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }
}

fn reading_from_row(row: &rusqlite::Row<'_>, offset: UtcOffset) -> rusqlite::Result<Reading> {
    let secs: i64 = row.get(6)?;
    let timestamp = OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Integer, Box::new(e)))?
        .to_offset(offset);

    Ok(Reading {
        id: row.get(0)?,
        temperature: row.get(1)?,
        humidity: row.get(2)?,
        wind_speed: row.get(3)?,
        wind_direction: row.get(4)?,
        precipitation: row.get(5)?,
        timestamp,
    })
}

// Reading operations
impl Store {
    /// Append a reading and return its newly assigned ID.
    pub fn insert_reading(&self, reading: &NewReading) -> Result<i64> {
        let conn = self.connect()?;

        conn.execute(
            "INSERT INTO weather (temperature, humidity, wind_speed, wind_direction,
             precipitation, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                reading.temperature,
                reading.humidity,
                reading.wind_speed,
                reading.wind_direction,
                reading.precipitation,
                reading.timestamp.unix_timestamp(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!("Inserted reading {} at {}", id, reading.timestamp);
        Ok(id)
    }

    /// Query readings with filters.
    pub fn query_readings(&self, query: &ReadingQuery) -> Result<Vec<Reading>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let readings = stmt
            .query_map(rusqlite::params_from_iter(params), |row| {
                reading_from_row(row, self.offset)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(readings)
    }

    /// Get the most recent reading by timestamp, if any.
    ///
    /// Readings may arrive out of order, so this is not necessarily the
    /// last one inserted.
    pub fn latest_reading(&self) -> Result<Option<Reading>> {
        let query = ReadingQuery::new().newest_first().limit(1);
        let mut readings = self.query_readings(&query)?;
        Ok(readings.pop())
    }

    /// Downsample the readings matched by `query` into fixed-width buckets.
    ///
    /// Limit and ordering on `query` are ignored; buckets always cover every
    /// matching reading and come back in ascending bucket order.
    pub fn aggregate_readings(
        &self,
        query: &ReadingQuery,
        width: BucketWidth,
    ) -> Result<Vec<AggregateBucket>> {
        let scan = ReadingQuery {
            since: query.since,
            before: query.before,
            ..ReadingQuery::new()
        };
        let readings = self.query_readings(&scan)?;
        let buckets = aggregate::aggregate(&readings, width)?;

        debug!(
            "Aggregated {} readings into {} buckets of {}s",
            readings.len(),
            buckets.len(),
            width.seconds()
        );
        Ok(buckets)
    }
}
