//! Local persistence for weather station readings.
//!
//! This crate provides SQLite-based storage for timestamped sensor readings
//! together with the downsampling engine used to serve bucketed queries.
//!
//! # Features
//!
//! - Append-only reading table indexed by timestamp
//! - Half-open `[since, before)` range scans, ordered by timestamp
//! - Latest-reading lookup
//! - Fixed-width bucket aggregation with circular averaging of wind direction
//!
//! # Example
//!
//! ```no_run
//! use weatherstation_store::{BucketWidth, ReadingQuery, Store};
//! use time::macros::datetime;
//!
//! let store = Store::open_default()?;
//!
//! let query = ReadingQuery::new()
//!     .since(datetime!(2024-06-01 00:00:00 UTC))
//!     .before(datetime!(2024-06-02 00:00:00 UTC));
//! let readings = store.query_readings(&query)?;
//!
//! // Five minute averages over the same day
//! let width = BucketWidth::new(300).expect("width in range");
//! let buckets = store.aggregate_readings(&query, width)?;
//! # Ok::<(), weatherstation_store::Error>(())
//! ```

pub mod aggregate;
mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use aggregate::{AggregateBucket, BucketWidth, aggregate, circular_mean_degrees};
pub use error::{Error, Result};
pub use models::{NewReading, Reading, wall_clock};
pub use queries::ReadingQuery;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/weatherstation/weather.db`
/// - macOS: `~/Library/Application Support/weatherstation/weather.db`
/// - Windows: `C:\Users\<user>\AppData\Local\weatherstation\weather.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("weatherstation")
        .join("weather.db")
}
