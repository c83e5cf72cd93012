//! Query builder for stored readings.
//!
//! [`ReadingQuery`] follows the builder pattern. Time filters describe a
//! half-open interval: `since` is inclusive, `before` is exclusive, which is
//! what calendar-day ranges need.
//!
//! # Example
//!
//! ```
//! use weatherstation_store::{ReadingQuery, Store};
//! use time::macros::datetime;
//!
//! let store = Store::open_in_memory()?;
//!
//! // Everything recorded on 2024-06-01 (UTC), oldest first
//! let query = ReadingQuery::new()
//!     .since(datetime!(2024-06-01 00:00:00 UTC))
//!     .before(datetime!(2024-06-02 00:00:00 UTC));
//!
//! let readings = store.query_readings(&query)?;
//! assert!(readings.is_empty());
//! # Ok::<(), weatherstation_store::Error>(())
//! ```

use time::OffsetDateTime;

/// Fluent query builder for readings.
///
/// Use this to construct queries for [`Store::query_readings`](crate::Store::query_readings)
/// and [`Store::aggregate_readings`](crate::Store::aggregate_readings).
///
/// By default, queries return results ordered by `timestamp` ascending
/// (oldest first), ties broken by `id`.
#[derive(Debug, Default, Clone)]
pub struct ReadingQuery {
    /// Include only readings at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Include only readings strictly before this time.
    pub before: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Order by timestamp descending (newest first).
    pub newest_first: bool,
}

impl ReadingQuery {
    /// Create a new query: no filters, no limit, oldest first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter to readings taken at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to readings taken strictly before this time.
    pub fn before(mut self, time: OffsetDateTime) -> Self {
        self.before = Some(time);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Order results newest first.
    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<i64>) {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if let Some(since) = self.since {
            conditions.push("timestamp >= ?");
            params.push(since.unix_timestamp());
        }

        if let Some(before) = self.before {
            conditions.push("timestamp < ?");
            params.push(before.unix_timestamp());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, temperature, humidity, wind_speed, wind_direction, precipitation, \
             timestamp FROM weather {} ORDER BY timestamp {}, id {}",
            where_clause, order, order
        );

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        sql
    }
}
