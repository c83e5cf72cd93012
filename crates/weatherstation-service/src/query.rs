//! Query dispatch: range resolution, then a raw scan or an aggregation.

use serde::Serialize;
use tracing::debug;
use weatherstation_store::{AggregateBucket, Reading, Store};

use crate::range::{RangeError, RangeRequest};
use crate::state::Clock;

/// Result of a range query.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum QueryOutcome {
    /// Raw readings, oldest first.
    Readings(Vec<Reading>),
    /// One bucket per non-empty interval, in bucket order.
    Buckets(Vec<AggregateBucket>),
}

impl QueryOutcome {
    pub fn len(&self) -> usize {
        match self {
            QueryOutcome::Readings(readings) => readings.len(),
            QueryOutcome::Buckets(buckets) => buckets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    BadRequest(#[from] RangeError),
    #[error(transparent)]
    Store(#[from] weatherstation_store::Error),
}

/// Resolve `request` and fetch the matching readings or buckets.
///
/// The request is fully resolved before the store is touched.
pub fn dispatch(
    store: &Store,
    request: &RangeRequest,
    clock: &Clock,
) -> Result<QueryOutcome, QueryError> {
    let range = request.resolve(clock.today(store.offset()), store.offset())?;
    let query = range.to_query();

    let outcome = match range.bucket() {
        Some(width) => QueryOutcome::Buckets(store.aggregate_readings(&query, width)?),
        None => QueryOutcome::Readings(store.query_readings(&query)?),
    };

    debug!(
        "Range [{}, {}) bucket={:?} returned {} rows",
        range.start(),
        range.end(),
        range.bucket().map(|w| w.seconds()),
        outcome.len()
    );

    Ok(outcome)
}

/// The most recent reading, if any.
pub fn latest(store: &Store) -> weatherstation_store::Result<Option<Reading>> {
    store.latest_reading()
}
