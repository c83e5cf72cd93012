//! HTTP service for weather station readings.
//!
//! This crate provides a service that:
//! - Accepts readings pushed by a station and stores them
//! - Serves readings for a calendar range, raw or downsampled into buckets
//! - Reports the most recent reading
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/weather/latest` - Most recent reading
//! - `GET /api/weather?start&end&everySec` - Readings for `[start, end]`, optionally bucketed
//! - `GET /api/weather?mode=hourly&day` - Readings for one day
//! - `GET /api/weather?mode=daily&end` - Readings for the seven days ending on `end`
//! - `POST /api/pushData` - Ingest one reading
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/weatherstation/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:5500"
//! utc_offset = "+01:00"
//!
//! [storage]
//! path = "~/.local/share/weatherstation/weather.db"
//! ```

pub mod api;
pub mod config;
pub mod ingest;
pub mod query;
pub mod range;
pub mod state;

pub use config::{Config, ConfigError, ServerConfig, StorageConfig, ValidationError};
pub use ingest::IngestError;
pub use query::{QueryError, QueryOutcome};
pub use range::{RangeError, RangeRequest, ResolvedRange};
pub use state::{AppState, Clock};
