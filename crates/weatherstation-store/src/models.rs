//! Data models for stored readings.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A reading stored in the database.
///
/// The `timestamp` carries the store's configured offset, so serializing it
/// yields the station's wall-clock time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Database row ID, assigned on insert and never reused.
    #[serde(rename = "ID", alias = "id")]
    pub id: i64,
    /// Temperature in Celsius.
    pub temperature: f64,
    /// Relative humidity percentage, rounded on ingestion.
    pub humidity: i64,
    /// Wind speed.
    pub wind_speed: f64,
    /// Wind direction in whole degrees, `[0, 360)`.
    pub wind_direction: i64,
    /// Precipitation accumulated since the previous reading.
    pub precipitation: f64,
    /// When this reading was taken.
    #[serde(with = "wall_clock")]
    pub timestamp: OffsetDateTime,
}

/// A validated reading that has not been assigned an ID yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub temperature: f64,
    pub humidity: i64,
    pub wind_speed: f64,
    pub wind_direction: i64,
    pub precipitation: f64,
    pub timestamp: OffsetDateTime,
}

/// Serde helpers for `YYYY-MM-DDTHH:MM:SS` timestamps without an offset.
///
/// Serialization writes the wall-clock time in whatever offset the value
/// already carries. Deserialization has no offset to go by and assumes UTC.
pub mod wall_clock {
    use serde::{Deserialize, Deserializer, Serializer, de, ser};
    use time::format_description::BorrowedFormatItem;
    use time::macros::format_description;
    use time::{OffsetDateTime, PrimitiveDateTime};

    /// `YYYY-MM-DDTHH:MM:SS`
    pub const FORMAT: &[BorrowedFormatItem<'static>] =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

    /// Render a timestamp in its own offset, without the offset suffix.
    pub fn format(value: &OffsetDateTime) -> Result<String, time::error::Format> {
        value.format(FORMAT)
    }

    pub fn serialize<S: Serializer>(
        value: &OffsetDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let text = format(value).map_err(ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<OffsetDateTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        PrimitiveDateTime::parse(&text, FORMAT)
            .map(PrimitiveDateTime::assume_utc)
            .map_err(de::Error::custom)
    }
}
