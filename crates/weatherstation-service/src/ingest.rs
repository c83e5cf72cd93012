//! Validation of pushed readings.
//!
//! Stations post loosely typed JSON: numbers may arrive as strings and the
//! timestamp may be missing or written without an offset. [`validate`]
//! turns such a body into a [`NewReading`] or reports every problem with it
//! at once.

use serde_json::{Map, Value};
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};
use weatherstation_store::{NewReading, Store};

/// Fields every pushed reading must carry, in reporting order.
pub const REQUIRED_FIELDS: [&str; 5] = [
    "temperature",
    "humidity",
    "wind_speed",
    "wind_direction",
    "precipitation",
];

/// Offset-less timestamp forms, interpreted in the server offset.
const LOCAL_FORMATS: [&[BorrowedFormatItem<'static>]; 4] = [
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]"),
];

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Why a pushed reading was refused.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("missing fields: {}", .0.join(", "))]
    MissingField(Vec<&'static str>),
    #[error("invalid field types: {}", .0.join(", "))]
    InvalidType(Vec<&'static str>),
    #[error("timestamp invalid: {0}")]
    InvalidTimestamp(String),
    #[error(transparent)]
    Store(#[from] weatherstation_store::Error),
}

/// Validate a pushed body into a reading ready for storage.
///
/// `received_at` supplies the timestamp when the body has none, and its
/// offset is used for timestamps written without one.
pub fn validate(body: &Value, received_at: OffsetDateTime) -> Result<NewReading, IngestError> {
    let empty = Map::new();
    let fields = body.as_object().unwrap_or(&empty);
    let field = |name: &str| fields.get(name).filter(|v| !v.is_null());

    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .into_iter()
        .filter(|name| field(*name).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(IngestError::MissingField(missing));
    }

    let mut values = [0.0; REQUIRED_FIELDS.len()];
    let mut invalid = Vec::new();
    for (slot, name) in values.iter_mut().zip(REQUIRED_FIELDS) {
        match field(name).and_then(coerce_number) {
            Some(value) => *slot = value,
            None => invalid.push(name),
        }
    }
    if !invalid.is_empty() {
        return Err(IngestError::InvalidType(invalid));
    }

    let timestamp = match field("timestamp") {
        None => received_at,
        Some(Value::String(text)) => {
            parse_timestamp(text, received_at.offset()).ok_or_else(|| {
                IngestError::InvalidTimestamp(format!("unrecognized timestamp '{text}'"))
            })?
        }
        Some(_) => {
            return Err(IngestError::InvalidTimestamp(
                "timestamp must be a string".to_string(),
            ));
        }
    };

    let [temperature, humidity, wind_speed, wind_direction, precipitation] = values;
    Ok(NewReading {
        temperature,
        humidity: humidity.round() as i64,
        wind_speed,
        wind_direction: (wind_direction.round() as i64).rem_euclid(360),
        precipitation,
        timestamp: truncate_subseconds(timestamp),
    })
}

/// Validate `body` and append it to the store, returning the new row ID.
pub fn ingest(
    store: &Store,
    body: &Value,
    received_at: OffsetDateTime,
) -> Result<i64, IngestError> {
    let reading = validate(body, received_at)?;
    Ok(store.insert_reading(&reading)?)
}

/// A finite number, or a string holding one.
fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn parse_timestamp(text: &str, offset: UtcOffset) -> Option<OffsetDateTime> {
    let text = text.trim();

    if let Ok(instant) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(instant.to_offset(offset));
    }

    LOCAL_FORMATS
        .iter()
        .find_map(|format| PrimitiveDateTime::parse(text, *format).ok())
        .or_else(|| Date::parse(text, DATE_FORMAT).ok().map(Date::midnight))
        .map(|local| local.assume_offset(offset))
}

fn truncate_subseconds(instant: OffsetDateTime) -> OffsetDateTime {
    instant.replace_nanosecond(0).unwrap_or(instant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::{datetime, offset};
    use weatherstation_store::ReadingQuery;

    const RECEIVED: OffsetDateTime = datetime!(2024-06-01 12:00:00.750 UTC);

    fn body() -> Value {
        json!({
            "temperature": 21.5,
            "humidity": 48.6,
            "wind_speed": 3.25,
            "wind_direction": 270.4,
            "precipitation": 0.2,
        })
    }

    fn with(mut body: Value, key: &str, value: Value) -> Value {
        body[key] = value;
        body
    }

    #[test]
    fn test_validate_accepts_numbers() {
        let reading = validate(&body(), RECEIVED).unwrap();
        assert_eq!(reading.temperature, 21.5);
        assert_eq!(reading.humidity, 49);
        assert_eq!(reading.wind_speed, 3.25);
        assert_eq!(reading.wind_direction, 270);
        assert_eq!(reading.precipitation, 0.2);
    }

    #[test]
    fn test_validate_defaults_timestamp_to_receipt() {
        let reading = validate(&body(), RECEIVED).unwrap();
        assert_eq!(reading.timestamp, datetime!(2024-06-01 12:00:00 UTC));

        let reading = validate(&with(body(), "timestamp", Value::Null), RECEIVED).unwrap();
        assert_eq!(reading.timestamp, datetime!(2024-06-01 12:00:00 UTC));
    }

    #[test]
    fn test_validate_coerces_numeric_strings() {
        let body = json!({
            "temperature": "-3.5",
            "humidity": " 80 ",
            "wind_speed": "1e1",
            "wind_direction": "90",
            "precipitation": "0",
        });
        let reading = validate(&body, RECEIVED).unwrap();
        assert_eq!(reading.temperature, -3.5);
        assert_eq!(reading.humidity, 80);
        assert_eq!(reading.wind_speed, 10.0);
        assert_eq!(reading.wind_direction, 90);
        assert_eq!(reading.precipitation, 0.0);
    }

    #[test]
    fn test_validate_reports_all_missing_fields() {
        let body = json!({ "temperature": 20.0, "wind_direction": 10, "precipitation": null });
        match validate(&body, RECEIVED) {
            Err(IngestError::MissingField(fields)) => {
                assert_eq!(fields, vec!["humidity", "wind_speed", "precipitation"]);
            }
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_non_object_body_is_all_missing() {
        for body in [json!([1, 2, 3]), json!("reading"), Value::Null] {
            match validate(&body, RECEIVED) {
                Err(IngestError::MissingField(fields)) => assert_eq!(fields, REQUIRED_FIELDS),
                other => panic!("expected MissingField, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_validate_reports_all_invalid_fields() {
        let body = json!({
            "temperature": "warm",
            "humidity": 40,
            "wind_speed": "not-a-number",
            "wind_direction": true,
            "precipitation": "",
        });
        match validate(&body, RECEIVED) {
            Err(IngestError::InvalidType(fields)) => {
                assert_eq!(
                    fields,
                    vec!["temperature", "wind_speed", "wind_direction", "precipitation"]
                );
            }
            other => panic!("expected InvalidType, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_reported_before_invalid() {
        let mut body = with(body(), "wind_speed", json!("not-a-number"));
        body.as_object_mut().unwrap().remove("humidity");

        let err = validate(&body, RECEIVED).unwrap_err();
        assert!(matches!(err, IngestError::MissingField(ref f) if f == &["humidity"]));
    }

    #[test]
    fn test_non_finite_strings_rejected() {
        for text in ["NaN", "inf", "-infinity"] {
            let err = validate(&with(body(), "temperature", json!(text)), RECEIVED).unwrap_err();
            assert!(matches!(err, IngestError::InvalidType(_)), "{text}");
        }
    }

    #[test]
    fn test_wind_direction_normalized() {
        let cases = [(359.6, 0), (360.0, 0), (-10.0, 350), (725.0, 5), (0.4, 0)];
        for (raw, expected) in cases {
            let reading = validate(&with(body(), "wind_direction", json!(raw)), RECEIVED).unwrap();
            assert_eq!(reading.wind_direction, expected, "raw {raw}");
        }
    }

    #[test]
    fn test_humidity_rounds_half_away_from_zero() {
        let reading = validate(&with(body(), "humidity", json!(50.5)), RECEIVED).unwrap();
        assert_eq!(reading.humidity, 51);
    }

    #[test]
    fn test_timestamp_forms() {
        let cases = [
            ("2024-03-10T14:05:09Z", datetime!(2024-03-10 14:05:09 UTC)),
            ("2024-03-10T16:05:09+02:00", datetime!(2024-03-10 14:05:09 UTC)),
            ("2024-03-10T14:05:09.987Z", datetime!(2024-03-10 14:05:09 UTC)),
            ("2024-03-10T14:05:09", datetime!(2024-03-10 14:05:09 UTC)),
            ("2024-03-10 14:05:09", datetime!(2024-03-10 14:05:09 UTC)),
            ("2024-03-10 14:05:09.5", datetime!(2024-03-10 14:05:09 UTC)),
            ("2024-03-10T14:05", datetime!(2024-03-10 14:05:00 UTC)),
            ("2024-03-10", datetime!(2024-03-10 00:00:00 UTC)),
        ];
        for (text, expected) in cases {
            let reading = validate(&with(body(), "timestamp", json!(text)), RECEIVED).unwrap();
            assert_eq!(reading.timestamp, expected, "{text}");
        }
    }

    #[test]
    fn test_offsetless_timestamp_uses_server_offset() {
        let received = RECEIVED.to_offset(offset!(+2));
        let reading =
            validate(&with(body(), "timestamp", json!("2024-03-10T14:05:09")), received).unwrap();
        assert_eq!(reading.timestamp, datetime!(2024-03-10 12:05:09 UTC));
    }

    #[test]
    fn test_invalid_timestamps_rejected() {
        let values = [
            json!("yesterday"),
            json!("2024-02-30T00:00:00"),
            json!(""),
            json!(1717243200),
        ];
        for value in values {
            let err = validate(&with(body(), "timestamp", value.clone()), RECEIVED).unwrap_err();
            assert!(matches!(err, IngestError::InvalidTimestamp(_)), "{value}");
        }
    }

    #[test]
    fn test_ingest_appends_one_row() {
        let store = Store::open_in_memory().unwrap();
        let body = with(body(), "timestamp", json!("2024-03-10T14:05:09Z"));

        let id = ingest(&store, &body, RECEIVED).unwrap();

        let readings = store.query_readings(&ReadingQuery::new()).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].id, id);
        assert_eq!(readings[0].timestamp, datetime!(2024-03-10 14:05:09 UTC));
    }

    #[test]
    fn test_ingest_rejected_writes_nothing() {
        let store = Store::open_in_memory().unwrap();
        let body = with(body(), "precipitation", json!("lots"));

        assert!(matches!(
            ingest(&store, &body, RECEIVED),
            Err(IngestError::InvalidType(_))
        ));
        assert!(store.query_readings(&ReadingQuery::new()).unwrap().is_empty());
    }
}
