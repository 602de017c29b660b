use crate::error::CoreError;

/// All database primary keys are 64-bit integers.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Parse an RFC 3339 timestamp as sent by the server (`"2024-01-01T00:00:00Z"`).
pub fn parse_timestamp(value: &str) -> Result<Timestamp, CoreError> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| CoreError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}
