//! Internal helpers for payload validation and conversion.
//!
//! These utilities are **not** part of the public API. They centralize the
//! parsing rules so every computation reads dates and amounts the same way.

use api_types::transaction::Transaction;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::{ResultTask, TaskError};

/// Parse an ISO date (`2024-01-05`), an RFC3339 timestamp or a naive
/// `YYYY-MM-DDTHH:MM:SS` timestamp into its calendar date.
///
/// Timestamps keep the date of their own offset, not UTC.
pub(crate) fn parse_date(value: &str) -> ResultTask<NaiveDate> {
    let trimmed = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(timestamp.date_naive());
    }
    if let Ok(timestamp) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(timestamp.date());
    }
    Err(TaskError::InvalidDate(value.to_string()))
}

/// Calendar date of a transaction.
pub(crate) fn transaction_date(tx: &Transaction) -> ResultTask<NaiveDate> {
    parse_date(&tx.date)
}

/// Reject NaN and infinities before they poison every total.
pub(crate) fn checked_amount(tx: &Transaction) -> ResultTask<f64> {
    if !tx.amount.is_finite() {
        return Err(TaskError::InvalidAmount(format!(
            "transaction on {} has a non-finite amount",
            tx.date
        )));
    }
    Ok(tx.amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_dates_and_timestamps() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(parse_date("2024-01-05").unwrap(), expected);
        assert_eq!(parse_date("2024-01-05T23:30:00+02:00").unwrap(), expected);
        assert_eq!(parse_date("2024-01-05T08:15:00.250Z").unwrap(), expected);
        assert_eq!(parse_date("2024-01-05T08:15:00").unwrap(), expected);
    }

    #[test]
    fn offset_timestamps_keep_their_local_date() {
        let date = parse_date("2024-01-31T23:30:00-05:00").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            parse_date("last tuesday"),
            Err(TaskError::InvalidDate("last tuesday".to_string()))
        );
    }
}
