//! Field coercion from bronze text to fixed semantic types
//!
//! - text: trimmed, blank reads as missing
//! - timestamps: RFC 3339, `YYYY-MM-DD[ T]HH:MM:SS[.f]`, or a bare date (midnight)
//! - quantities: integers; integral decimals like `12.0` are accepted, any
//!   non-zero fraction is rejected
//! - money: decimal rounded to 2 places, midpoint away from zero

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use greengrocer_common::{RecordErrorKind, MONEY_PRECISION, MONEY_SCALE};
use rust_decimal::{Decimal, RoundingStrategy};
use std::num::IntErrorKind;
use std::str::FromStr;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Trimmed text, `None` when absent or blank
pub fn text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Trimmed text that must be present
pub fn required_text(field: &str, value: Option<&str>) -> Result<String, RecordErrorKind> {
    text(value).ok_or_else(|| RecordErrorKind::parse(field, "", "missing value"))
}

fn required<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str, RecordErrorKind> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RecordErrorKind::parse(field, "", "missing value"))
}

/// Parse a timestamp
pub fn timestamp(field: &str, value: Option<&str>) -> Result<NaiveDateTime, RecordErrorKind> {
    let value = required(field, value)?;

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.naive_utc());
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, DATE_FORMAT) {
        return Ok(date.and_time(NaiveTime::MIN));
    }

    Err(RecordErrorKind::parse(field, value, "unrecognized timestamp format"))
}

/// Parse a calendar date; timestamps are accepted and truncated to their date
pub fn date(field: &str, value: Option<&str>) -> Result<NaiveDate, RecordErrorKind> {
    let trimmed = required(field, value)?;
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
        return Ok(date);
    }
    timestamp(field, Some(trimmed))
        .map(|ts| ts.date())
        .map_err(|_| RecordErrorKind::parse(field, trimmed, "unrecognized date format"))
}

/// Parse an integer quantity
pub fn quantity(field: &str, value: Option<&str>) -> Result<i64, RecordErrorKind> {
    let value = required(field, value)?;
    if let Ok(parsed) = value.parse::<i64>() {
        return Ok(parsed);
    }

    // Checked on the text: Decimal rounds away digits past its 28-digit scale
    let not_a_number = || RecordErrorKind::parse(field, value, "not a number");
    let (whole, fraction) = value.split_once('.').ok_or_else(not_a_number)?;
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(not_a_number());
    }
    if fraction.bytes().any(|b| b != b'0') {
        return Err(RecordErrorKind::parse(field, value, "fractional quantity"));
    }
    whole.parse::<i64>().map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
            RecordErrorKind::parse(field, value, "out of range")
        }
        _ => not_a_number(),
    })
}

/// Parse a money amount as a 2 dp fixed-point decimal
pub fn money(field: &str, value: Option<&str>) -> Result<Decimal, RecordErrorKind> {
    let value = required(field, value)?;
    let parsed = Decimal::from_str(value)
        .map_err(|_| RecordErrorKind::parse(field, value, "not a decimal number"))?;

    let scale = MONEY_SCALE as u32;
    let mut rounded = parsed.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(scale);

    let limit = Decimal::from(10i64.pow((MONEY_PRECISION as i8 - MONEY_SCALE) as u32));
    if rounded.abs() >= limit {
        return Err(RecordErrorKind::parse(
            field,
            value,
            format!("exceeds DECIMAL({}, {})", MONEY_PRECISION, MONEY_SCALE),
        ));
    }

    Ok(rounded)
}
