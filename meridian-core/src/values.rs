//! Scalar value parsing and coercion.
//!
//! Literals arrive as raw text from KVP parameters and XML elements. They are
//! either auto-cast (when the schema gives no type) or coerced against the
//! matched element's XSD type.

use crate::error::{ExceptionCode, Result, WfsError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::cmp::Ordering;

/// A typed scalar, the unit of comparison in compiled queries.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Time(NaiveTime),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Numeric view, when the value is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Integer(i) => Some(*i as f64),
            ScalarValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Ordering used by comparison predicates and sort keys.
    /// Numbers compare across Integer/Double; mixed kinds are incomparable.
    pub fn compare(&self, other: &ScalarValue) -> Option<Ordering> {
        use ScalarValue::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (String(a), String(b)) => Some(a.cmp(b)),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            (DateTime(a), DateTime(b)) => Some(a.cmp(b)),
            (Time(a), Time(b)) => Some(a.cmp(b)),
            (Date(a), DateTime(b)) => a
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().cmp(b)),
            (DateTime(a), Date(b)) => b
                .and_hms_opt(0, 0, 0)
                .map(|dt| a.cmp(&dt.and_utc())),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }
}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarValue::Null => Ok(()),
            ScalarValue::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            ScalarValue::Integer(i) => write!(f, "{i}"),
            ScalarValue::Double(d) => write!(f, "{d}"),
            ScalarValue::String(s) => f.write_str(s),
            ScalarValue::Date(d) => write!(f, "{d}"),
            ScalarValue::DateTime(d) => write!(f, "{}", d.to_rfc3339()),
            ScalarValue::Time(t) => write!(f, "{t}"),
        }
    }
}

/// Automatically cast a raw string to a scalar.
///
/// Recognizes integers, decimal floats and ISO datetimes. Booleans are not
/// auto-cast; that leads to unpredictable behavior with free-text values.
pub fn auto_cast(value: &str) -> ScalarValue {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(i) = value.parse::<i64>() {
            return ScalarValue::Integer(i);
        }
    }
    if is_decimal(value) {
        if let Ok(d) = value.parse::<f64>() {
            return ScalarValue::Double(d);
        }
    }
    if value.contains('T') {
        if let Ok(dt) = parse_iso_datetime(value) {
            return ScalarValue::DateTime(dt);
        }
    }
    ScalarValue::String(value.to_string())
}

fn is_decimal(value: &str) -> bool {
    let Some((int, frac)) = value.split_once('.') else {
        return false;
    };
    !int.is_empty()
        && !frac.is_empty()
        && int.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b.is_ascii_digit())
}

fn parse_error(text: String) -> WfsError {
    WfsError::new(ExceptionCode::OperationParsingFailed, text)
}

/// Translate an ISO date into a date value.
pub fn parse_iso_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| parse_error(format!("Date must be in YYYY-MM-DD format: '{raw}'")))
}

/// Translate an ISO datetime into a UTC datetime value.
/// A missing timezone designator is interpreted as UTC.
pub fn parse_iso_datetime(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| {
            parse_error(format!(
                "Date must be in YYYY-MM-DDTHH:MM:SS[.uuuuuu][TZ] format: '{raw}'"
            ))
        })
}

/// Translate an ISO time into a time value.
pub fn parse_iso_time(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S%.f"))
        .map_err(|_| parse_error(format!("Time must be in HH:MM:SS[.uuuuuu] format: '{raw}'")))
}

/// Translate XML notations of true/1 and false/0 into a boolean.
pub fn parse_bool(raw: &str) -> Result<bool> {
    match raw {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(parse_error(format!("Can't cast '{raw}' to boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_cast_recognizes_numbers() {
        assert_eq!(auto_cast("42"), ScalarValue::Integer(42));
        assert_eq!(auto_cast("3.5"), ScalarValue::Double(3.5));
        assert_eq!(auto_cast("abc"), ScalarValue::String("abc".into()));
        // Booleans stay strings on purpose.
        assert_eq!(auto_cast("true"), ScalarValue::String("true".into()));
    }

    #[test]
    fn auto_cast_recognizes_datetimes() {
        match auto_cast("2020-05-04T12:00:00Z") {
            ScalarValue::DateTime(dt) => assert_eq!(dt.to_rfc3339(), "2020-05-04T12:00:00+00:00"),
            other => panic!("expected datetime, got {other:?}"),
        }
        // A 'T' inside a word is not a datetime.
        assert_eq!(auto_cast("Tea"), ScalarValue::String("Tea".into()));
    }

    #[test]
    fn cross_type_numeric_comparison() {
        let a = ScalarValue::Integer(3);
        let b = ScalarValue::Double(3.5);
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert_eq!(
            ScalarValue::String("x".into()).compare(&ScalarValue::Integer(1)),
            None
        );
    }

    #[test]
    fn null_is_incomparable() {
        assert_eq!(ScalarValue::Null.compare(&ScalarValue::Integer(1)), None);
    }

    #[test]
    fn bool_parsing() {
        assert!(parse_bool("true").unwrap());
        assert!(parse_bool("1").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("yes").is_err());
    }
}
