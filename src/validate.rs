//! Field-level checks shared by every resource.
//!
//! These only look at the values handed to them. Checks that need the
//! database (referenced rows existing, dependents blocking a delete) live in
//! the managers, inside the transaction that performs the write.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::manager::UserType;

pub const MIN_STARS: i64 = 1;
pub const MAX_STARS: i64 = 5;

pub fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| Error::Validation(format!("{field} is required")))
}

/// Present and not blank. The value is kept exactly as submitted.
pub fn required_text(value: Option<String>, field: &str) -> Result<String> {
    non_blank(required(value, field)?, field)
}

pub fn non_blank(value: String, field: &str) -> Result<String> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{field} must not be empty")));
    }
    Ok(value)
}

pub fn parse_user_type(value: &str, field: &str) -> Result<UserType> {
    value.trim().parse().map_err(|_| {
        let allowed = UserType::ALL
            .iter()
            .map(UserType::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Error::Validation(format!("{field} must be one of {allowed}, got {value:?}"))
    })
}

pub fn stars(value: i64) -> Result<i64> {
    if (MIN_STARS..=MAX_STARS).contains(&value) {
        Ok(value)
    } else {
        Err(Error::Validation(format!(
            "stars must be between {MIN_STARS} and {MAX_STARS}, got {value}"
        )))
    }
}

pub fn non_negative(value: i64, field: &str) -> Result<i64> {
    if value < 0 {
        return Err(Error::Validation(format!(
            "{field} must not be negative, got {value}"
        )));
    }
    Ok(value)
}

pub fn time_order(date: DateTime<Utc>, end_time: Option<DateTime<Utc>>) -> Result<()> {
    match end_time {
        Some(end_time) if end_time <= date => Err(Error::Validation(format!(
            "end_time ({end_time}) must be after date ({date})"
        ))),
        _ => Ok(()),
    }
}
