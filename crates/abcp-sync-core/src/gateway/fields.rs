//! Value coercion for Bitrix24 payload fields

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

const DESTINATION_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MIN_PHONE_DIGITS: usize = 6;

/// Balance as sent to the destination: a number when the source text parses,
/// otherwise the source text itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BalanceValue {
    Number(f64),
    Raw(String),
}

impl From<BalanceValue> for Value {
    fn from(value: BalanceValue) -> Self {
        match value {
            BalanceValue::Number(number) => Self::from(number),
            BalanceValue::Raw(text) => Self::String(text),
        }
    }
}

/// Coerce a locale-formatted balance such as `-1 582,00` into a number.
///
/// Spaces (including no-break and narrow no-break spaces) are removed and a
/// decimal comma becomes a dot. Text that still does not parse to a finite
/// number is passed through unchanged. Blank input yields `None`.
pub fn coerce_balance(raw: Option<&str>) -> Option<BalanceValue> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{202f}'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    match cleaned.parse::<f64>() {
        Ok(number) if number.is_finite() => Some(BalanceValue::Number(number)),
        _ => {
            tracing::debug!(balance = trimmed, "Balance is not numeric, passing through");
            Some(BalanceValue::Raw(trimmed.to_string()))
        }
    }
}

/// Digits with an optional leading `+`; numbers shorter than six digits are dropped.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < MIN_PHONE_DIGITS {
        return None;
    }

    let sign = if trimmed.starts_with('+') { "+" } else { "" };
    Some(format!("{sign}{digits}"))
}

/// First valid address in a `,`/`;`/whitespace separated list.
///
/// `Name <user@example.com>` forms are accepted; the top-level domain must be
/// at least two latin letters.
pub fn normalize_email(raw: &str) -> Option<String> {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    static ADDRESS: OnceLock<Regex> = OnceLock::new();

    let separators = SEPARATORS.get_or_init(|| Regex::new(r"[;,\s]+").expect("Invalid regex"));
    let address = ADDRESS
        .get_or_init(|| Regex::new(r"^[^@\s<>]+@[^@\s<>]+\.[A-Za-z]{2,}$").expect("Invalid regex"));

    separators
        .split(raw)
        .map(|token| token.trim().trim_matches(['<', '>']).trim_matches('"'))
        .find(|token| address.is_match(token))
        .map(str::to_string)
}

/// Digits-only tax id, kept only for 10 (company) or 12 (individual) digits.
pub fn normalize_inn(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    matches!(digits.len(), 10 | 12).then_some(digits)
}

/// Render a source timestamp as `YYYY-MM-DD HH:MM:SS`.
///
/// Accepts ISO-8601 variants (`T` separator, trailing `Z`, offsets, fractional
/// seconds, date only). Unrecognized text is returned trimmed.
pub fn normalize_datetime(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.naive_local().format(DESTINATION_DATETIME_FORMAT).to_string());
    }

    let cleaned = trimmed.replace('T', " ").replace('Z', "");
    let parsed = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&cleaned, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(&cleaned, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        });

    Some(parsed.map_or_else(
        || trimmed.to_string(),
        |value| value.format(DESTINATION_DATETIME_FORMAT).to_string(),
    ))
}

/// Read an entity id from a Bitrix24 `result`: an integer or an integer string.
pub fn parse_entity_id(value: Option<&Value>) -> Result<i64, String> {
    match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .ok_or_else(|| format!("result {number} is not an integer id")),
        Some(Value::String(text)) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("result {text:?} is not an integer id")),
        Some(Value::Bool(_)) => Err("expected an integer id, got a boolean".to_string()),
        Some(other) => Err(format!("expected an integer id, got {other}")),
        None => Err("response did not include result".to_string()),
    }
}
