use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("payload must be a JSON object")]
    InvalidPayloadType,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("field {0} is out of range")]
    OutOfRange(&'static str),
}

/// Looks a field up by its exact aliases first, then by a normalized key
/// (ASCII alphanumerics, lowercased) so `BookingId`, `bookingId` and
/// `booking_id` all resolve to the same field.
pub fn find_value<'a>(object: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    for alias in aliases {
        if let Some(value) = object.get(*alias) {
            return Some(value);
        }
    }

    let normalized_aliases: Vec<String> =
        aliases.iter().map(|alias| normalize_key(alias)).collect();

    object.iter().find_map(|(key, value)| {
        let normalized_key = normalize_key(key);
        if normalized_aliases
            .iter()
            .any(|alias| alias == &normalized_key)
        {
            Some(value)
        } else {
            None
        }
    })
}

pub fn find_number(object: &Map<String, Value>, aliases: &[&str]) -> Option<f64> {
    find_value(object, aliases).and_then(parse_f64)
}

/// Identifiers arrive as JSON strings or numbers; both normalize to a string.
pub fn find_identifier(object: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    match find_value(object, aliases)? {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

pub fn find_text(object: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    match find_value(object, aliases)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    }
}

/// Reads a state-of-charge percentage. Fractions are rounded; anything
/// outside 0..=100 is rejected.
pub fn find_percent(
    object: &Map<String, Value>,
    aliases: &[&str],
    field: &'static str,
) -> Result<Option<u8>, ParseError> {
    match find_number(object, aliases) {
        Some(value) => percent_from_f64(value)
            .map(Some)
            .ok_or(ParseError::OutOfRange(field)),
        None => Ok(None),
    }
}

pub fn percent_from_f64(value: f64) -> Option<u8> {
    if !value.is_finite() {
        return None;
    }
    let rounded = value.round();
    (0.0..=100.0).contains(&rounded).then_some(rounded as u8)
}

fn normalize_key(value: &str) -> String {
    value
        .chars()
        .filter(|char| char.is_ascii_alphanumeric())
        .flat_map(|char| char.to_lowercase())
        .collect()
}

fn parse_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }
}
