use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::payload::{ParseError, find_identifier, find_percent, find_text};

/// Starting state of charge sent with every bind request.
pub const DEFAULT_SOC_START: u8 = 20;

const ID_KEYS: &[&str] = &["Id", "id"];
const BOOKING_ID_KEYS: &[&str] = &["BookingId", "bookingId", "booking_id"];
const VEHICLE_MODEL_KEYS: &[&str] = &["VehicleModelId", "vehicleModelId", "vehicle_model_id"];
const SOC_START_KEYS: &[&str] = &["SocStart", "socStart", "soc_start"];
const TARGET_SOC_KEYS: &[&str] = &["TargetSoc", "targetSoc", "target_soc"];

/// Booking bound to the current charging session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub id: String,
    pub booking_id: String,
    pub vehicle_model_id: Option<String>,
    pub soc_start: u8,
    pub target_soc: u8,
}

/// Confirmed reservation as listed for the signed-in driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSummary {
    #[serde(deserialize_with = "identifier_from_json")]
    pub id: String,
    pub code: String,
    pub status: String,
    #[serde(default)]
    pub vehicle_model_id: Option<String>,
    #[serde(default)]
    pub station_name: Option<String>,
    #[serde(default)]
    pub starts_at: Option<String>,
}

/// Booking ids are listed as JSON strings by some backends and as numbers by
/// others.
fn identifier_from_json<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number id, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindBookingRequest {
    pub booking_code: String,
    pub soc_start: u8,
    pub target_soc: u8,
}

/// Normalizes a bind-booking success payload.
///
/// `Id` and `BookingId` are mandatory. Missing SoC fields fall back to the
/// values that were submitted.
pub fn parse_bind_response(
    payload: &Value,
    submitted: &BindBookingRequest,
) -> Result<Booking, ParseError> {
    let object = payload.as_object().ok_or(ParseError::InvalidPayloadType)?;

    let id = find_identifier(object, ID_KEYS).ok_or(ParseError::MissingField("Id"))?;
    let booking_id =
        find_identifier(object, BOOKING_ID_KEYS).ok_or(ParseError::MissingField("BookingId"))?;

    Ok(Booking {
        id,
        booking_id,
        vehicle_model_id: find_identifier(object, VEHICLE_MODEL_KEYS),
        soc_start: find_percent(object, SOC_START_KEYS, "SocStart")?
            .unwrap_or(submitted.soc_start),
        target_soc: find_percent(object, TARGET_SOC_KEYS, "TargetSoc")?
            .unwrap_or(submitted.target_soc),
    })
}

/// Extracts a user-facing message from an error body, if it carries one.
pub fn error_message_from_body(body: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(body).ok()?;
    let object = payload.as_object()?;
    find_text(object, &["message", "error", "title", "detail"])
}
