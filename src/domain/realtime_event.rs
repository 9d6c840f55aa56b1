use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::domain::payload::{ParseError, find_number, find_percent, find_text, find_value};

pub const CAR_INFORMATION: &str = "car_information";
pub const SOC_UPDATE: &str = "soc_update";
pub const CHARGING_COMPLETE: &str = "charging_complete";
pub const CHARGING_ERROR: &str = "charging_error";
pub const ERROR: &str = "error";
pub const LOAD_CAR_INFORMATION: &str = "load_car_information";
pub const START_SESSION: &str = "start_session";

const SOC_KEYS: &[&str] = &["soc", "Soc", "currentSoc", "current_soc"];
const CAPACITY_KEYS: &[&str] = &[
    "batteryCapacity",
    "battery_capacity",
    "batteryCapacityKwh",
    "capacity",
];
const POWER_KEYS: &[&str] = &["power", "powerKw", "power_kw"];
const ENERGY_KEYS: &[&str] = &["energy", "energyKwh", "energy_kwh", "energyDelivered"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "time", "at"];
const MESSAGE_KEYS: &[&str] = &["message", "error", "reason"];

/// Message as delivered by the realtime channel, before interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeMessage {
    pub name: String,
    pub data: Value,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarInformation {
    pub soc: u8,
    pub battery_capacity_kwh: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    pub soc: u8,
    pub power_kw: Option<f64>,
    pub energy_kwh: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChargingEvent {
    CarInformation(CarInformation),
    SocUpdate(ProgressSample),
    ChargingComplete,
    ChargingError { message: String },
    Unknown { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    LoadCarInformation { session_id: String },
    StartSession { target_soc: u8 },
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoadCarInformation { .. } => LOAD_CAR_INFORMATION,
            Self::StartSession { .. } => START_SESSION,
        }
    }

    pub fn data(&self) -> Value {
        match self {
            Self::LoadCarInformation { session_id } => json!({ "sessionId": session_id }),
            Self::StartSession { target_soc } => json!({ "targetSoc": target_soc }),
        }
    }
}

impl RealtimeMessage {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
            received_at: Utc::now(),
        }
    }
}

pub fn interpret(message: &RealtimeMessage) -> Result<ChargingEvent, ParseError> {
    match message.name.as_str() {
        CAR_INFORMATION => parse_car_information(&message.data).map(ChargingEvent::CarInformation),
        SOC_UPDATE => {
            parse_soc_update(&message.data, message.received_at).map(ChargingEvent::SocUpdate)
        }
        CHARGING_COMPLETE => Ok(ChargingEvent::ChargingComplete),
        CHARGING_ERROR | ERROR => Ok(ChargingEvent::ChargingError {
            message: error_message(&message.data),
        }),
        other => Ok(ChargingEvent::Unknown {
            name: other.to_string(),
        }),
    }
}

fn parse_car_information(data: &Value) -> Result<CarInformation, ParseError> {
    let object = data.as_object().ok_or(ParseError::InvalidPayloadType)?;
    let soc = find_percent(object, SOC_KEYS, "soc")?.ok_or(ParseError::MissingField("soc"))?;
    let battery_capacity_kwh = find_number(object, CAPACITY_KEYS)
        .filter(|capacity| capacity.is_finite() && *capacity > 0.0);

    Ok(CarInformation {
        soc,
        battery_capacity_kwh,
    })
}

fn parse_soc_update(
    data: &Value,
    received_at: DateTime<Utc>,
) -> Result<ProgressSample, ParseError> {
    let object = data.as_object().ok_or(ParseError::InvalidPayloadType)?;
    let soc = find_percent(object, SOC_KEYS, "soc")?.ok_or(ParseError::MissingField("soc"))?;

    let timestamp = find_value(object, TIMESTAMP_KEYS)
        .and_then(parse_timestamp)
        .unwrap_or(received_at);

    Ok(ProgressSample {
        soc,
        power_kw: find_number(object, POWER_KEYS),
        energy_kwh: find_number(object, ENERGY_KEYS).unwrap_or(0.0),
        timestamp,
    })
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc)),
        Value::Number(number) => number
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

fn error_message(data: &Value) -> String {
    let message = match data {
        Value::String(text) => Some(text.trim().to_string()).filter(|text| !text.is_empty()),
        Value::Object(object) => find_text(object, MESSAGE_KEYS),
        _ => None,
    };
    message.unwrap_or_else(|| "Charging reported an error".to_string())
}
