use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::adapters::realtime_http::endpoint_url;
use crate::domain::booking::{
    BindBookingRequest, Booking, BookingSummary, error_message_from_body, parse_bind_response,
};
use crate::domain::join_params::JoinParams;
use crate::domain::payload::ParseError;

pub const AUTH_REQUIRED_MESSAGE: &str = "Authentication required. Please sign in again.";
const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// Backend endpoints used by the session flow.
pub trait BookingBackend {
    fn join_dock(&self, dock_code: &str) -> Result<DockTicket, BackendError>;
    fn list_confirmed_bookings(&self) -> Result<Vec<BookingSummary>, BackendError>;
    fn bind_booking(
        &self,
        session_id: &str,
        request: &BindBookingRequest,
    ) -> Result<Booking, BackendError>;
    fn cancel_booking(&self, booking_id: &str) -> Result<CancelledBooking, BackendError>;
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend answered with status {status}")]
    Status { status: u16, message: Option<String> },
    #[error("failed to decode backend response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed backend payload: {0}")]
    MalformedPayload(#[from] ParseError),
    #[error("invalid backend url: {0}")]
    InvalidUrl(String),
}

impl BackendError {
    /// Text suitable for showing inline next to the form that failed.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingToken => AUTH_REQUIRED_MESSAGE.to_string(),
            Self::Status {
                message: Some(message),
                ..
            } => message.clone(),
            Self::Status { status: 401, .. } => AUTH_REQUIRED_MESSAGE.to_string(),
            Self::Transport(_) => {
                "Could not reach the charging service. Check your connection.".to_string()
            }
            Self::MalformedPayload(_) | Self::Json(_) => {
                "The charging service returned an unexpected response.".to_string()
            }
            Self::Status { .. } | Self::InvalidUrl(_) => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// Result of joining a dock: the session parameters plus the link that
/// carries them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockTicket {
    pub params: JoinParams,
    pub session_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockJoinResponse {
    pub ably_token: String,
    pub channel_id: String,
    pub session_id: String,
    pub expires_at: String,
    #[serde(default)]
    pub session_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelledBooking {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct HttpBackendClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpBackendClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = Url::parse(base_url.trim())
            .map_err(|error| BackendError::InvalidUrl(format!("{base_url}: {error}")))?;

        Ok(Self {
            client,
            base_url,
            token: token.filter(|value| !value.trim().is_empty()),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, BackendError> {
        let token = self.token.as_deref().ok_or(BackendError::MissingToken)?;
        Ok(builder.bearer_auth(token))
    }

    fn url(&self, segments: &[&str]) -> Result<Url, BackendError> {
        endpoint_url(&self.base_url, segments)
            .ok_or_else(|| BackendError::InvalidUrl(self.base_url.to_string()))
    }

    fn send_json(&self, builder: RequestBuilder) -> Result<Value, BackendError> {
        let response = self.authorized(builder)?.send()?;
        let body = read_success_body(response)?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

impl BookingBackend for HttpBackendClient {
    fn join_dock(&self, dock_code: &str) -> Result<DockTicket, BackendError> {
        let payload = self.send_json(
            self.client
                .post(self.url(&["docks", "join"])?)
                .json(&json!({ "dockCode": dock_code })),
        )?;
        let response: DockJoinResponse = serde_json::from_value(payload)?;

        Ok(DockTicket {
            params: JoinParams {
                realtime_token: response.ably_token,
                channel_id: response.channel_id,
                session_id: response.session_id,
                expires_at: response.expires_at,
            },
            session_url: response.session_url,
        })
    }

    fn list_confirmed_bookings(&self) -> Result<Vec<BookingSummary>, BackendError> {
        let payload = self.send_json(
            self.client
                .get(self.url(&["bookings", "me"])?)
                .query(&[("status", "confirmed")]),
        )?;
        let bookings: Vec<BookingSummary> = serde_json::from_value(payload)?;

        Ok(bookings
            .into_iter()
            .filter(|booking| booking.status.eq_ignore_ascii_case("confirmed"))
            .collect())
    }

    fn bind_booking(
        &self,
        session_id: &str,
        request: &BindBookingRequest,
    ) -> Result<Booking, BackendError> {
        let url = self.url(&["sessions", session_id, "bind-booking"])?;
        let payload = self.send_json(self.client.post(url).json(request))?;

        Ok(parse_bind_response(&payload, request)?)
    }

    fn cancel_booking(&self, booking_id: &str) -> Result<CancelledBooking, BackendError> {
        let url = self.url(&["bookings", booking_id, "cancel"])?;
        let payload = self.send_json(self.client.post(url))?;

        Ok(serde_json::from_value(payload)?)
    }
}

fn read_success_body(response: Response) -> Result<String, BackendError> {
    let status = response.status();
    let body = response.text()?;

    if status.is_success() {
        return Ok(body);
    }

    Err(BackendError::Status {
        status: status.as_u16(),
        message: error_message_from_body(&body),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::{AUTH_REQUIRED_MESSAGE, BackendError, BookingBackend, HttpBackendClient};
    use crate::domain::booking::{BindBookingRequest, DEFAULT_SOC_START};
    use crate::domain::payload::ParseError;
    use crate::test_support::{CannedResponse, spawn_http_responder};

    fn request() -> BindBookingRequest {
        BindBookingRequest {
            booking_code: "BK-7".to_string(),
            soc_start: DEFAULT_SOC_START,
            target_soc: 80,
        }
    }

    fn client(base: &str, token: Option<&str>) -> HttpBackendClient {
        HttpBackendClient::new(base, token.map(ToString::to_string), Duration::from_secs(2))
            .expect("client should build")
    }

    #[test]
    fn binds_booking_with_bearer_token() {
        let responder = spawn_http_responder(vec![CannedResponse::json(
            200,
            r#"{"Id":"s-1","BookingId":"b-7","VehicleModelId":"vf8","SocStart":20,"TargetSoc":80}"#,
        )]);

        let booking = client(&responder.base_url(), Some("driver-1"))
            .bind_booking("s-1", &request())
            .expect("bind should succeed");

        assert_eq!(booking.booking_id, "b-7");
        assert_eq!(booking.target_soc, 80);

        let requests = responder.finish();
        assert!(requests[0].starts_with("POST /sessions/s-1/bind-booking"));
        assert!(
            requests[0]
                .to_ascii_lowercase()
                .contains("authorization: bearer driver-1")
        );
        assert!(requests[0].contains(r#""bookingCode":"BK-7""#));
        assert!(requests[0].contains(r#""socStart":20"#));
        assert!(requests[0].contains(r#""targetSoc":80"#));
    }

    #[test]
    fn missing_token_short_circuits_without_request() {
        let backend = client("http://127.0.0.1:9", None);

        let err = backend
            .bind_booking("s-1", &request())
            .expect_err("bind should fail");

        assert_matches!(err, BackendError::MissingToken);
        assert_eq!(err.user_message(), AUTH_REQUIRED_MESSAGE);
    }

    #[test]
    fn error_status_carries_body_message() {
        let responder = spawn_http_responder(vec![CannedResponse::json(
            409,
            r#"{"message":"Session already bound"}"#,
        )]);

        let err = client(&responder.base_url(), Some("driver-1"))
            .bind_booking("s-1", &request())
            .expect_err("bind should fail");

        assert_matches!(err, BackendError::Status { status: 409, .. });
        assert_eq!(err.user_message(), "Session already bound");
        responder.finish();
    }

    #[test]
    fn error_status_without_message_uses_generic_text() {
        let responder = spawn_http_responder(vec![CannedResponse::with_content_type(
            502,
            "text/html",
            "<html>bad gateway</html>",
        )]);

        let err = client(&responder.base_url(), Some("driver-1"))
            .bind_booking("s-1", &request())
            .expect_err("bind should fail");

        assert!(!err.user_message().is_empty());
        assert_matches!(err, BackendError::Status { message: None, .. });
        responder.finish();
    }

    #[test]
    fn success_without_ids_is_malformed() {
        let responder = spawn_http_responder(vec![CannedResponse::json(200, r#"{"Id":"s-1"}"#)]);

        let err = client(&responder.base_url(), Some("driver-1"))
            .bind_booking("s-1", &request())
            .expect_err("bind should fail");

        assert_matches!(
            err,
            BackendError::MalformedPayload(ParseError::MissingField("BookingId"))
        );
        responder.finish();
    }

    #[test]
    fn lists_only_confirmed_bookings() {
        let responder = spawn_http_responder(vec![CannedResponse::json(
            200,
            r#"[
                {"id":"b-1","code":"BK-1","status":"confirmed","vehicleModelId":"vf8"},
                {"id":"b-2","code":"BK-2","status":"cancelled"}
            ]"#,
        )]);

        let bookings = client(&responder.base_url(), Some("driver-1"))
            .list_confirmed_bookings()
            .expect("listing should succeed");

        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].code, "BK-1");

        let requests = responder.finish();
        assert!(requests[0].starts_with("GET /bookings/me?status=confirmed"));
    }

    #[test]
    fn accepts_numeric_booking_ids() {
        let responder = spawn_http_responder(vec![CannedResponse::json(
            200,
            r#"[{"id":17,"code":"BK-1","status":"confirmed"}]"#,
        )]);

        let bookings = client(&responder.base_url(), Some("driver-1"))
            .list_confirmed_bookings()
            .expect("numeric ids should be accepted");

        assert_eq!(bookings[0].id, "17");
        responder.finish();
    }

    #[test]
    fn escapes_ids_into_a_single_path_segment() {
        let responder = spawn_http_responder(vec![CannedResponse::json(
            200,
            r#"{"id":"a/b","status":"cancelled"}"#,
        )]);

        client(&responder.base_url(), Some("driver-1"))
            .cancel_booking("a/b")
            .expect("cancel should succeed");

        let requests = responder.finish();
        assert!(requests[0].starts_with("POST /bookings/a%2Fb/cancel "));
    }

    #[test]
    fn joins_dock_and_returns_ticket() {
        let responder = spawn_http_responder(vec![CannedResponse::json(
            200,
            r#"{"ablyToken":"tok","channelId":"session:9","sessionId":"9","expiresAt":"2026-10-19T12:00:00Z","sessionUrl":"http://localhost/x"}"#,
        )]);

        let ticket = client(&responder.base_url(), Some("driver-1"))
            .join_dock("DOCK-3")
            .expect("join should succeed");

        assert_eq!(ticket.params.channel_id, "session:9");
        assert_eq!(ticket.session_url.as_deref(), Some("http://localhost/x"));

        let requests = responder.finish();
        assert!(requests[0].contains(r#""dockCode":"DOCK-3""#));
    }

    #[test]
    fn unreachable_backend_is_a_transport_error() {
        let backend = client("http://127.0.0.1:1", Some("driver-1"));

        let err = backend
            .cancel_booking("b-1")
            .expect_err("cancel should fail");

        assert_matches!(err, BackendError::Transport(_));
    }
}
