use std::time::{Duration, Instant};

use thiserror::Error;

use crate::adapters::backend_http::{BackendError, BookingBackend};
use crate::adapters::realtime::{RealtimeChannel, RealtimeError};
use crate::app::controller::SessionController;
use crate::domain::booking::{BindBookingRequest, Booking, BookingSummary, DEFAULT_SOC_START};
use crate::domain::estimate::{CostEstimate, RATE_VND_PER_KWH, estimate_cost};
use crate::domain::realtime_event::{
    CAR_INFORMATION, CarInformation, ChargingEvent, OutboundEvent, interpret,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    Success(Booking),
    Failure { message: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("no confirmed bookings to bind")]
    NoConfirmedBookings,
    #[error("booking {0} is not among your confirmed bookings")]
    UnknownBooking(String),
    #[error("target state of charge must be between 0 and 100, got {0}")]
    TargetOutOfRange(u8),
}

/// Booking selection, car lookup and bind submission for one session.
#[derive(Debug)]
pub struct BindingForm<'a, B: BookingBackend> {
    backend: &'a B,
    bookings: Vec<BookingSummary>,
    selected: Option<usize>,
    target_soc: u8,
    car_information: Option<CarInformation>,
}

impl<'a, B: BookingBackend> BindingForm<'a, B> {
    /// Fetches the confirmed bookings once; later calls reuse the list.
    pub fn load(backend: &'a B) -> Result<Self, BackendError> {
        let bookings = backend.list_confirmed_bookings()?;
        tracing::debug!(count = bookings.len(), "confirmed bookings loaded");

        Ok(Self {
            backend,
            bookings,
            selected: None,
            target_soc: 80,
            car_information: None,
        })
    }

    pub fn bookings(&self) -> &[BookingSummary] {
        &self.bookings
    }

    pub fn selected(&self) -> Option<&BookingSummary> {
        self.selected.and_then(|index| self.bookings.get(index))
    }

    pub fn car_information(&self) -> Option<CarInformation> {
        self.car_information
    }

    pub fn target_soc(&self) -> u8 {
        self.target_soc
    }

    /// Picks the booking by code, or the first one when no code is given.
    pub fn select(&mut self, booking_code: Option<&str>) -> Result<&BookingSummary, FormError> {
        let index = match booking_code {
            Some(code) => self
                .bookings
                .iter()
                .position(|booking| booking.code == code)
                .ok_or_else(|| FormError::UnknownBooking(code.to_string()))?,
            None if self.bookings.is_empty() => return Err(FormError::NoConfirmedBookings),
            None => 0,
        };

        self.selected = Some(index);
        Ok(&self.bookings[index])
    }

    pub fn set_target_soc(&mut self, target_soc: u8) -> Result<(), FormError> {
        if target_soc > 100 {
            return Err(FormError::TargetOutOfRange(target_soc));
        }
        self.target_soc = target_soc;
        Ok(())
    }

    /// Asks the charger for the plugged-in car and waits for its answer.
    ///
    /// Anything else that arrives meanwhile is handed back to the controller
    /// in arrival order. `Ok(None)` means the wait ran out.
    pub fn request_car_information<C: RealtimeChannel>(
        &mut self,
        controller: &mut SessionController<C>,
        timeout: Duration,
    ) -> Result<Option<CarInformation>, RealtimeError> {
        controller.publish(&OutboundEvent::LoadCarInformation {
            session_id: controller.params().session_id.clone(),
        })?;

        let deadline = Instant::now() + timeout;
        let mut held = Vec::new();

        let outcome = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break Ok(None);
            }

            let message = match controller.next_message(remaining) {
                Ok(Some(message)) => message,
                Ok(None) => break Ok(None),
                Err(error) => break Err(error),
            };

            if message.name != CAR_INFORMATION {
                held.push(message);
                continue;
            }

            match interpret(&message) {
                Ok(ChargingEvent::CarInformation(info)) => break Ok(Some(info)),
                Ok(_) => held.push(message),
                Err(error) => {
                    tracing::warn!(error = %error, "ignoring malformed car information");
                }
            }
        };

        controller.requeue_front(held);
        let found = outcome?;

        match found {
            Some(info) => {
                tracing::info!(
                    soc = info.soc,
                    battery_capacity_kwh = info.battery_capacity_kwh,
                    "car information received"
                );
                self.car_information = Some(info);
            }
            None => tracing::warn!(
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "no car information before timeout"
            ),
        }

        Ok(found)
    }

    /// Estimate from the car's current level, or the default start level when
    /// the car never reported one.
    pub fn estimate(&self, default_capacity_kwh: f64) -> Option<CostEstimate> {
        let current_soc = self
            .car_information
            .map(|info| info.soc)
            .unwrap_or(DEFAULT_SOC_START);
        let capacity = self
            .car_information
            .and_then(|info| info.battery_capacity_kwh)
            .unwrap_or(default_capacity_kwh);

        estimate_cost(current_soc, self.target_soc, capacity, RATE_VND_PER_KWH)
    }

    pub fn submit(&self, session_id: &str) -> BindOutcome {
        let Some(selected) = self.selected() else {
            return BindOutcome::Failure {
                message: "Select a booking first.".to_string(),
            };
        };
        if self.target_soc > 100 {
            return BindOutcome::Failure {
                message: FormError::TargetOutOfRange(self.target_soc).to_string(),
            };
        }

        let request = BindBookingRequest {
            booking_code: selected.code.clone(),
            soc_start: DEFAULT_SOC_START,
            target_soc: self.target_soc,
        };

        match self.backend.bind_booking(session_id, &request) {
            Ok(booking) => {
                tracing::info!(
                    session_id,
                    booking_code = %request.booking_code,
                    booking_id = %booking.booking_id,
                    "booking bound"
                );
                BindOutcome::Success(booking)
            }
            Err(error) => {
                tracing::warn!(
                    session_id,
                    booking_code = %request.booking_code,
                    error = %error,
                    "bind booking failed"
                );
                BindOutcome::Failure {
                    message: error.user_message(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::{BindOutcome, BindingForm, FormError};
    use crate::adapters::backend_http::AUTH_REQUIRED_MESSAGE;
    use crate::adapters::realtime::{
        RealtimeChannel, RealtimeConnection, RealtimeConnector, RealtimeError,
    };
    use crate::adapters::realtime_script::ScriptedConnector;
    use crate::app::controller::SessionController;
    use crate::domain::phase::SessionPhase;
    use crate::domain::realtime_event::{CarInformation, OutboundEvent, RealtimeMessage};
    use crate::test_support::{BindReply, FakeBackend, summary};

    const URL: &str = "https://app.example.com/charging/session?ablyToken=tok&channelId=session:1&sessionId=s-1&expiresAt=2099-01-01T00:00:00Z";

    /// Delivers two messages, then the stream ends.
    struct HangingUpConnector;

    #[derive(Debug)]
    struct SilentChannel;

    impl RealtimeChannel for SilentChannel {
        fn publish(&self, _event: &OutboundEvent) -> Result<(), RealtimeError> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    impl RealtimeConnector for HangingUpConnector {
        type Channel = SilentChannel;

        fn connect(
            &self,
            _token: &str,
            channel_id: &str,
        ) -> Result<RealtimeConnection<SilentChannel>, RealtimeError> {
            let (sender, receiver) = mpsc::channel();
            for (name, data) in [
                ("soc_update", json!({"soc": 19})),
                ("charging_error", json!("late")),
            ] {
                sender
                    .send(RealtimeMessage::new(name, data))
                    .map_err(|_| RealtimeError::Closed)?;
            }
            Ok(RealtimeConnection::new(SilentChannel, receiver, channel_id))
        }
    }

    #[test]
    fn selects_first_booking_by_default() {
        let backend =
            FakeBackend::with_bookings(vec![summary("b-1", "BK-1"), summary("b-2", "BK-2")]);
        let mut form = BindingForm::load(&backend).expect("load should succeed");

        let selected = form.select(None).expect("select should succeed");

        assert_eq!(selected.code, "BK-1");
    }

    #[test]
    fn rejects_unknown_booking_code() {
        let backend = FakeBackend::with_bookings(vec![summary("b-1", "BK-1")]);
        let mut form = BindingForm::load(&backend).expect("load should succeed");

        assert_eq!(
            form.select(Some("BK-9")),
            Err(FormError::UnknownBooking("BK-9".to_string()))
        );
        assert_eq!(form.selected(), None);
    }

    #[test]
    fn rejects_empty_booking_list() {
        let backend = FakeBackend::with_bookings(Vec::new());
        let mut form = BindingForm::load(&backend).expect("load should succeed");

        assert_eq!(form.select(None), Err(FormError::NoConfirmedBookings));
    }

    #[test]
    fn rejects_target_above_one_hundred() {
        let backend = FakeBackend::with_bookings(vec![summary("b-1", "BK-1")]);
        let mut form = BindingForm::load(&backend).expect("load should succeed");

        assert_eq!(form.set_target_soc(101), Err(FormError::TargetOutOfRange(101)));
        assert_eq!(form.target_soc(), 80);
    }

    #[test]
    fn waits_for_car_information_and_keeps_other_messages() {
        let connector = ScriptedConnector::from_value(json!({
            "reactions": {
                "load_car_information": [
                    {"ok": {"name": "soc_update", "data": {"soc": 19}}},
                    {"ok": {"name": "car_information", "data": {"soc": 35, "batteryCapacity": 82}}},
                    {"ok": {"name": "charging_error", "data": {"message": "late"}}}
                ]
            }
        }))
        .expect("script should load");
        let mut controller =
            SessionController::open_url(URL, &connector).expect("open should succeed");
        let backend = FakeBackend::with_bookings(vec![summary("b-1", "BK-1")]);
        let mut form = BindingForm::load(&backend).expect("load should succeed");

        let info = form
            .request_car_information(&mut controller, Duration::from_millis(200))
            .expect("request should succeed");

        assert_eq!(
            info,
            Some(CarInformation {
                soc: 35,
                battery_capacity_kwh: Some(82.0)
            })
        );
        assert_eq!(
            connector.published(),
            vec![OutboundEvent::LoadCarInformation {
                session_id: "s-1".to_string()
            }]
        );

        let wait = Duration::from_millis(50);
        let first = controller.next_message(wait).expect("recv should succeed");
        let second = controller.next_message(wait).expect("recv should succeed");
        assert_eq!(first.map(|m| m.name), Some("soc_update".to_string()));
        assert_eq!(second.map(|m| m.name), Some("charging_error".to_string()));
    }

    #[test]
    fn stream_failure_while_waiting_keeps_held_messages() {
        let mut controller =
            SessionController::open_url(URL, &HangingUpConnector).expect("open should succeed");
        let backend = FakeBackend::with_bookings(vec![summary("b-1", "BK-1")]);
        let mut form = BindingForm::load(&backend).expect("load should succeed");

        let result = form.request_car_information(&mut controller, Duration::from_secs(1));

        assert_matches!(result, Err(RealtimeError::Closed));
        let wait = Duration::from_millis(10);
        let first = controller.next_message(wait).expect("held message");
        let second = controller.next_message(wait).expect("held message");
        assert_eq!(first.map(|m| m.name), Some("soc_update".to_string()));
        assert_eq!(second.map(|m| m.name), Some("charging_error".to_string()));
        assert_matches!(controller.next_message(wait), Err(RealtimeError::Closed));
    }

    #[test]
    fn car_information_timeout_is_not_an_error() {
        let connector = ScriptedConnector::from_file(&format!(
            "{}/testdata/realtime/no_car_information.json",
            env!("CARGO_MANIFEST_DIR")
        ))
        .expect("script should load");
        let mut controller =
            SessionController::open_url(URL, &connector).expect("open should succeed");
        let backend = FakeBackend::with_bookings(vec![summary("b-1", "BK-1")]);
        let mut form = BindingForm::load(&backend).expect("load should succeed");

        let info = form
            .request_car_information(&mut controller, Duration::from_millis(50))
            .expect("request should succeed");

        assert_eq!(info, None);
        let held = controller
            .next_message(Duration::from_millis(10))
            .expect("recv should succeed");
        assert_eq!(held.map(|m| m.name), Some("heartbeat".to_string()));
    }

    #[test]
    fn estimate_uses_car_capacity_then_default() {
        let backend = FakeBackend::with_bookings(vec![summary("b-1", "BK-1")]);
        let mut form = BindingForm::load(&backend).expect("load should succeed");
        form.set_target_soc(80).expect("target should be valid");

        let estimate = form.estimate(60.0).expect("estimate should exist");
        assert!((estimate.price_vnd - 144_000.0).abs() < 1e-6);

        form.set_target_soc(20).expect("target should be valid");
        assert_eq!(form.estimate(60.0), None);
    }

    #[test]
    fn submit_sends_fixed_start_soc() {
        let backend = FakeBackend::with_bookings(vec![summary("b-1", "BK-1")]);
        let mut form = BindingForm::load(&backend).expect("load should succeed");
        form.select(None).expect("select should succeed");
        form.set_target_soc(90).expect("target should be valid");

        let outcome = form.submit("s-1");

        let BindOutcome::Success(booking) = outcome else {
            panic!("expected successful bind");
        };
        assert_eq!(booking.target_soc, 90);
        let requests = backend.bind_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "s-1");
        assert_eq!(requests[0].1.booking_code, "BK-1");
        assert_eq!(requests[0].1.soc_start, 20);
    }

    #[test]
    fn failed_bind_keeps_phase_and_reports_message() {
        let connector = ScriptedConnector::from_value(json!({})).expect("script should load");
        let controller =
            SessionController::open_url(URL, &connector).expect("open should succeed");
        let backend = FakeBackend::with_bookings(vec![summary("b-1", "BK-1")])
            .replying(BindReply::Status(409, None));
        let mut form = BindingForm::load(&backend).expect("load should succeed");
        form.select(None).expect("select should succeed");

        let outcome = form.submit("s-1");

        assert_matches!(outcome, BindOutcome::Failure { ref message } if !message.is_empty());
        assert_eq!(controller.phase(), SessionPhase::Binding);
    }

    #[test]
    fn missing_token_fails_with_static_message() {
        let backend = FakeBackend::with_bookings(vec![summary("b-1", "BK-1")])
            .replying(BindReply::MissingToken);
        let mut form = BindingForm::load(&backend).expect("load should succeed");
        form.select(None).expect("select should succeed");

        assert_eq!(
            form.submit("s-1"),
            BindOutcome::Failure {
                message: AUTH_REQUIRED_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn submit_without_selection_fails() {
        let backend = FakeBackend::with_bookings(vec![summary("b-1", "BK-1")]);
        let form = BindingForm::load(&backend).expect("load should succeed");

        assert_matches!(form.submit("s-1"), BindOutcome::Failure { .. });
        assert!(backend.bind_requests().is_empty());
    }
}
