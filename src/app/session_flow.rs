use std::io::Write;
use std::time::Duration;

use crate::adapters::backend_http::BookingBackend;
use crate::adapters::realtime::RealtimeConnector;
use crate::app::AppError;
use crate::app::binding::{BindOutcome, BindingForm};
use crate::app::config::ClientConfig;
use crate::app::controller::SessionController;
use crate::app::panel::ChargingPanel;
use crate::domain::booking::Booking;
use crate::domain::join_params::{CHANNEL_PARAM, EXPIRES_PARAM, SESSION_PARAM, TOKEN_PARAM};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowSettings {
    pub battery_capacity_kwh: f64,
    pub car_info_timeout: Duration,
    pub idle_timeout: Duration,
}

impl FlowSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            battery_capacity_kwh: config.battery_capacity_kwh,
            car_info_timeout: Duration::from_millis(config.car_info_timeout_ms),
            idle_timeout: Duration::from_millis(config.session_idle_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChargeRequest<'a> {
    pub session_url: &'a str,
    pub booking_code: Option<&'a str>,
    pub target_soc: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeReport {
    pub booking: Booking,
    pub final_soc: Option<u8>,
    pub samples: usize,
}

/// Join, bind and charge in one go, the way a driver walks through it.
pub fn charge<K, B, W>(
    request: ChargeRequest<'_>,
    connector: &K,
    backend: &B,
    settings: &FlowSettings,
    out: &mut W,
) -> Result<ChargeReport, AppError>
where
    K: RealtimeConnector,
    B: BookingBackend,
    W: Write,
{
    let mut controller = SessionController::open_url(request.session_url, connector)?;
    let session_id = controller.params().session_id.clone();

    let mut form = BindingForm::load(backend)?;
    let selected = form.select(request.booking_code)?;
    writeln!(out, "booking {} ({})", selected.code, selected.id)?;
    form.set_target_soc(request.target_soc)?;

    match form.request_car_information(&mut controller, settings.car_info_timeout)? {
        Some(info) => writeln!(out, "car at {}%", info.soc)?,
        None => writeln!(out, "car did not report its charge level")?,
    }

    match form.estimate(settings.battery_capacity_kwh) {
        Some(estimate) => writeln!(
            out,
            "estimate to {}%: {:.2} kWh, {:.0} VND",
            form.target_soc(),
            estimate.energy_needed_kwh,
            estimate.price_vnd
        )?,
        None => writeln!(out, "no estimate: target is not above the current level")?,
    }

    let booking = match form.submit(&session_id) {
        BindOutcome::Success(booking) => booking,
        BindOutcome::Failure { message } => {
            writeln!(out, "bind failed: {message}")?;
            return Err(AppError::Bind(message));
        }
    };
    let car_information = form.car_information();

    let booking = controller.complete_binding(booking)?.clone();
    writeln!(
        out,
        "session {} bound to booking {}",
        booking.id, booking.booking_id
    )?;

    let mut panel = ChargingPanel::new(booking.target_soc, &mut *out);
    if let Some(info) = car_information {
        panel.seed(info);
    }
    panel.start(&controller)?;
    panel.run(&mut controller, backend, settings.idle_timeout)?;

    let progress = panel.progress();
    let report = ChargeReport {
        final_soc: progress.current_soc(),
        samples: progress.samples().len(),
        booking,
    };

    controller.close();
    Ok(report)
}

pub fn join<B: BookingBackend, W: Write>(
    backend: &B,
    dock_code: &str,
    out: &mut W,
) -> Result<(), AppError> {
    let ticket = backend.join_dock(dock_code)?;
    tracing::info!(
        dock_code,
        session_id = %ticket.params.session_id,
        "dock joined"
    );

    match &ticket.session_url {
        Some(url) => writeln!(out, "{url}")?,
        None => {
            let params = &ticket.params;
            writeln!(out, "{TOKEN_PARAM}={}", params.realtime_token)?;
            writeln!(out, "{CHANNEL_PARAM}={}", params.channel_id)?;
            writeln!(out, "{SESSION_PARAM}={}", params.session_id)?;
            writeln!(out, "{EXPIRES_PARAM}={}", params.expires_at)?;
        }
    }
    Ok(())
}

pub fn list_bookings<B: BookingBackend, W: Write>(
    backend: &B,
    out: &mut W,
) -> Result<(), AppError> {
    let bookings = backend.list_confirmed_bookings()?;
    if bookings.is_empty() {
        writeln!(out, "no confirmed bookings")?;
        return Ok(());
    }

    for booking in bookings {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            booking.code,
            booking.id,
            booking.vehicle_model_id.as_deref().unwrap_or("-"),
            booking.station_name.as_deref().unwrap_or("-"),
            booking.starts_at.as_deref().unwrap_or("-")
        )?;
    }
    Ok(())
}

pub fn cancel<B: BookingBackend, W: Write>(
    backend: &B,
    booking_id: &str,
    out: &mut W,
) -> Result<(), AppError> {
    let cancelled = backend.cancel_booking(booking_id)?;
    tracing::info!(booking_id = %cancelled.id, status = %cancelled.status, "booking cancelled");
    writeln!(out, "booking {} is now {}", cancelled.id, cancelled.status)?;
    Ok(())
}
