use std::io::Write;
use std::time::Duration;

use thiserror::Error;

use crate::adapters::backend_http::BookingBackend;
use crate::adapters::realtime::{RealtimeChannel, RealtimeError};
use crate::app::controller::SessionController;
use crate::domain::progress::{ChargingProgress, PanelEffect, ProgressError};
use crate::domain::realtime_event::{
    CarInformation, ChargingEvent, OutboundEvent, ProgressSample, RealtimeMessage, interpret,
};

#[derive(Debug, Error)]
pub enum PanelError {
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Realtime(#[from] RealtimeError),
    #[error("no charging update within {}s", .0.as_secs())]
    IdleTimeout(Duration),
    #[error("failed to render progress: {0}")]
    Output(#[from] std::io::Error),
}

/// Terminal rendition of a running charging session.
pub struct ChargingPanel<W: Write> {
    progress: ChargingProgress,
    target_soc: u8,
    out: W,
}

impl<W: Write> ChargingPanel<W> {
    pub fn new(target_soc: u8, out: W) -> Self {
        Self {
            progress: ChargingProgress::new(),
            target_soc,
            out,
        }
    }

    pub fn progress(&self) -> &ChargingProgress {
        &self.progress
    }

    /// Seeds the panel with what the binding step learned about the car.
    pub fn seed(&mut self, info: CarInformation) {
        self.progress.apply(ChargingEvent::CarInformation(info));
    }

    pub fn start<C: RealtimeChannel>(
        &mut self,
        controller: &SessionController<C>,
    ) -> Result<(), PanelError> {
        if !self.progress.can_start() {
            let error = if self.progress.is_completed() {
                ProgressError::AlreadyCompleted
            } else {
                ProgressError::AlreadyStarted
            };
            return Err(error.into());
        }

        controller.publish(&OutboundEvent::StartSession {
            target_soc: self.target_soc,
        })?;
        self.progress.mark_start_requested()?;

        tracing::info!(target_soc = self.target_soc, "charging start requested");
        writeln!(self.out, "charging started, target {}%", self.target_soc)?;
        Ok(())
    }

    /// Applies one message and renders what changed.
    pub fn handle(&mut self, message: &RealtimeMessage) -> Result<Vec<PanelEffect>, PanelError> {
        let event = match interpret(message) {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(
                    event = %message.name,
                    error = %error,
                    "ignoring malformed realtime message"
                );
                return Ok(Vec::new());
            }
        };

        if self.progress.is_completed() {
            tracing::debug!(event = %message.name, "message after completion ignored");
            return Ok(Vec::new());
        }

        match &event {
            ChargingEvent::SocUpdate(sample) => {
                writeln!(self.out, "{}", render_sample(sample, self.target_soc))?;
            }
            ChargingEvent::CarInformation(info) => {
                tracing::debug!(soc = info.soc, "car information refreshed");
            }
            ChargingEvent::Unknown { name } => {
                tracing::debug!(event = %name, "unknown realtime event ignored");
            }
            ChargingEvent::ChargingComplete | ChargingEvent::ChargingError { .. } => {}
        }

        let effects = self.progress.apply(event);
        for effect in &effects {
            if let PanelEffect::ShowError(text) = effect {
                tracing::warn!(message = %text, "charger reported an error");
                writeln!(self.out, "error: {text}")?;
            }
        }
        Ok(effects)
    }

    /// Follows the session until the charger reports completion.
    ///
    /// Errors from the charger are shown and the panel keeps listening. The
    /// run ends with `IdleTimeout` when the channel stays quiet too long.
    pub fn run<C, B>(
        &mut self,
        controller: &mut SessionController<C>,
        backend: &B,
        idle_timeout: Duration,
    ) -> Result<(), PanelError>
    where
        C: RealtimeChannel,
        B: BookingBackend,
    {
        while !self.progress.is_completed() {
            let Some(message) = controller.next_message(idle_timeout)? else {
                return Err(PanelError::IdleTimeout(idle_timeout));
            };

            for effect in self.handle(&message)? {
                match effect {
                    PanelEffect::Navigate(route) => {
                        let soc = self
                            .progress
                            .current_soc()
                            .map(|soc| format!(" at {soc}%"))
                            .unwrap_or_default();
                        writeln!(self.out, "charging complete{soc}, continue at {route}")?;
                    }
                    PanelEffect::RefreshBookings => match backend.list_confirmed_bookings() {
                        Ok(bookings) => {
                            let remaining = bookings.len();
                            writeln!(self.out, "{remaining} confirmed booking(s) remaining")?;
                        }
                        Err(error) => {
                            tracing::warn!(error = %error, "failed to refresh bookings");
                        }
                    },
                    PanelEffect::ShowError(_) => {}
                }
            }
        }

        tracing::info!(
            samples = self.progress.samples().len(),
            final_soc = self.progress.current_soc(),
            "charging session completed"
        );
        Ok(())
    }
}

fn render_sample(sample: &ProgressSample, target_soc: u8) -> String {
    let power = sample
        .power_kw
        .map(|power| format!("{power:.1} kW"))
        .unwrap_or_else(|| "-- kW".to_string());

    format!(
        "[{}] soc {:>3}% / {}% | {} | {:.2} kWh",
        sample.timestamp.format("%H:%M:%S"),
        sample.soc,
        target_soc,
        power,
        sample.energy_kwh
    )
}
