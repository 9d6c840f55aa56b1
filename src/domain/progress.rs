use thiserror::Error;

use crate::domain::realtime_event::{CarInformation, ChargingEvent, ProgressSample};

pub const SUCCESS_ROUTE: &str = "/charging/success";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressState {
    NotStarted,
    Started,
    Completed,
    Errored { message: String, started: bool },
}

/// Side effects the caller must perform after applying an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEffect {
    Navigate(&'static str),
    RefreshBookings,
    ShowError(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgressError {
    #[error("charging has already started")]
    AlreadyStarted,
    #[error("charging has already completed")]
    AlreadyCompleted,
}

/// Progress of one charging session, driven only by named events.
#[derive(Debug, Clone)]
pub struct ChargingProgress {
    state: ProgressState,
    samples: Vec<ProgressSample>,
    current_soc: Option<u8>,
    car_information: Option<CarInformation>,
    last_error: Option<String>,
}

impl Default for ChargingProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ChargingProgress {
    pub fn new() -> Self {
        Self {
            state: ProgressState::NotStarted,
            samples: Vec::new(),
            current_soc: None,
            car_information: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn samples(&self) -> &[ProgressSample] {
        &self.samples
    }

    pub fn current_soc(&self) -> Option<u8> {
        self.current_soc
    }

    pub fn car_information(&self) -> Option<CarInformation> {
        self.car_information
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn can_start(&self) -> bool {
        matches!(
            self.state,
            ProgressState::NotStarted | ProgressState::Errored { started: false, .. }
        )
    }

    pub fn is_completed(&self) -> bool {
        self.state == ProgressState::Completed
    }

    /// Records that `start_session` was published.
    pub fn mark_start_requested(&mut self) -> Result<(), ProgressError> {
        match self.state {
            ProgressState::Completed => Err(ProgressError::AlreadyCompleted),
            _ if !self.can_start() => Err(ProgressError::AlreadyStarted),
            _ => {
                self.state = ProgressState::Started;
                Ok(())
            }
        }
    }

    pub fn apply(&mut self, event: ChargingEvent) -> Vec<PanelEffect> {
        if self.is_completed() {
            return Vec::new();
        }

        match event {
            ChargingEvent::CarInformation(info) => {
                if !self.has_started() {
                    self.current_soc = Some(info.soc);
                }
                self.car_information = Some(info);
                Vec::new()
            }
            ChargingEvent::SocUpdate(sample) => {
                self.current_soc = Some(sample.soc);
                self.samples.push(sample);
                self.state = ProgressState::Started;
                Vec::new()
            }
            ChargingEvent::ChargingComplete => {
                self.state = ProgressState::Completed;
                vec![
                    PanelEffect::Navigate(SUCCESS_ROUTE),
                    PanelEffect::RefreshBookings,
                ]
            }
            ChargingEvent::ChargingError { message } => {
                let started = self.has_started();
                self.last_error = Some(message.clone());
                self.state = ProgressState::Errored {
                    message: message.clone(),
                    started,
                };
                vec![PanelEffect::ShowError(message)]
            }
            ChargingEvent::Unknown { .. } => Vec::new(),
        }
    }

    fn has_started(&self) -> bool {
        match &self.state {
            ProgressState::NotStarted => false,
            ProgressState::Started | ProgressState::Completed => true,
            ProgressState::Errored { started, .. } => *started,
        }
    }
}
