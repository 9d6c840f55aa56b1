use thiserror::Error;

use crate::domain::booking::Booking;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Binding,
    Charging,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhaseError {
    #[error("session is already bound to booking {0}")]
    AlreadyCharging(String),
}

/// Phase flag plus the booking it was bound with.
///
/// `Binding -> Charging` happens once and never reverses; the booking is
/// only ever set by that transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingState {
    phase: SessionPhase,
    booking: Option<Booking>,
}

impl Default for BindingState {
    fn default() -> Self {
        Self::new()
    }
}

impl BindingState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Binding,
            booking: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn booking(&self) -> Option<&Booking> {
        self.booking.as_ref()
    }

    pub fn complete_binding(&mut self, booking: Booking) -> Result<&Booking, PhaseError> {
        if let Some(existing) = &self.booking {
            return Err(PhaseError::AlreadyCharging(existing.booking_id.clone()));
        }

        self.phase = SessionPhase::Charging;
        Ok(self.booking.insert(booking))
    }
}
