use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;

use crate::adapters::realtime::{
    RealtimeChannel, RealtimeConnection, RealtimeConnector, RealtimeError,
};
use crate::app::AppError;
use crate::domain::booking::Booking;
use crate::domain::join_params::{JoinParams, parse_join_params};
use crate::domain::phase::{BindingState, PhaseError, SessionPhase};
use crate::domain::realtime_event::{OutboundEvent, RealtimeMessage};

/// Owns the realtime connection of one session together with its phase.
///
/// The connection is the only subscriber on the channel and is closed when
/// the controller goes away.
#[derive(Debug)]
pub struct SessionController<C: RealtimeChannel> {
    params: JoinParams,
    connection: RealtimeConnection<C>,
    binding: BindingState,
    backlog: VecDeque<RealtimeMessage>,
}

impl<C: RealtimeChannel> SessionController<C> {
    /// Parses the session link and connects. Nothing is dialed when a
    /// parameter is missing.
    pub fn open_url<K>(session_url: &str, connector: &K) -> Result<Self, AppError>
    where
        K: RealtimeConnector<Channel = C>,
    {
        let params = parse_join_params(session_url)?;
        Self::open(params, connector)
    }

    pub fn open<K>(params: JoinParams, connector: &K) -> Result<Self, AppError>
    where
        K: RealtimeConnector<Channel = C>,
    {
        if params.is_expired_at(Utc::now()) == Some(true) {
            tracing::warn!(
                session_id = %params.session_id,
                expires_at = %params.expires_at,
                "session link has expired, continuing anyway"
            );
        }

        let connection = connector.connect(&params.realtime_token, &params.channel_id)?;

        tracing::info!(
            session_id = %params.session_id,
            channel_id = %params.channel_id,
            "session opened"
        );

        Ok(Self {
            params,
            connection,
            binding: BindingState::new(),
            backlog: VecDeque::new(),
        })
    }

    pub fn params(&self) -> &JoinParams {
        &self.params
    }

    pub fn phase(&self) -> SessionPhase {
        self.binding.phase()
    }

    pub fn booking(&self) -> Option<&Booking> {
        self.binding.booking()
    }

    pub fn complete_binding(&mut self, booking: Booking) -> Result<&Booking, PhaseError> {
        let booking = self.binding.complete_binding(booking)?;
        tracing::info!(
            session_id = %self.params.session_id,
            booking_id = %booking.booking_id,
            target_soc = booking.target_soc,
            "session switched to charging"
        );
        Ok(booking)
    }

    pub fn publish(&self, event: &OutboundEvent) -> Result<(), RealtimeError> {
        self.connection.publish(event)
    }

    /// Held-back messages come first, then the live channel.
    pub fn next_message(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<RealtimeMessage>, RealtimeError> {
        if let Some(message) = self.backlog.pop_front() {
            return Ok(Some(message));
        }
        self.connection.recv_timeout(timeout)
    }

    /// Puts messages back in front of anything still pending, keeping their
    /// order.
    pub fn requeue_front(&mut self, messages: Vec<RealtimeMessage>) {
        for message in messages.into_iter().rev() {
            self.backlog.push_front(message);
        }
    }

    pub fn close(&mut self) {
        self.connection.close();
    }
}
