use chrono::{DateTime, Utc};
use reqwest::Url;
use thiserror::Error;

pub const TOKEN_PARAM: &str = "ablyToken";
pub const CHANNEL_PARAM: &str = "channelId";
pub const SESSION_PARAM: &str = "sessionId";
pub const EXPIRES_PARAM: &str = "expiresAt";

const REQUIRED_PARAMS: [&str; 4] = [TOKEN_PARAM, CHANNEL_PARAM, SESSION_PARAM, EXPIRES_PARAM];

/// Parameters carried from the dock join step to the binding step.
///
/// All four values are opaque to the client. They are only checked for
/// presence and live as long as the session flow that parsed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinParams {
    pub realtime_token: String,
    pub channel_id: String,
    pub session_id: String,
    pub expires_at: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("session not found: missing query parameter {0}")]
    NotFound(&'static str),
    #[error("session not found: invalid session url")]
    InvalidUrl,
}

pub fn parse_join_params(raw_url: &str) -> Result<JoinParams, JoinError> {
    let url = Url::parse(raw_url.trim()).map_err(|_| JoinError::InvalidUrl)?;

    let mut values: [Option<String>; 4] = Default::default();
    for (key, value) in url.query_pairs() {
        if let Some(slot) = REQUIRED_PARAMS.iter().position(|name| *name == key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() && values[slot].is_none() {
                values[slot] = Some(trimmed.to_string());
            }
        }
    }

    let [token, channel, session, expires] = values;

    Ok(JoinParams {
        realtime_token: token.ok_or(JoinError::NotFound(TOKEN_PARAM))?,
        channel_id: channel.ok_or(JoinError::NotFound(CHANNEL_PARAM))?,
        session_id: session.ok_or(JoinError::NotFound(SESSION_PARAM))?,
        expires_at: expires.ok_or(JoinError::NotFound(EXPIRES_PARAM))?,
    })
}

impl JoinParams {
    /// Builds the session link handed out by the dock join step.
    pub fn to_session_url(&self, base: &str) -> Result<String, JoinError> {
        let mut url = Url::parse(base).map_err(|_| JoinError::InvalidUrl)?;
        url.query_pairs_mut()
            .append_pair(TOKEN_PARAM, &self.realtime_token)
            .append_pair(CHANNEL_PARAM, &self.channel_id)
            .append_pair(SESSION_PARAM, &self.session_id)
            .append_pair(EXPIRES_PARAM, &self.expires_at);
        Ok(url.to_string())
    }

    /// `Some(true)` when `expiresAt` is an RFC 3339 instant before `now`,
    /// `None` when it is not a recognizable timestamp.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> Option<bool> {
        DateTime::parse_from_rfc3339(&self.expires_at)
            .ok()
            .map(|expires_at| expires_at.with_timezone(&Utc) < now)
    }
}
