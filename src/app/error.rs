use thiserror::Error;

use crate::adapters::backend_http::BackendError;
use crate::adapters::realtime::RealtimeError;
use crate::app::binding::FormError;
use crate::app::panel::PanelError;
use crate::domain::join_params::JoinError;
use crate::domain::phase::PhaseError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to initialize database: {0}")]
    DatabaseInit(String),
    #[error("runtime failure: {0}")]
    Runtime(String),
    #[error(transparent)]
    Join(#[from] JoinError),
    #[error("realtime connection failed: {0}")]
    Realtime(#[from] RealtimeError),
    #[error("{}", .0.user_message())]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Form(#[from] FormError),
    #[error("binding failed: {0}")]
    Bind(String),
    #[error(transparent)]
    Phase(#[from] PhaseError),
    #[error("charging session failed: {0}")]
    Panel(#[from] PanelError),
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl AppError {
    pub fn logging_init<E: std::fmt::Display>(error: E) -> Self {
        Self::LoggingInit(error.to_string())
    }

    pub fn config<E: std::fmt::Display>(error: E) -> Self {
        Self::Config(error.to_string())
    }

    pub fn database_init<E: std::fmt::Display>(error: E) -> Self {
        Self::DatabaseInit(error.to_string())
    }

    pub fn runtime<E: std::fmt::Display>(error: E) -> Self {
        Self::Runtime(error.to_string())
    }
}
