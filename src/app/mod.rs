pub mod binding;
pub mod cli;
mod config;
pub mod controller;
mod error;
mod logging;
pub mod panel;
mod runtime;
pub mod services;
pub mod session_flow;

use clap::Parser;

pub use config::{ClientConfig, SandboxConfig};
pub use error::AppError;

pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = cli::Cli::parse();
    logging::init()?;

    let config = ClientConfig::from_env()?;

    tracing::info!(
        api_base_url = %config.api_base_url,
        has_token = config.api_token.is_some(),
        realtime_rest_url = %config.realtime_rest_url,
        realtime_sse_url = %config.realtime_sse_url,
        battery_capacity_kwh = config.battery_capacity_kwh,
        car_info_timeout_ms = config.car_info_timeout_ms,
        session_idle_timeout_ms = config.session_idle_timeout_ms,
        "client bootstrap initialized"
    );

    runtime::run_client(config, cli.command)
}

pub fn run_sandbox() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    logging::init()?;

    let config = SandboxConfig::from_env()?;

    tracing::info!(
        http_bind = %config.http_bind,
        db_path = %config.db_path,
        join_ttl_secs = config.join_ttl_secs,
        public_session_url = %config.public_session_url,
        "sandbox bootstrap initialized"
    );

    runtime::run_sandbox(config)
}
