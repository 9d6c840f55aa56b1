use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};

use crate::adapters::api::{ApiState, configure_routes};
use crate::adapters::backend_http::HttpBackendClient;
use crate::adapters::realtime_http::HttpRealtimeConnector;
use crate::adapters::realtime_script::ScriptedConnector;
use crate::app::cli::{ChargeArgs, Command};
use crate::app::config::{ClientConfig, SandboxConfig};
use crate::app::error::AppError;
use crate::app::services::{SqliteSandboxService, SystemClock};
use crate::app::session_flow::{self, ChargeRequest, FlowSettings};

pub fn run_client(config: ClientConfig, command: Command) -> Result<(), AppError> {
    let timeout = Duration::from_millis(config.http_timeout_ms);
    let backend = HttpBackendClient::new(&config.api_base_url, config.api_token.clone(), timeout)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match command {
        Command::Join { dock_code } => session_flow::join(&backend, &dock_code, &mut out),
        Command::Bookings => session_flow::list_bookings(&backend, &mut out),
        Command::Cancel { booking_id } => session_flow::cancel(&backend, &booking_id, &mut out),
        Command::Charge(args) => run_charge(&config, &backend, &args, &mut out),
    }
}

fn run_charge<W: Write>(
    config: &ClientConfig,
    backend: &HttpBackendClient,
    args: &ChargeArgs,
    out: &mut W,
) -> Result<(), AppError> {
    let settings = FlowSettings::from_config(config);
    let request = ChargeRequest {
        session_url: &args.session_url,
        booking_code: args.booking_code.as_deref(),
        target_soc: args.target_soc,
    };

    let report = match &args.script {
        Some(path) => {
            tracing::info!(script = %path.display(), "replaying charger from script");
            let connector = ScriptedConnector::from_file(&path.to_string_lossy())?;
            session_flow::charge(request, &connector, backend, &settings, out)?
        }
        None => {
            let connector = HttpRealtimeConnector::new(
                &config.realtime_rest_url,
                &config.realtime_sse_url,
                Duration::from_millis(config.http_timeout_ms),
            )?;
            session_flow::charge(request, &connector, backend, &settings, out)?
        }
    };

    tracing::info!(
        booking_id = %report.booking.booking_id,
        final_soc = report.final_soc,
        samples = report.samples,
        "charge flow finished"
    );
    Ok(())
}

pub fn run_sandbox(config: SandboxConfig) -> Result<(), AppError> {
    if let Some(parent) = std::path::Path::new(&config.db_path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(AppError::database_init)?;
    }

    let mut connection =
        crate::adapters::db::open_connection(&config.db_path).map_err(AppError::database_init)?;
    crate::adapters::db::run_migrations(&mut connection).map_err(AppError::database_init)?;

    let join_ttl = i64::try_from(config.join_ttl_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| AppError::config("SANDBOX_JOIN_TTL_SECS is too large"))?;
    let api_state = ApiState {
        sandbox: SqliteSandboxService::new(
            Arc::new(Mutex::new(connection)),
            Arc::new(SystemClock),
            join_ttl,
        ),
        public_session_url: config.public_session_url.clone(),
    };

    tracing::info!(bind = %config.http_bind, "sandbox http server starting");

    actix_web::rt::System::new()
        .block_on(async move {
            HttpServer::new(move || {
                let cors = Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600);

                App::new()
                    .wrap(cors)
                    .app_data(web::Data::new(api_state.clone()))
                    .configure(configure_routes)
            })
            .bind(&config.http_bind)?
            .run()
            .await
        })
        .map_err(AppError::runtime)
}
