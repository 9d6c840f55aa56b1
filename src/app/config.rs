use crate::app::AppError;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub realtime_rest_url: String,
    pub realtime_sse_url: String,
    pub battery_capacity_kwh: f64,
    pub http_timeout_ms: u64,
    pub car_info_timeout_ms: u64,
    pub session_idle_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub http_bind: String,
    pub db_path: String,
    pub join_ttl_secs: u64,
    pub public_session_url: String,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = non_empty(&lookup, "EV_API_BASE_URL")
            .ok_or_else(|| AppError::config("EV_API_BASE_URL is required"))?;

        let battery_capacity_kwh = parse_or_default(&lookup, "BATTERY_CAPACITY_KWH", 60.0_f64)?;
        if !battery_capacity_kwh.is_finite() || battery_capacity_kwh <= 0.0 {
            return Err(AppError::config("BATTERY_CAPACITY_KWH must be positive"));
        }

        Ok(Self {
            api_base_url,
            api_token: non_empty(&lookup, "EV_API_TOKEN"),
            realtime_rest_url: non_empty(&lookup, "REALTIME_REST_URL")
                .unwrap_or_else(|| "https://rest.ably.io".to_string()),
            realtime_sse_url: non_empty(&lookup, "REALTIME_SSE_URL")
                .unwrap_or_else(|| "https://realtime.ably.io".to_string()),
            battery_capacity_kwh,
            http_timeout_ms: parse_or_default(&lookup, "HTTP_TIMEOUT_MS", 10_000_u64)?,
            car_info_timeout_ms: parse_or_default(&lookup, "CAR_INFO_TIMEOUT_MS", 5_000_u64)?,
            session_idle_timeout_ms: parse_or_default(
                &lookup,
                "SESSION_IDLE_TIMEOUT_MS",
                600_000_u64,
            )?,
        })
    }
}

impl SandboxConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            http_bind: non_empty(&lookup, "SANDBOX_BIND")
                .unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            db_path: non_empty(&lookup, "SANDBOX_DB_PATH")
                .unwrap_or_else(|| "./data/ev_sandbox.db".to_string()),
            join_ttl_secs: parse_or_default(&lookup, "SANDBOX_JOIN_TTL_SECS", 900_u64)?,
            public_session_url: non_empty(&lookup, "SANDBOX_PUBLIC_URL")
                .unwrap_or_else(|| "http://localhost:3000/charging/session".to_string()),
        })
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}
