#[derive(Debug, Clone, PartialEq)]
pub struct BookingRecord {
    pub id: String,
    pub code: String,
    pub user_id: String,
    pub vehicle_model_id: Option<String>,
    pub station_name: Option<String>,
    pub starts_at: Option<String>,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBookingRecord {
    pub code: String,
    pub user_id: String,
    pub vehicle_model_id: Option<String>,
    pub station_name: Option<String>,
    pub starts_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DockSessionRecord {
    pub id: String,
    pub dock_code: String,
    pub user_id: String,
    pub channel_id: String,
    pub realtime_token: String,
    pub expires_at: String,
    pub booking_id: Option<String>,
    pub soc_start: Option<i64>,
    pub target_soc: Option<i64>,
    pub bound_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDockSessionRecord {
    pub dock_code: String,
    pub user_id: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindRecord<'a> {
    pub session_id: &'a str,
    pub booking_id: &'a str,
    pub soc_start: i64,
    pub target_soc: i64,
    pub bound_at: &'a str,
}

pub const STATUS_CONFIRMED: &str = "confirmed";
pub const STATUS_CANCELLED: &str = "cancelled";
pub const STATUS_IN_USE: &str = "in_use";
