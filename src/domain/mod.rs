pub mod booking;
pub mod estimate;
pub mod join_params;
pub mod models;
pub mod payload;
pub mod phase;
pub mod progress;
pub mod realtime_event;
