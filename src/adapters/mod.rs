pub mod api;
pub mod backend_http;
pub mod db;
pub mod realtime;
pub mod realtime_http;
pub mod realtime_script;
pub mod sse;
