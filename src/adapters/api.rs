use actix_web::{HttpRequest, HttpResponse, Responder, get, http::header, post, web};
use serde::{Deserialize, Serialize};

use crate::adapters::backend_http::{CancelledBooking, DockJoinResponse};
use crate::app::services::{
    BindInput, NewBookingInput, SandboxCommandHandler, SandboxQueryHandler, ServiceError,
    SqliteSandboxService,
};
use crate::domain::booking::BookingSummary;
use crate::domain::join_params::JoinParams;
use crate::domain::models::BookingRecord;

#[derive(Clone)]
pub struct ApiState {
    pub sandbox: SqliteSandboxService,
    pub public_session_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinDockRequest {
    pub dock_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub code: String,
    #[serde(default)]
    pub vehicle_model_id: Option<String>,
    #[serde(default)]
    pub station_name: Option<String>,
    #[serde(default)]
    pub starts_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindBookingBody {
    pub booking_code: String,
    pub soc_start: i64,
    pub target_soc: i64,
}

#[derive(Debug, Deserialize)]
pub struct BookingListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct BindBookingResponse {
    pub id: String,
    pub booking_id: String,
    pub vehicle_model_id: Option<String>,
    pub soc_start: Option<i64>,
    pub target_soc: Option<i64>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsResponse {
    pub schema_version: u32,
    pub bookings_count: i64,
    pub dock_sessions_count: i64,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(diagnostics_endpoint)
        .service(join_dock_endpoint)
        .service(list_my_bookings_endpoint)
        .service(create_booking_endpoint)
        .service(bind_booking_endpoint)
        .service(cancel_booking_endpoint);
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[get("/diagnostics")]
async fn diagnostics_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.sandbox.stats() {
        Ok(stats) => HttpResponse::Ok().json(DiagnosticsResponse {
            schema_version: stats.schema_version,
            bookings_count: stats.bookings,
            dock_sessions_count: stats.dock_sessions,
        }),
        Err(error) => service_error_response(error),
    }
}

#[post("/docks/join")]
async fn join_dock_endpoint(
    request: HttpRequest,
    state: web::Data<ApiState>,
    body: web::Json<JoinDockRequest>,
) -> impl Responder {
    let Some(user_id) = bearer_user(&request) else {
        return unauthorized();
    };

    let session = match state.sandbox.join_dock(&user_id, &body.dock_code) {
        Ok(session) => session,
        Err(error) => return service_error_response(error),
    };

    let params = JoinParams {
        realtime_token: session.realtime_token,
        channel_id: session.channel_id,
        session_id: session.id,
        expires_at: session.expires_at,
    };
    let session_url = params.to_session_url(&state.public_session_url).ok();

    HttpResponse::Ok().json(DockJoinResponse {
        ably_token: params.realtime_token,
        channel_id: params.channel_id,
        session_id: params.session_id,
        expires_at: params.expires_at,
        session_url,
    })
}

#[get("/bookings/me")]
async fn list_my_bookings_endpoint(
    request: HttpRequest,
    state: web::Data<ApiState>,
    query: web::Query<BookingListQuery>,
) -> impl Responder {
    let Some(user_id) = bearer_user(&request) else {
        return unauthorized();
    };

    match state
        .sandbox
        .list_bookings(&user_id, query.status.as_deref())
    {
        Ok(bookings) => {
            let mapped: Vec<BookingSummary> = bookings.into_iter().map(to_summary).collect();
            HttpResponse::Ok().json(mapped)
        }
        Err(error) => service_error_response(error),
    }
}

#[post("/bookings")]
async fn create_booking_endpoint(
    request: HttpRequest,
    state: web::Data<ApiState>,
    body: web::Json<CreateBookingRequest>,
) -> impl Responder {
    let Some(user_id) = bearer_user(&request) else {
        return unauthorized();
    };
    let body = body.into_inner();

    match state.sandbox.create_booking(
        &user_id,
        &NewBookingInput {
            code: body.code,
            vehicle_model_id: body.vehicle_model_id,
            station_name: body.station_name,
            starts_at: body.starts_at,
        },
    ) {
        Ok(booking) => HttpResponse::Created().json(to_summary(booking)),
        Err(error) => service_error_response(error),
    }
}

#[post("/sessions/{session_id}/bind-booking")]
async fn bind_booking_endpoint(
    request: HttpRequest,
    state: web::Data<ApiState>,
    path: web::Path<String>,
    body: web::Json<BindBookingBody>,
) -> impl Responder {
    let Some(user_id) = bearer_user(&request) else {
        return unauthorized();
    };
    let session_id = path.into_inner();
    let body = body.into_inner();

    match state.sandbox.bind_booking(
        &user_id,
        &session_id,
        &BindInput {
            booking_code: body.booking_code,
            soc_start: body.soc_start,
            target_soc: body.target_soc,
        },
    ) {
        Ok(bound) => HttpResponse::Ok().json(BindBookingResponse {
            id: bound.session.id,
            booking_id: bound.booking.id,
            vehicle_model_id: bound.booking.vehicle_model_id,
            soc_start: bound.session.soc_start,
            target_soc: bound.session.target_soc,
        }),
        Err(error) => service_error_response(error),
    }
}

#[post("/bookings/{booking_id}/cancel")]
async fn cancel_booking_endpoint(
    request: HttpRequest,
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    let Some(user_id) = bearer_user(&request) else {
        return unauthorized();
    };

    match state.sandbox.cancel_booking(&user_id, &path.into_inner()) {
        Ok(booking) => HttpResponse::Ok().json(CancelledBooking {
            id: booking.id,
            status: booking.status,
        }),
        Err(error) => service_error_response(error),
    }
}

fn to_summary(booking: BookingRecord) -> BookingSummary {
    BookingSummary {
        id: booking.id,
        code: booking.code,
        status: booking.status,
        vehicle_model_id: booking.vehicle_model_id,
        station_name: booking.station_name,
        starts_at: booking.starts_at,
    }
}

/// The sandbox trusts any bearer token and uses it as the user id.
fn bearer_user(request: &HttpRequest) -> Option<String> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized().json(serde_json::json!({
        "message": "Authentication required"
    }))
}

fn service_error_response(error: ServiceError) -> HttpResponse {
    let body = serde_json::json!({ "message": error.to_string() });
    match error {
        ServiceError::NotFound(_) => HttpResponse::NotFound().json(body),
        ServiceError::Conflict(_) => HttpResponse::Conflict().json(body),
        ServiceError::Invalid(_) => HttpResponse::BadRequest().json(body),
        ServiceError::Expired => HttpResponse::Gone().json(body),
        ServiceError::DbLockPoisoned | ServiceError::Database(_) => {
            tracing::error!(error = %error, "sandbox request failed");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "message": "internal error"
            }))
        }
    }
}
