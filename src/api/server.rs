use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{response::IntoResponse, routing::{get, put}, Json, Router};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api::types::{
    DailyWindowsDto, SetChannelHourDto, SetLocationDto, SetTemporaryLocationDto, UserDto, WhereDto,
};
use crate::domain::error::{parse_timezone, validate_coordinates, ErrorKind, SolarError};
use crate::domain::solar::{declination_deg, elevation_deg, hour_angle_deg};
use crate::domain::store::UserStore;
use crate::domain::user::{Channel, ChannelConfig, GeoPoint};
use crate::predictors::windows::find_bands;
use crate::scheduler::location::effective_location;
use crate::utils::config::Settings;
use crate::utils::db::{DbError, SqliteStore};

/// Temporary locations last between one hour and a week.
pub const TEMPORARY_HOURS: std::ops::RangeInclusive<i64> = 1..=168;

#[derive(Clone)]
pub struct AppState {
    pub store: SqliteStore,
    pub settings: Arc<Settings>,
}

#[derive(Debug, Deserialize)]
struct WindowsQuery {
    lat: f64,
    lon: f64,
    date: NaiveDate,
    tz: String,
    #[serde(default)]
    step: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SunQuery {
    lat: f64,
    lon: f64,
    tz: String,
    /// Local clock time, e.g. `2024-06-21T09:30:00`.
    at: NaiveDateTime,
}

type ApiResponse = (StatusCode, Json<Value>);

fn solar_error(e: &SolarError) -> ApiResponse {
    let status = match e.kind() {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Configuration => StatusCode::BAD_REQUEST,
        ErrorKind::Computation => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() })))
}

fn db_error(e: &DbError) -> ApiResponse {
    let status = match e {
        DbError::UnknownUser(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": format!("db error: {}", e) })))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/windows", get(get_windows))
        .route("/sun", get(get_sun))
        .route("/users", get(list_users))
        .route("/users/:chat_id", axum::routing::post(subscribe).delete(unsubscribe))
        .route("/users/:chat_id/where", get(where_is))
        .route("/users/:chat_id/location", put(set_location))
        .route(
            "/users/:chat_id/location/temporary",
            put(set_temporary_location).delete(clear_temporary_location),
        )
        .route("/users/:chat_id/channels/:channel", put(set_channel_hour))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

pub async fn run_server(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, router(state)).await
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let users = state.store.list_users().map(|u| u.len());
    (StatusCode::OK, Json(json!({ "status": "ok", "db": users.is_ok(), "users": users.unwrap_or(0) })))
}

async fn get_windows(State(state): State<AppState>, Query(q): Query<WindowsQuery>) -> impl IntoResponse {
    let tz = match parse_timezone(&q.tz) {
        Ok(tz) => tz,
        Err(e) => return solar_error(&e),
    };
    let step = q.step.unwrap_or(state.settings.step_minutes);
    match find_bands(q.lat, q.lon, q.date, &tz, state.settings.band(), step) {
        Ok(w) => (StatusCode::OK, Json(json!(DailyWindowsDto::from(&w)))),
        Err(e) => solar_error(&e),
    }
}

fn sun_position(q: &SunQuery) -> Result<Value, SolarError> {
    validate_coordinates(q.lat, q.lon)?;
    let tz = parse_timezone(&q.tz)?;
    let day_of_year = q.at.date().ordinal();
    let declination = declination_deg(day_of_year)?;
    let hour_angle = hour_angle_deg(q.at, q.lon, &tz, day_of_year)?;
    let elevation = elevation_deg(q.lat, declination, hour_angle)?;
    Ok(json!({
        "at": q.at,
        "declination_deg": declination,
        "hour_angle_deg": hour_angle,
        "elevation_deg": elevation,
    }))
}

async fn get_sun(Query(q): Query<SunQuery>) -> impl IntoResponse {
    match sun_position(&q) {
        Ok(body) => (StatusCode::OK, Json(body)),
        Err(e) => solar_error(&e),
    }
}

async fn list_users(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_users() {
        Ok(users) => {
            let out: Vec<UserDto> = users.iter().map(UserDto::from).collect();
            (StatusCode::OK, Json(json!(out)))
        }
        Err(e) => db_error(&e),
    }
}

async fn subscribe(State(state): State<AppState>, Path(chat_id): Path<String>) -> impl IntoResponse {
    match state.store.subscribe(&chat_id) {
        Ok(u) => (StatusCode::CREATED, Json(json!(UserDto::from(&u)))),
        Err(e) => db_error(&e),
    }
}

async fn unsubscribe(State(state): State<AppState>, Path(chat_id): Path<String>) -> impl IntoResponse {
    match state.store.unsubscribe(&chat_id) {
        Ok(true) => (StatusCode::OK, Json(json!({ "removed": chat_id }))),
        Ok(false) => db_error(&DbError::UnknownUser(chat_id)),
        Err(e) => db_error(&e),
    }
}

async fn where_is(State(state): State<AppState>, Path(chat_id): Path<String>) -> impl IntoResponse {
    match state.store.get_user(&chat_id) {
        Ok(Some(u)) => {
            let effective = effective_location(&u, Utc::now()).map(Into::into);
            (StatusCode::OK, Json(json!(WhereDto { user: UserDto::from(&u), effective })))
        }
        Ok(None) => db_error(&DbError::UnknownUser(chat_id)),
        Err(e) => db_error(&e),
    }
}

fn check_location(lat: f64, lon: f64, tz: &str) -> Result<(), SolarError> {
    validate_coordinates(lat, lon)?;
    parse_timezone(tz)?;
    Ok(())
}

async fn set_location(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(body): Json<SetLocationDto>,
) -> impl IntoResponse {
    if let Err(e) = check_location(body.lat, body.lon, &body.tz) {
        return solar_error(&e);
    }
    let point = GeoPoint { lat: body.lat, lon: body.lon };
    if let Err(e) = state.store.set_location(&chat_id, point, body.tz.trim(), body.label.as_deref()) {
        return db_error(&e);
    }
    // a new home location ends any trip
    match state.store.clear_temporary_location(&chat_id) {
        Ok(cleared) => {
            info!(chat_id = %chat_id, temporary_cleared = cleared, "Persistent location updated");
            (StatusCode::OK, Json(json!({ "updated": true, "temporary_cleared": cleared })))
        }
        Err(e) => db_error(&e),
    }
}

async fn set_temporary_location(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(body): Json<SetTemporaryLocationDto>,
) -> impl IntoResponse {
    if let Err(e) = check_location(body.lat, body.lon, &body.tz) {
        return solar_error(&e);
    }
    let hours = body.hours.clamp(*TEMPORARY_HOURS.start(), *TEMPORARY_HOURS.end());
    let expires_at = Utc::now() + Duration::hours(hours);
    let point = GeoPoint { lat: body.lat, lon: body.lon };
    match state
        .store
        .set_temporary_location(&chat_id, point, body.tz.trim(), body.label.as_deref(), expires_at)
    {
        Ok(()) => {
            info!(chat_id = %chat_id, hours, "Temporary location set");
            (StatusCode::OK, Json(json!({ "expires_at": expires_at })))
        }
        Err(e) => db_error(&e),
    }
}

async fn clear_temporary_location(State(state): State<AppState>, Path(chat_id): Path<String>) -> impl IntoResponse {
    match state.store.clear_temporary_location(&chat_id) {
        Ok(cleared) => (StatusCode::OK, Json(json!({ "cleared": cleared }))),
        Err(e) => db_error(&e),
    }
}

async fn set_channel_hour(
    State(state): State<AppState>,
    Path((chat_id, channel)): Path<(String, String)>,
    Json(body): Json<SetChannelHourDto>,
) -> impl IntoResponse {
    let channel: Channel = match channel.parse() {
        Ok(c) => c,
        Err(msg) => return (StatusCode::NOT_FOUND, Json(json!({ "error": msg }))),
    };
    let candidate = ChannelConfig { target_hour: body.target_hour, ..state.settings.channel_defaults(channel) };
    if let Err(e) = candidate.validate() {
        return solar_error(&e);
    }
    match state.store.set_channel_hour(&chat_id, channel, body.target_hour) {
        Ok(()) => (StatusCode::OK, Json(json!({ "channel": channel.as_str(), "target_hour": body.target_hour }))),
        Err(e) => db_error(&e),
    }
}
