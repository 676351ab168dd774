use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::{GeoPoint, UserRecord};
use crate::predictors::windows::{DailyWindows, TimeWindow, WindowOutcome};
use crate::scheduler::location::EffectiveLocation;

#[derive(Debug, Serialize)]
pub struct TimeWindowDto {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl From<&TimeWindow> for TimeWindowDto {
    fn from(w: &TimeWindow) -> Self {
        Self { start: w.start.fixed_offset(), end: w.end.fixed_offset() }
    }
}

#[derive(Debug, Serialize)]
pub struct DailyWindowsDto {
    pub morning: Option<TimeWindowDto>,
    pub afternoon: Option<TimeWindowDto>,
    pub solar_noon: DateTime<FixedOffset>,
    pub max_elevation_deg: f64,
    pub band: [f64; 2],
    pub outcome: &'static str,
}

impl From<&DailyWindows> for DailyWindowsDto {
    fn from(w: &DailyWindows) -> Self {
        Self {
            morning: w.morning.as_ref().map(TimeWindowDto::from),
            afternoon: w.afternoon.as_ref().map(TimeWindowDto::from),
            solar_noon: w.solar_noon_local.fixed_offset(),
            max_elevation_deg: w.max_elevation_deg,
            band: [w.band.low, w.band.high],
            outcome: match w.outcome() {
                WindowOutcome::Available => "available",
                WindowOutcome::BelowBand => "below_band",
                WindowOutcome::FilteredByPolicy => "filtered",
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LocationDto {
    pub lat: f64,
    pub lon: f64,
    pub tz: String,
    pub label: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ChannelDto {
    pub target_hour: u32,
    pub window_minutes: u32,
    pub last_sent_local_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct UserDto {
    pub chat_id: String,
    pub tz: String,
    pub location: Option<LocationDto>,
    pub temporary: Option<LocationDto>,
    pub daily: ChannelDto,
    pub night: ChannelDto,
}

impl From<&UserRecord> for UserDto {
    fn from(u: &UserRecord) -> Self {
        let channel = |c: &crate::domain::user::ChannelSettings| ChannelDto {
            target_hour: c.config.target_hour,
            window_minutes: c.config.window_minutes,
            last_sent_local_date: c.state.last_sent_local_date,
        };
        Self {
            chat_id: u.chat_id.clone(),
            tz: u.tz.clone(),
            location: u.location.as_ref().map(|l| LocationDto {
                lat: l.point.lat,
                lon: l.point.lon,
                tz: l.tz.clone(),
                label: l.label.clone(),
                expires_at: None,
            }),
            temporary: u.temporary.as_ref().map(|t| LocationDto {
                lat: t.point.lat,
                lon: t.point.lon,
                tz: t.tz.clone(),
                label: t.label.clone(),
                expires_at: Some(t.expires_at),
            }),
            daily: channel(&u.daily),
            night: channel(&u.night),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EffectiveLocationDto {
    pub point: GeoPoint,
    pub tz: String,
    pub label: Option<String>,
    pub is_temporary: bool,
}

impl From<EffectiveLocation> for EffectiveLocationDto {
    fn from(e: EffectiveLocation) -> Self {
        Self { point: e.point, tz: e.tz, label: e.label, is_temporary: e.is_temporary }
    }
}

#[derive(Debug, Serialize)]
pub struct WhereDto {
    pub user: UserDto,
    pub effective: Option<EffectiveLocationDto>,
}

#[derive(Debug, Deserialize)]
pub struct SetLocationDto {
    pub lat: f64,
    pub lon: f64,
    pub tz: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetTemporaryLocationDto {
    pub lat: f64,
    pub lon: f64,
    pub tz: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_temp_hours")]
    pub hours: i64,
}

fn default_temp_hours() -> i64 { 24 }

#[derive(Debug, Deserialize)]
pub struct SetChannelHourDto {
    pub target_hour: u32,
}
