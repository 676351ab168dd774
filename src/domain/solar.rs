use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Timelike};
use chrono_tz::Tz;
use std::f64::consts::PI;

use crate::domain::error::{validate_coordinates, SolarError};

fn check_day(day_of_year: u32) -> Result<(), SolarError> {
    if (1..=366).contains(&day_of_year) {
        Ok(())
    } else {
        Err(SolarError::InvalidDayOfYear { value: day_of_year })
    }
}

fn finite(value: f64, what: &'static str) -> Result<f64, SolarError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SolarError::NonFinite { what })
    }
}

/// Solar declination in degrees for a 1-based day of the year.
pub fn declination_deg(day_of_year: u32) -> Result<f64, SolarError> {
    check_day(day_of_year)?;
    Ok(23.44 * (2.0 * PI * (day_of_year as f64 - 81.0) / 365.0).sin())
}

/// Equation of time in minutes (apparent minus mean solar time).
pub fn equation_of_time_minutes(day_of_year: u32) -> Result<f64, SolarError> {
    check_day(day_of_year)?;
    let b = 2.0 * PI * (day_of_year as f64 - 81.0) / 364.0;
    Ok(9.87 * (2.0 * b).sin() - 7.53 * b.cos() - 1.5 * b.sin())
}

/// UTC offset of `tz` in hours, taken at local noon of `date`.
pub fn utc_offset_hours(date: NaiveDate, tz: &Tz) -> f64 {
    let noon = date.and_time(NaiveTime::MIN) + Duration::hours(12);
    let offset = match tz.from_local_datetime(&noon).earliest() {
        Some(dt) => dt.offset().fix(),
        None => tz.offset_from_utc_datetime(&noon).fix(),
    };
    offset.local_minus_utc() as f64 / 3600.0
}

/// Minutes to add to clock time to get true solar time: longitude offset
/// from the zone's standard meridian plus the equation of time.
fn time_correction_minutes(longitude: f64, offset_hours: f64, day_of_year: u32) -> Result<f64, SolarError> {
    let standard_meridian = 15.0 * offset_hours;
    Ok(4.0 * (longitude - standard_meridian) + equation_of_time_minutes(day_of_year)?)
}

/// Hour angle in degrees at a local clock time.
///
/// The zone offset is resolved once at local noon of the same civil day;
/// an offset change during the day is not modeled.
pub fn hour_angle_deg(local: NaiveDateTime, longitude: f64, tz: &Tz, day_of_year: u32) -> Result<f64, SolarError> {
    let day = SolarDay::with_day_of_year(local.date(), day_of_year, longitude, tz)?;
    Ok(day.hour_angle_at(clock_hours(local.time())))
}

/// Decimal hours since local midnight.
pub fn clock_hours(t: NaiveTime) -> f64 {
    t.hour() as f64
        + t.minute() as f64 / 60.0
        + t.second() as f64 / 3600.0
        + t.nanosecond() as f64 / 3.6e12
}

/// Solar elevation in degrees.
pub fn elevation_deg(lat: f64, declination: f64, hour_angle: f64) -> Result<f64, SolarError> {
    let phi = finite(lat, "latitude")?.to_radians();
    let delta = finite(declination, "declination")?.to_radians();
    let h = finite(hour_angle, "hour angle")?.to_radians();
    let sin_el = phi.sin() * delta.sin() + phi.cos() * delta.cos() * h.cos();
    // float overshoot only; a NaN was rejected above
    let sin_el = sin_el.clamp(-1.0, 1.0);
    finite(sin_el.asin().to_degrees(), "elevation")
}

/// Per-day solar constants for one longitude and zone.
#[derive(Debug, Clone, Copy)]
pub struct SolarDay {
    pub date: NaiveDate,
    pub declination_deg: f64,
    /// Clock-to-solar-time correction in minutes.
    pub correction_min: f64,
    pub offset_hours: f64,
}

impl SolarDay {
    pub fn new(date: NaiveDate, longitude: f64, tz: &Tz) -> Result<Self, SolarError> {
        Self::with_day_of_year(date, date.ordinal(), longitude, tz)
    }

    fn with_day_of_year(date: NaiveDate, day_of_year: u32, longitude: f64, tz: &Tz) -> Result<Self, SolarError> {
        validate_coordinates(0.0, longitude)?;
        let offset_hours = utc_offset_hours(date, tz);
        Ok(Self {
            date,
            declination_deg: declination_deg(day_of_year)?,
            correction_min: time_correction_minutes(longitude, offset_hours, day_of_year)?,
            offset_hours,
        })
    }

    pub fn hour_angle_at(&self, clock_hours: f64) -> f64 {
        let solar_hours = clock_hours + self.correction_min / 60.0;
        15.0 * (solar_hours - 12.0)
    }

    pub fn elevation_at(&self, lat: f64, clock_hours: f64) -> Result<f64, SolarError> {
        elevation_deg(lat, self.declination_deg, self.hour_angle_at(clock_hours))
    }

    /// Clock hours at which the hour angle is zero.
    pub fn solar_noon_hours(&self) -> f64 {
        12.0 - self.correction_min / 60.0
    }

    /// Zone-aware instant for a number of clock minutes after local midnight.
    pub fn localize(&self, tz: &Tz, minutes: f64) -> DateTime<Tz> {
        let naive = self.date.and_time(NaiveTime::MIN) + Duration::milliseconds((minutes * 60_000.0).round() as i64);
        match tz.from_local_datetime(&naive).earliest() {
            Some(dt) => dt,
            // skipped by a forward transition; fall back to the noon offset
            None => {
                let shift = Duration::seconds((self.offset_hours * 3600.0).round() as i64);
                tz.from_utc_datetime(&(naive - shift))
            }
        }
    }
}
