use thiserror::Error;

/// Broad category of a core failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad caller-supplied value (coordinates, day of year).
    Validation,
    /// Bad settings or stored preferences (timezone, hours, band, step).
    Configuration,
    /// A non-finite value reached the trigonometry.
    Computation,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolarError {
    #[error("latitude {value} out of range (must be within -90..=90)")]
    InvalidLatitude { value: f64 },
    #[error("longitude {value} out of range (must be within -180..=180)")]
    InvalidLongitude { value: f64 },
    #[error("day of year {value} out of range (must be within 1..=366)")]
    InvalidDayOfYear { value: u32 },
    #[error("unknown timezone: {name:?}")]
    InvalidTimezone { name: String },
    #[error("target hour {value} out of range (must be within 0..=23)")]
    InvalidTargetHour { value: u32 },
    #[error("window minutes {value} out of range (must be within 1..=60)")]
    InvalidWindowMinutes { value: u32 },
    #[error("invalid elevation band [{low}, {high}]")]
    InvalidBand { low: f64, high: f64 },
    #[error("sampling step {value} min out of range (must be within 1..=60)")]
    InvalidStep { value: u32 },
    #[error("non-finite value in {what}")]
    NonFinite { what: &'static str },
}

impl SolarError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidLatitude { .. } | Self::InvalidLongitude { .. } | Self::InvalidDayOfYear { .. } => {
                ErrorKind::Validation
            }
            Self::InvalidTimezone { .. }
            | Self::InvalidTargetHour { .. }
            | Self::InvalidWindowMinutes { .. }
            | Self::InvalidBand { .. }
            | Self::InvalidStep { .. } => ErrorKind::Configuration,
            Self::NonFinite { .. } => ErrorKind::Computation,
        }
    }
}

pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(), SolarError> {
    // NaN fails both comparisons
    if !(lat >= -90.0 && lat <= 90.0) {
        return Err(SolarError::InvalidLatitude { value: lat });
    }
    if !(lon >= -180.0 && lon <= 180.0) {
        return Err(SolarError::InvalidLongitude { value: lon });
    }
    Ok(())
}

pub fn parse_timezone(name: &str) -> Result<chrono_tz::Tz, SolarError> {
    name.trim()
        .parse::<chrono_tz::Tz>()
        .map_err(|_| SolarError::InvalidTimezone { name: name.to_string() })
}
