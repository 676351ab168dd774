use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::SolarError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Location set explicitly by the user; replaced wholesale on every set.
#[derive(Debug, Clone, PartialEq)]
pub struct UserLocation {
    pub point: GeoPoint,
    pub tz: String,
    pub label: Option<String>,
}

/// Travel override that stops applying once `expires_at` is reached.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporaryLocation {
    pub point: GeoPoint,
    pub tz: String,
    pub label: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Daily,
    Night,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Daily, Channel::Night];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Daily => "daily",
            Channel::Night => "night",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Channel::Daily),
            "night" => Ok(Channel::Night),
            other => Err(format!("unknown channel {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub target_hour: u32,
    pub window_minutes: u32,
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<(), SolarError> {
        if self.target_hour > 23 {
            return Err(SolarError::InvalidTargetHour { value: self.target_hour });
        }
        if !(1..=60).contains(&self.window_minutes) {
            return Err(SolarError::InvalidWindowMinutes { value: self.window_minutes });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelState {
    pub last_sent_local_date: Option<NaiveDate>,
}

impl ChannelState {
    /// Records a confirmed delivery. Never moves the marker backwards.
    pub fn mark_sent(&mut self, local_date: NaiveDate) -> bool {
        match self.last_sent_local_date {
            Some(prev) if prev >= local_date => false,
            _ => {
                self.last_sent_local_date = Some(local_date);
                true
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSettings {
    pub config: ChannelConfig,
    pub state: ChannelState,
}

/// Everything the core needs to know about one subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub chat_id: String,
    /// Zone used for delivery gating.
    pub tz: String,
    pub location: Option<UserLocation>,
    pub temporary: Option<TemporaryLocation>,
    pub daily: ChannelSettings,
    pub night: ChannelSettings,
}

impl UserRecord {
    pub fn channel(&self, channel: Channel) -> &ChannelSettings {
        match channel {
            Channel::Daily => &self.daily,
            Channel::Night => &self.night,
        }
    }
}
