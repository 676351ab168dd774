//! TOML settings for the poller and API.
//!
//! Read from `$SUNWINDOW_CONFIG` (default `sunwindow.toml`); a missing file
//! means all defaults. `BOT_TOKEN` overrides `telegram.token`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::domain::error::{parse_timezone, SolarError};
use crate::domain::user::{Channel, ChannelConfig};
use crate::predictors::windows::ElevationBand;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid setting: {0}")]
    Invalid(#[from] SolarError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct BandConfig {
    #[serde(default = "default_band_low")]
    pub low: f64,
    #[serde(default = "default_band_high")]
    pub high: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_api_addr")]
    pub api_addr: String,
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    /// Deliver only to this chat; handy for trying things out.
    #[serde(default)]
    pub only_chat_id: Option<String>,
    #[serde(default)]
    pub band: BandConfig,
    #[serde(default = "default_step")]
    pub step_minutes: u32,
    #[serde(default = "default_daily")]
    pub daily: ChannelConfig,
    #[serde(default = "default_night")]
    pub night: ChannelConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

fn default_band_low() -> f64 { 30.0 }
fn default_band_high() -> f64 { 40.0 }
fn default_api_base() -> String { "https://api.telegram.org".to_string() }
fn default_db_path() -> PathBuf { PathBuf::from("data/db/sunwindow.sqlite") }
fn default_poll_interval() -> u64 { 300 }
fn default_api_addr() -> String { "127.0.0.1:3000".to_string() }
fn default_timezone() -> String { "Europe/Madrid".to_string() }
fn default_step() -> u32 { 1 }
fn default_daily() -> ChannelConfig { ChannelConfig { target_hour: 9, window_minutes: 10 } }
fn default_night() -> ChannelConfig { ChannelConfig { target_hour: 21, window_minutes: 10 } }

impl Default for BandConfig {
    fn default() -> Self {
        Self { low: default_band_low(), high: default_band_high() }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self { api_base: default_api_base(), token: None }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            poll_interval_secs: default_poll_interval(),
            api_addr: default_api_addr(),
            default_timezone: default_timezone(),
            only_chat_id: None,
            band: BandConfig::default(),
            step_minutes: default_step(),
            daily: default_daily(),
            night: default_night(),
            telegram: TelegramConfig::default(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("SUNWINDOW_CONFIG").unwrap_or_else(|_| "sunwindow.toml".to_string());
        let mut settings = Self::load_from(Path::new(&path))?;
        if let Ok(token) = std::env::var("BOT_TOKEN") {
            if !token.trim().is_empty() {
                settings.telegram.token = Some(token.trim().to_string());
            }
        }
        Ok(settings)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SolarError> {
        self.band().validate()?;
        if !(1..=60).contains(&self.step_minutes) {
            return Err(SolarError::InvalidStep { value: self.step_minutes });
        }
        self.daily.validate()?;
        self.night.validate()?;
        parse_timezone(&self.default_timezone)?;
        Ok(())
    }

    pub fn band(&self) -> ElevationBand {
        ElevationBand { low: self.band.low, high: self.band.high }
    }

    pub fn channel_defaults(&self, channel: Channel) -> ChannelConfig {
        match channel {
            Channel::Daily => self.daily,
            Channel::Night => self.night,
        }
    }
}
