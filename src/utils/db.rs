use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

use crate::domain::store::UserStore;
use crate::domain::user::{
    Channel, ChannelConfig, ChannelSettings, ChannelState, GeoPoint, TemporaryLocation, UserLocation, UserRecord,
};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown user {0}")]
    UnknownUser(String),
    #[error("corrupt {field} for user {chat_id}: {value:?}")]
    Corrupt { chat_id: String, field: &'static str, value: String },
}

/// Settings given to users on first subscribe.
#[derive(Debug, Clone)]
pub struct UserDefaults {
    pub tz: String,
    pub daily: ChannelConfig,
    pub night: ChannelConfig,
}

/// `UserStore` backed by a sqlite file; opens a connection per call.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    defaults: UserDefaults,
}

const USER_COLUMNS: &str = "chat_id, tz, lat, lon, loc_tz, label, \
     temp_lat, temp_lon, temp_tz, temp_label, temp_expires, \
     daily_hour, daily_window, daily_last_sent, night_hour, night_window, night_last_sent";

impl SqliteStore {
    pub fn open(path: impl Into<PathBuf>, defaults: UserDefaults) -> Result<Self, DbError> {
        let store = Self { path: path.into(), defaults };
        store.open_or_init()?;
        Ok(store)
    }

    fn open_or_init(&self) -> Result<Connection, DbError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS users (
                chat_id TEXT PRIMARY KEY,
                tz TEXT NOT NULL,
                lat REAL,
                lon REAL,
                loc_tz TEXT,
                label TEXT,
                temp_lat REAL,
                temp_lon REAL,
                temp_tz TEXT,
                temp_label TEXT,
                temp_expires TEXT,
                daily_hour INTEGER NOT NULL,
                daily_window INTEGER NOT NULL,
                daily_last_sent TEXT,
                night_hour INTEGER NOT NULL,
                night_window INTEGER NOT NULL,
                night_last_sent TEXT
            );
            "#,
        )?;
        Ok(conn)
    }

    fn require_changed(changed: usize, chat_id: &str) -> Result<(), DbError> {
        if changed == 0 {
            Err(DbError::UnknownUser(chat_id.to_string()))
        } else {
            Ok(())
        }
    }
}

fn channel_columns(channel: Channel) -> (&'static str, &'static str) {
    match channel {
        Channel::Daily => ("daily_hour", "daily_last_sent"),
        Channel::Night => ("night_hour", "night_last_sent"),
    }
}

fn parse_date(chat_id: &str, field: &'static str, raw: Option<String>) -> Result<Option<NaiveDate>, DbError> {
    raw.map(|v| {
        v.parse::<NaiveDate>().map_err(|_| DbError::Corrupt { chat_id: chat_id.to_string(), field, value: v })
    })
    .transpose()
}

struct RawUser {
    chat_id: String,
    tz: String,
    lat: Option<f64>,
    lon: Option<f64>,
    loc_tz: Option<String>,
    label: Option<String>,
    temp_lat: Option<f64>,
    temp_lon: Option<f64>,
    temp_tz: Option<String>,
    temp_label: Option<String>,
    temp_expires: Option<String>,
    daily_hour: u32,
    daily_window: u32,
    daily_last_sent: Option<String>,
    night_hour: u32,
    night_window: u32,
    night_last_sent: Option<String>,
}

impl RawUser {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            chat_id: row.get(0)?,
            tz: row.get(1)?,
            lat: row.get(2)?,
            lon: row.get(3)?,
            loc_tz: row.get(4)?,
            label: row.get(5)?,
            temp_lat: row.get(6)?,
            temp_lon: row.get(7)?,
            temp_tz: row.get(8)?,
            temp_label: row.get(9)?,
            temp_expires: row.get(10)?,
            daily_hour: row.get(11)?,
            daily_window: row.get(12)?,
            daily_last_sent: row.get(13)?,
            night_hour: row.get(14)?,
            night_window: row.get(15)?,
            night_last_sent: row.get(16)?,
        })
    }

    fn into_record(self) -> Result<UserRecord, DbError> {
        let location = match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(UserLocation {
                point: GeoPoint { lat, lon },
                tz: self.loc_tz.unwrap_or_else(|| self.tz.clone()),
                label: self.label,
            }),
            _ => None,
        };

        let temporary = match (self.temp_lat, self.temp_lon, self.temp_tz, self.temp_expires) {
            (Some(lat), Some(lon), Some(tz), Some(expires)) => {
                let expires_at = DateTime::parse_from_rfc3339(&expires)
                    .map_err(|_| DbError::Corrupt {
                        chat_id: self.chat_id.clone(),
                        field: "temp_expires",
                        value: expires.clone(),
                    })?
                    .with_timezone(&Utc);
                Some(TemporaryLocation { point: GeoPoint { lat, lon }, tz, label: self.temp_label, expires_at })
            }
            _ => None,
        };

        let daily_last = parse_date(&self.chat_id, "daily_last_sent", self.daily_last_sent)?;
        let night_last = parse_date(&self.chat_id, "night_last_sent", self.night_last_sent)?;

        Ok(UserRecord {
            chat_id: self.chat_id,
            tz: self.tz,
            location,
            temporary,
            daily: ChannelSettings {
                config: ChannelConfig { target_hour: self.daily_hour, window_minutes: self.daily_window },
                state: ChannelState { last_sent_local_date: daily_last },
            },
            night: ChannelSettings {
                config: ChannelConfig { target_hour: self.night_hour, window_minutes: self.night_window },
                state: ChannelState { last_sent_local_date: night_last },
            },
        })
    }
}

impl UserStore for SqliteStore {
    type Error = DbError;

    fn list_users(&self) -> Result<Vec<UserRecord>, DbError> {
        let conn = self.open_or_init()?;
        let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY chat_id"))?;
        let raws = stmt
            .query_map([], RawUser::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawUser::into_record).collect()
    }

    fn get_user(&self, chat_id: &str) -> Result<Option<UserRecord>, DbError> {
        let conn = self.open_or_init()?;
        let raw = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE chat_id = ?1"),
                params![chat_id],
                RawUser::from_row,
            )
            .optional()?;
        raw.map(RawUser::into_record).transpose()
    }

    fn subscribe(&self, chat_id: &str) -> Result<UserRecord, DbError> {
        let conn = self.open_or_init()?;
        let d = &self.defaults;
        let inserted = conn.execute(
            "INSERT INTO users (chat_id, tz, daily_hour, daily_window, night_hour, night_window)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(chat_id) DO NOTHING",
            params![
                chat_id,
                d.tz,
                d.daily.target_hour,
                d.daily.window_minutes,
                d.night.target_hour,
                d.night.window_minutes
            ],
        )?;
        if inserted > 0 {
            debug!(chat_id, "Subscribed new user");
        }
        self.get_user(chat_id)?.ok_or_else(|| DbError::UnknownUser(chat_id.to_string()))
    }

    fn unsubscribe(&self, chat_id: &str) -> Result<bool, DbError> {
        let conn = self.open_or_init()?;
        Ok(conn.execute("DELETE FROM users WHERE chat_id = ?1", params![chat_id])? > 0)
    }

    fn set_location(&self, chat_id: &str, point: GeoPoint, tz: &str, label: Option<&str>) -> Result<(), DbError> {
        let conn = self.open_or_init()?;
        let changed = conn.execute(
            "UPDATE users SET lat = ?1, lon = ?2, loc_tz = ?3, label = ?4, tz = ?3 WHERE chat_id = ?5",
            params![point.lat, point.lon, tz, label, chat_id],
        )?;
        Self::require_changed(changed, chat_id)
    }

    fn set_temporary_location(
        &self,
        chat_id: &str,
        point: GeoPoint,
        tz: &str,
        label: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let conn = self.open_or_init()?;
        let changed = conn.execute(
            "UPDATE users SET temp_lat = ?1, temp_lon = ?2, temp_tz = ?3, temp_label = ?4, temp_expires = ?5
             WHERE chat_id = ?6",
            params![point.lat, point.lon, tz, label, expires_at.to_rfc3339(), chat_id],
        )?;
        Self::require_changed(changed, chat_id)
    }

    fn clear_temporary_location(&self, chat_id: &str) -> Result<bool, DbError> {
        let conn = self.open_or_init()?;
        let changed = conn.execute(
            "UPDATE users SET temp_lat = NULL, temp_lon = NULL, temp_tz = NULL, temp_label = NULL, temp_expires = NULL
             WHERE chat_id = ?1 AND temp_expires IS NOT NULL",
            params![chat_id],
        )?;
        Ok(changed > 0)
    }

    fn set_channel_hour(&self, chat_id: &str, channel: Channel, target_hour: u32) -> Result<(), DbError> {
        let conn = self.open_or_init()?;
        let (hour_col, _) = channel_columns(channel);
        let changed = conn.execute(
            &format!("UPDATE users SET {hour_col} = ?1 WHERE chat_id = ?2"),
            params![target_hour, chat_id],
        )?;
        Self::require_changed(changed, chat_id)
    }

    fn mark_sent(
        &self,
        chat_id: &str,
        channel: Channel,
        expected_previous: Option<NaiveDate>,
        local_date: NaiveDate,
    ) -> Result<bool, DbError> {
        let mut state = ChannelState { last_sent_local_date: expected_previous };
        if !state.mark_sent(local_date) {
            return Ok(false);
        }
        let conn = self.open_or_init()?;
        let (_, sent_col) = channel_columns(channel);
        let changed = conn.execute(
            &format!("UPDATE users SET {sent_col} = ?1 WHERE chat_id = ?2 AND {sent_col} IS ?3"),
            params![local_date.to_string(), chat_id, expected_previous.map(|d| d.to_string())],
        )?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn store() -> (TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let defaults = UserDefaults {
            tz: "Europe/Madrid".into(),
            daily: ChannelConfig { target_hour: 9, window_minutes: 10 },
            night: ChannelConfig { target_hour: 21, window_minutes: 10 },
        };
        let store = SqliteStore::open(dir.path().join("db/test.sqlite"), defaults).unwrap();
        (dir, store)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn subscribe_fills_defaults_and_is_idempotent() {
        let (_dir, s) = store();
        let u = s.subscribe("1").unwrap();
        assert_eq!(u.tz, "Europe/Madrid");
        assert_eq!(u.daily.config.target_hour, 9);
        assert_eq!(u.night.config.target_hour, 21);
        assert!(u.location.is_none() && u.temporary.is_none());

        s.set_channel_hour("1", Channel::Daily, 7).unwrap();
        let again = s.subscribe("1").unwrap();
        assert_eq!(again.daily.config.target_hour, 7);
        assert_eq!(s.list_users().unwrap().len(), 1);

        assert!(s.unsubscribe("1").unwrap());
        assert!(!s.unsubscribe("1").unwrap());
        assert!(s.get_user("1").unwrap().is_none());
    }

    #[test]
    fn persistent_set_leaves_temporary_alone() {
        let (_dir, s) = store();
        s.subscribe("1").unwrap();
        let expires = Utc.with_ymd_and_hms(2024, 6, 22, 7, 0, 0).unwrap();
        s.set_temporary_location("1", GeoPoint { lat: 38.7, lon: -9.1 }, "Europe/Lisbon", Some("Lisboa"), expires)
            .unwrap();
        let u = s.get_user("1").unwrap().unwrap();
        assert_eq!(u.temporary.as_ref().unwrap().expires_at, expires);

        s.set_location("1", GeoPoint { lat: 51.5, lon: -0.12 }, "Europe/London", None).unwrap();
        let u = s.get_user("1").unwrap().unwrap();
        assert_eq!(u.temporary.as_ref().map(|t| t.expires_at), Some(expires));
        assert_eq!(u.tz, "Europe/London");
        let loc = u.location.unwrap();
        assert_eq!(loc.point, GeoPoint { lat: 51.5, lon: -0.12 });
        assert_eq!(loc.label, None);

        assert!(s.clear_temporary_location("1").unwrap());
        assert!(!s.clear_temporary_location("1").unwrap());
    }

    #[test]
    fn writes_to_unknown_user_fail() {
        let (_dir, s) = store();
        let err = s.set_location("nobody", GeoPoint { lat: 0.0, lon: 0.0 }, "UTC", None).unwrap_err();
        assert!(matches!(err, DbError::UnknownUser(_)));
        let expires = Utc::now() + Duration::hours(1);
        assert!(s.set_temporary_location("nobody", GeoPoint { lat: 0.0, lon: 0.0 }, "UTC", None, expires).is_err());
    }

    #[test]
    fn mark_sent_is_guarded_and_monotonic() {
        let (_dir, s) = store();
        s.subscribe("1").unwrap();

        assert!(s.mark_sent("1", Channel::Daily, None, day(21)).unwrap());
        // a racing writer that read the old value loses
        assert!(!s.mark_sent("1", Channel::Daily, None, day(21)).unwrap());
        // never backwards, not even to the same day
        assert!(!s.mark_sent("1", Channel::Daily, Some(day(21)), day(20)).unwrap());
        assert!(!s.mark_sent("1", Channel::Daily, Some(day(21)), day(21)).unwrap());
        assert!(s.mark_sent("1", Channel::Daily, Some(day(21)), day(22)).unwrap());

        let u = s.get_user("1").unwrap().unwrap();
        assert_eq!(u.daily.state.last_sent_local_date, Some(day(22)));
        assert_eq!(u.night.state.last_sent_local_date, None);
    }
}
