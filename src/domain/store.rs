use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::user::{Channel, GeoPoint, UserRecord};

/// Persistence port for subscriber records.
///
/// Every capability is a required method; adapters with nothing to store
/// for a given call return `Ok(None)` / `Ok(false)` rather than omitting it.
pub trait UserStore {
    type Error: std::error::Error + Send + Sync + 'static;

    fn list_users(&self) -> Result<Vec<UserRecord>, Self::Error>;

    fn get_user(&self, chat_id: &str) -> Result<Option<UserRecord>, Self::Error>;

    /// Creates the user with default settings if absent; returns the record.
    fn subscribe(&self, chat_id: &str) -> Result<UserRecord, Self::Error>;

    /// Returns whether a user was removed.
    fn unsubscribe(&self, chat_id: &str) -> Result<bool, Self::Error>;

    /// Overwrites the persistent location and adopts its timezone for
    /// delivery. A temporary override is left as it is.
    fn set_location(&self, chat_id: &str, point: GeoPoint, tz: &str, label: Option<&str>) -> Result<(), Self::Error>;

    fn set_temporary_location(
        &self,
        chat_id: &str,
        point: GeoPoint,
        tz: &str,
        label: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Self::Error>;

    /// Returns whether a temporary location was present.
    fn clear_temporary_location(&self, chat_id: &str) -> Result<bool, Self::Error>;

    fn set_channel_hour(&self, chat_id: &str, channel: Channel, target_hour: u32) -> Result<(), Self::Error>;

    /// Advances the last-sent marker of `channel` to `local_date`, but only
    /// if it still equals `expected_previous` and `local_date` is newer.
    /// Returns whether the marker moved.
    fn mark_sent(
        &self,
        chat_id: &str,
        channel: Channel,
        expected_previous: Option<NaiveDate>,
        local_date: NaiveDate,
    ) -> Result<bool, Self::Error>;
}
