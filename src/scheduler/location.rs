use chrono::{DateTime, Utc};

use crate::domain::user::{GeoPoint, UserRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveLocation {
    pub point: GeoPoint,
    pub tz: String,
    pub label: Option<String>,
    pub is_temporary: bool,
}

/// Location governing computations for `user` at `now`.
///
/// An unexpired temporary location always wins; otherwise the persistent
/// one; otherwise nothing. Expired temporary entries are ignored here and
/// left in place for an explicit clear.
pub fn effective_location(user: &UserRecord, now: DateTime<Utc>) -> Option<EffectiveLocation> {
    if let Some(temp) = user.temporary.as_ref().filter(|t| t.expires_at > now) {
        return Some(EffectiveLocation {
            point: temp.point,
            tz: temp.tz.clone(),
            label: temp.label.clone(),
            is_temporary: true,
        });
    }

    user.location.as_ref().map(|loc| EffectiveLocation {
        point: loc.point,
        tz: loc.tz.clone(),
        label: loc.label.clone(),
        is_temporary: false,
    })
}
