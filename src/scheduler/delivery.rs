use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;

use crate::domain::error::SolarError;
use crate::domain::user::{Channel, ChannelConfig, ChannelState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerDecision {
    NotDueYet,
    /// Send now; record `local_date` once the send is confirmed.
    DueNow { local_date: NaiveDate },
    AlreadySentToday,
}

/// Delivery gate for one (user, channel) pair.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryScheduler {
    pub channel: Channel,
    pub config: ChannelConfig,
    pub tz: Tz,
}

impl DeliveryScheduler {
    pub fn new(channel: Channel, config: ChannelConfig, tz: Tz) -> Result<Self, SolarError> {
        config.validate()?;
        Ok(Self { channel, config, tz })
    }

    /// Pure: never touches `state`. Keeps answering `DueNow` across polls in
    /// the window until the caller records the delivery.
    pub fn decide(&self, state: &ChannelState, now: DateTime<Utc>) -> SchedulerDecision {
        let local_now = now.with_timezone(&self.tz);
        let local_date = local_now.date_naive();

        if state.last_sent_local_date == Some(local_date) {
            return SchedulerDecision::AlreadySentToday;
        }
        if local_now.hour() == self.config.target_hour && local_now.minute() < self.config.window_minutes {
            SchedulerDecision::DueNow { local_date }
        } else {
            SchedulerDecision::NotDueYet
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe;

    fn scheduler(hour: u32) -> DeliveryScheduler {
        let config = ChannelConfig { target_hour: hour, window_minutes: 10 };
        DeliveryScheduler::new(Channel::Daily, config, Europe::Madrid).unwrap()
    }

    fn madrid(h: u32, m: u32) -> DateTime<Utc> {
        Europe::Madrid
            .with_ymd_and_hms(2024, 6, 21, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn nine_oclock_window() {
        let s = scheduler(9);
        let mut state = ChannelState::default();
        let day = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();

        let first = s.decide(&state, madrid(9, 4));
        assert_eq!(first, SchedulerDecision::DueNow { local_date: day });
        // no send confirmed yet: still due
        assert_eq!(s.decide(&state, madrid(9, 4)), first);
        assert_eq!(state, ChannelState::default());

        state.mark_sent(day);
        assert_eq!(s.decide(&state, madrid(9, 4)), SchedulerDecision::AlreadySentToday);
        assert_eq!(s.decide(&state, madrid(22, 0)), SchedulerDecision::AlreadySentToday);

        assert_eq!(s.decide(&ChannelState::default(), madrid(9, 11)), SchedulerDecision::NotDueYet);
        assert_eq!(s.decide(&ChannelState::default(), madrid(8, 59)), SchedulerDecision::NotDueYet);
        assert_eq!(s.decide(&ChannelState::default(), madrid(9, 10)), SchedulerDecision::NotDueYet);
    }

    #[test]
    fn yesterday_marker_does_not_block() {
        let s = scheduler(9);
        let mut state = ChannelState::default();
        state.mark_sent(NaiveDate::from_ymd_opt(2024, 6, 20).unwrap());
        assert!(matches!(s.decide(&state, madrid(9, 0)), SchedulerDecision::DueNow { .. }));
    }

    #[test]
    fn local_date_follows_user_zone() {
        // 23:05 UTC on the 20th is already the 21st in Madrid
        let s = scheduler(1);
        let now = Utc.with_ymd_and_hms(2024, 6, 20, 23, 5, 0).unwrap();
        assert_eq!(
            s.decide(&ChannelState::default(), now),
            SchedulerDecision::DueNow { local_date: NaiveDate::from_ymd_opt(2024, 6, 21).unwrap() }
        );
    }

    #[test]
    fn channels_are_independent() {
        let daily = scheduler(9);
        let night = DeliveryScheduler::new(
            Channel::Night,
            ChannelConfig { target_hour: 21, window_minutes: 10 },
            Europe::Madrid,
        )
        .unwrap();
        let mut daily_state = ChannelState::default();
        daily_state.mark_sent(NaiveDate::from_ymd_opt(2024, 6, 21).unwrap());
        assert!(matches!(
            night.decide(&ChannelState::default(), madrid(21, 3)),
            SchedulerDecision::DueNow { .. }
        ));
        assert_eq!(daily.decide(&daily_state, madrid(21, 3)), SchedulerDecision::AlreadySentToday);
    }

    #[test]
    fn rejects_bad_hour() {
        let err = DeliveryScheduler::new(
            Channel::Daily,
            ChannelConfig { target_hour: 24, window_minutes: 10 },
            Europe::Madrid,
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::domain::error::ErrorKind::Configuration);
    }
}
