use std::time::Duration as StdDuration;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::error::{parse_timezone, SolarError};
use crate::domain::store::UserStore;
use crate::domain::user::{Channel, UserRecord};
use crate::notify::telegram::{NotifyError, Notifier};
use crate::predictors::windows::{find_bands, DailyWindows, WindowOutcome};
use crate::scheduler::delivery::{DeliveryScheduler, SchedulerDecision};
use crate::scheduler::location::effective_location;
use crate::utils::config::Settings;

#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Solar(#[from] SolarError),
    #[error("send failed: {0}")]
    Notify(#[from] NotifyError),
    #[error("storage error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum ChannelOutcome {
    Sent,
    Skipped,
}

/// One poll: walks every subscriber and channel, sending what is due.
///
/// A failure for one user is logged and counted; it never stops the batch.
/// Only listing users can fail the whole tick.
pub async fn run_tick<S, N>(store: &S, notifier: &N, settings: &Settings, now: DateTime<Utc>) -> Result<TickReport, S::Error>
where
    S: UserStore,
    N: Notifier,
{
    let users = store.list_users()?;
    let mut report = TickReport::default();

    for user in &users {
        if settings.only_chat_id.as_deref().is_some_and(|only| only != user.chat_id) {
            continue;
        }
        for channel in Channel::ALL {
            match process_channel(store, notifier, settings, user, channel, now).await {
                Ok(ChannelOutcome::Sent) => report.sent += 1,
                Ok(ChannelOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(chat_id = %user.chat_id, %channel, error = %e, "Delivery failed");
                }
            }
        }
    }

    info!(users = users.len(), sent = report.sent, failed = report.failed, "Poll tick finished");
    Ok(report)
}

async fn process_channel<S, N>(
    store: &S,
    notifier: &N,
    settings: &Settings,
    user: &UserRecord,
    channel: Channel,
    now: DateTime<Utc>,
) -> Result<ChannelOutcome, TickError>
where
    S: UserStore,
    N: Notifier,
{
    let tz = parse_timezone(&user.tz)?;
    let channel_settings = user.channel(channel);
    let scheduler = DeliveryScheduler::new(channel, channel_settings.config, tz)?;

    let local_date = match scheduler.decide(&channel_settings.state, now) {
        SchedulerDecision::DueNow { local_date } => local_date,
        other => {
            debug!(chat_id = %user.chat_id, channel = %scheduler.channel, decision = ?other, "Not sending");
            return Ok(ChannelOutcome::Skipped);
        }
    };

    let text = match channel {
        Channel::Daily => compose_daily(user, settings, now)?,
        Channel::Night => compose_night(),
    };

    notifier.send(&user.chat_id, &text).await?;

    let moved = store
        .mark_sent(&user.chat_id, channel, channel_settings.state.last_sent_local_date, local_date)
        .map_err(|e| TickError::Store(Box::new(e)))?;
    if moved {
        info!(chat_id = %user.chat_id, %channel, %local_date, "Delivered");
    } else {
        warn!(chat_id = %user.chat_id, %channel, %local_date, "Sent but marker changed concurrently");
    }
    Ok(ChannelOutcome::Sent)
}

fn compose_daily(user: &UserRecord, settings: &Settings, now: DateTime<Utc>) -> Result<String, SolarError> {
    let Some(loc) = effective_location(user, now) else {
        return Ok("I don't have a location for you yet. Share one to get today's sun windows.".to_string());
    };
    let tz = parse_timezone(&loc.tz)?;
    let date: NaiveDate = now.with_timezone(&tz).date_naive();
    let windows = find_bands(loc.point.lat, loc.point.lon, date, &tz, settings.band(), settings.step_minutes)?;

    let place = loc.label.as_deref().unwrap_or("your location");
    let mut text = describe_windows(&windows, place);
    if loc.is_temporary {
        text.push_str("\n(temporary location active)");
    }
    Ok(text)
}

fn compose_night() -> String {
    "Evening wind-down: dim the lights, put screens away, keep the bedroom cool and dark.".to_string()
}

pub fn describe_windows(windows: &DailyWindows, place: &str) -> String {
    let band = windows.band;
    let mut text = format!("Sun between {}° and {}° today in {place}:", band.low, band.high);
    for (name, w) in [("Morning", &windows.morning), ("Afternoon", &windows.afternoon)] {
        if let Some(w) = w {
            text.push_str(&format!("\n{name} {}-{}", w.start.format("%H:%M"), w.end.format("%H:%M")));
        }
    }
    match windows.outcome() {
        WindowOutcome::Available => {}
        WindowOutcome::BelowBand => text.push_str(&format!(
            "\nThe sun stays below {}° today (max {:.1}°).",
            band.low, windows.max_elevation_deg
        )),
        WindowOutcome::FilteredByPolicy => text.push_str("\nNo usable window today."),
    }
    text.push_str(&format!(
        "\nSolar noon {} (max {:.1}°)",
        windows.solar_noon_local.format("%H:%M"),
        windows.max_elevation_deg
    ));
    text
}

/// Runs `run_tick` every `poll_interval_secs` until the future is dropped.
pub async fn run_poller<S, N>(store: S, notifier: N, settings: Settings)
where
    S: UserStore,
    N: Notifier,
{
    let mut interval = tokio::time::interval(StdDuration::from_secs(settings.poll_interval_secs.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(e) = run_tick(&store, &notifier, &settings, Utc::now()).await {
            tracing::error!(error = %e, "Could not load users for this tick");
        }
    }
}
