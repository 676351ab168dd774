use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use tracing::debug;

use crate::domain::error::{validate_coordinates, SolarError};
use crate::domain::solar::SolarDay;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Inclusive elevation range of interest, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationBand {
    pub low: f64,
    pub high: f64,
}

impl Default for ElevationBand {
    fn default() -> Self {
        Self { low: 30.0, high: 40.0 }
    }
}

impl ElevationBand {
    pub fn validate(&self) -> Result<(), SolarError> {
        let ok = self.low.is_finite()
            && self.high.is_finite()
            && self.low < self.high
            && self.low >= -90.0
            && self.high <= 90.0;
        if ok {
            Ok(())
        } else {
            Err(SolarError::InvalidBand { low: self.low, high: self.high })
        }
    }

    pub fn contains(&self, elevation: f64) -> bool {
        elevation >= self.low && elevation <= self.high
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeWindow {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    /// At least one side has a window.
    Available,
    /// The sun never reaches the bottom of the band.
    BelowBand,
    /// The sun reached the band but no window survived.
    FilteredByPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyWindows {
    pub morning: Option<TimeWindow>,
    pub afternoon: Option<TimeWindow>,
    pub solar_noon_local: DateTime<Tz>,
    pub max_elevation_deg: f64,
    pub band: ElevationBand,
}

impl DailyWindows {
    pub fn outcome(&self) -> WindowOutcome {
        if self.morning.is_some() || self.afternoon.is_some() {
            WindowOutcome::Available
        } else if self.max_elevation_deg < self.band.low {
            WindowOutcome::BelowBand
        } else {
            WindowOutcome::FilteredByPolicy
        }
    }
}

/// Interval in clock minutes after local midnight.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Span {
    start: f64,
    end: f64,
}

/// Find the local clock intervals during which solar elevation stays within
/// `band`, split into the window closest to solar noon on each side.
///
/// Elevation is sampled every `step_minutes` over the civil day, plus solar
/// noon and solar midnight, so it is monotonic between any two neighbouring
/// samples. Each band edge is then narrowed against the model itself; a band
/// entered and left within one step is still reported.
pub fn find_bands(
    lat: f64,
    lon: f64,
    date: NaiveDate,
    tz: &Tz,
    band: ElevationBand,
    step_minutes: u32,
) -> Result<DailyWindows, SolarError> {
    validate_coordinates(lat, lon)?;
    band.validate()?;
    if !(1..=60).contains(&step_minutes) {
        return Err(SolarError::InvalidStep { value: step_minutes });
    }

    let day = SolarDay::new(date, lon, tz)?;
    let noon = day.solar_noon_hours() * 60.0;
    let elevation = |minutes: f64| day.elevation_at(lat, minutes / 60.0);

    let mut times: Vec<f64> = (0..MINUTES_PER_DAY).step_by(step_minutes as usize).map(f64::from).collect();
    for turning in [noon - 720.0, noon, noon + 720.0] {
        if (0.0..MINUTES_PER_DAY as f64).contains(&turning) {
            times.push(turning);
        }
    }
    times.sort_by(f64::total_cmp);
    times.dedup();

    let samples = times
        .iter()
        .map(|&t| Ok((t, elevation(t)?)))
        .collect::<Result<Vec<(f64, f64)>, SolarError>>()?;

    let max_elevation_deg = samples
        .iter()
        .map(|&(_, el)| el)
        .fold(f64::NEG_INFINITY, f64::max);

    let spans = band_spans(&samples, band, &elevation)?;
    let (morning, afternoon) = pick_sides(&spans, noon);

    debug!(
        %date,
        lat,
        lon,
        step_minutes,
        spans = spans.len(),
        max_elevation_deg,
        "Computed elevation band windows"
    );

    let to_window = |s: Span| TimeWindow {
        start: day.localize(tz, s.start),
        end: day.localize(tz, s.end),
    };

    Ok(DailyWindows {
        morning: morning.map(to_window),
        afternoon: afternoon.map(to_window),
        solar_noon_local: day.localize(tz, noon),
        max_elevation_deg,
        band,
    })
}

const CROSSING_TOLERANCE_DEG: f64 = 1e-6;
const CROSSING_MAX_ITERATIONS: u32 = 60;

/// Instant in `[t0, t1]` where elevation meets `threshold`.
///
/// Starts from the linear estimate between the two samples and bisects the
/// bracket until the model is within `CROSSING_TOLERANCE_DEG`. Elevation must
/// be monotonic on the interval and the samples must lie on opposite sides.
fn crossing<F>(elevation: &F, (t0, e0): (f64, f64), (t1, e1): (f64, f64), threshold: f64) -> Result<f64, SolarError>
where
    F: Fn(f64) -> Result<f64, SolarError>,
{
    if e1 == e0 {
        return Ok(t0);
    }
    let rising = e1 > e0;
    let (mut lo, mut hi) = (t0, t1);
    let mut t = t0 + (threshold - e0) / (e1 - e0) * (t1 - t0);
    for _ in 0..CROSSING_MAX_ITERATIONS {
        let el = elevation(t)?;
        if (el - threshold).abs() < CROSSING_TOLERANCE_DEG {
            return Ok(t);
        }
        if (el < threshold) == rising {
            lo = t;
        } else {
            hi = t;
        }
        t = 0.5 * (lo + hi);
    }
    Ok(t)
}

fn band_spans<F>(samples: &[(f64, f64)], band: ElevationBand, elevation: &F) -> Result<Vec<Span>, SolarError>
where
    F: Fn(f64) -> Result<f64, SolarError>,
{
    let mut spans = Vec::new();
    let mut push = |start: f64, end: f64| {
        if start < end {
            spans.push(Span { start, end });
        }
    };

    let mut current_start: Option<f64> = match samples.first() {
        Some(&(t, el)) if band.contains(el) => Some(t),
        _ => None,
    };

    for pair in samples.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let (e0, e1) = (a.1, b.1);
        match (band.contains(e0), band.contains(e1)) {
            (false, true) => {
                let threshold = if e0 < band.low { band.low } else { band.high };
                current_start = Some(crossing(elevation, a, b, threshold)?);
            }
            (true, false) => {
                let threshold = if e1 < band.low { band.low } else { band.high };
                if let Some(start) = current_start.take() {
                    push(start, crossing(elevation, a, b, threshold)?);
                }
            }
            (false, false) => {
                // whole band traversed between two samples
                if e0 < band.low && e1 > band.high {
                    push(crossing(elevation, a, b, band.low)?, crossing(elevation, a, b, band.high)?);
                } else if e0 > band.high && e1 < band.low {
                    push(crossing(elevation, a, b, band.high)?, crossing(elevation, a, b, band.low)?);
                }
            }
            (true, true) => {}
        }
    }

    if let (Some(start), Some(&(t_last, _))) = (current_start, samples.last()) {
        push(start, t_last);
    }

    Ok(spans)
}

/// Assigns spans to the morning or afternoon side of `noon`, splitting any
/// span that straddles it, and keeps the one nearest to noon on each side.
fn pick_sides(spans: &[Span], noon: f64) -> (Option<Span>, Option<Span>) {
    let mut morning: Option<Span> = None;
    let mut afternoon: Option<Span> = None;

    for s in spans {
        let before = Span { start: s.start, end: s.end.min(noon) };
        let after = Span { start: s.start.max(noon), end: s.end };

        if before.start < before.end && morning.map_or(true, |m| before.end > m.end) {
            morning = Some(before);
        }
        if after.start < after.end && afternoon.map_or(true, |a| after.start < a.start) {
            afternoon = Some(after);
        }
    }

    (morning, afternoon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::solar::clock_hours;
    use chrono::Timelike;
    use chrono_tz::Europe;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn minutes_of(dt: &DateTime<Tz>) -> f64 {
        clock_hours(dt.time()) * 60.0
    }

    #[test]
    fn malaga_summer_solstice() {
        let d = date(2024, 6, 21);
        let w = find_bands(36.7213, -4.4214, d, &Europe::Madrid, ElevationBand::default(), 1).unwrap();

        assert!(w.max_elevation_deg > 76.0 && w.max_elevation_deg < 77.0, "{}", w.max_elevation_deg);
        assert_eq!(w.outcome(), WindowOutcome::Available);

        let noon = minutes_of(&w.solar_noon_local);
        assert!(noon > 13.0 * 60.0 + 45.0 && noon < 14.0 * 60.0 + 30.0, "noon {noon}");

        let morning = w.morning.clone().expect("morning window");
        let afternoon = w.afternoon.clone().expect("afternoon window");
        assert!(morning.start < morning.end);
        assert!(afternoon.start < afternoon.end);
        assert!(morning.end < w.solar_noon_local && afternoon.start > w.solar_noon_local);

        let lead = noon - minutes_of(&morning.end);
        let lag = minutes_of(&afternoon.start) - noon;
        assert!((lead - lag).abs() < 1.0, "lead {lead} lag {lag}");
        let lead = noon - minutes_of(&morning.start);
        let lag = minutes_of(&afternoon.end) - noon;
        assert!((lead - lag).abs() < 1.0, "lead {lead} lag {lag}");
    }

    #[test]
    fn endpoints_sit_on_thresholds() {
        let d = date(2024, 6, 21);
        let day = SolarDay::new(d, -4.4214, &Europe::Madrid).unwrap();
        for step in 1..=60 {
            let w = find_bands(36.7213, -4.4214, d, &Europe::Madrid, ElevationBand::default(), step).unwrap();
            for win in [w.morning.unwrap(), w.afternoon.unwrap()] {
                for edge in [win.start, win.end] {
                    let el = day.elevation_at(36.7213, clock_hours(edge.time())).unwrap();
                    let off = (el - 30.0).abs().min((el - 40.0).abs());
                    assert!(off < 0.01, "step {step}: {edge} at {el}");
                }
            }
        }
    }

    #[test]
    fn arctic_winter_has_no_windows() {
        let w = find_bands(66.5, 25.7, date(2024, 12, 21), &Europe::Helsinki, ElevationBand::default(), 1).unwrap();
        assert!(w.max_elevation_deg < 30.0);
        assert!(w.morning.is_none() && w.afternoon.is_none());
        assert_eq!(w.outcome(), WindowOutcome::BelowBand);
    }

    #[test]
    fn low_sun_days_return_nothing() {
        for (lat, m) in [(55.0, 12), (-70.0, 6), (80.0, 3)] {
            let w = find_bands(lat, 10.0, date(2024, m, 21), &Europe::Oslo, ElevationBand::default(), 5).unwrap();
            if w.max_elevation_deg < 30.0 {
                assert!(w.morning.is_none() && w.afternoon.is_none(), "lat {lat}");
            }
        }
    }

    #[test]
    fn solar_noon_ignores_step() {
        let d = date(2024, 9, 2);
        let a = find_bands(40.4, -3.7, d, &Europe::Madrid, ElevationBand::default(), 1).unwrap();
        let b = find_bands(40.4, -3.7, d, &Europe::Madrid, ElevationBand::default(), 17).unwrap();
        assert_eq!(a.solar_noon_local, b.solar_noon_local);
    }

    #[test]
    fn band_straddling_noon_is_split() {
        // peak elevation around 36.5 degrees
        let d = date(2024, 12, 21);
        let w = find_bands(30.0, -4.4214, d, &Europe::Madrid, ElevationBand::default(), 1).unwrap();
        let morning = w.morning.unwrap();
        let afternoon = w.afternoon.unwrap();
        assert_eq!(morning.end, w.solar_noon_local);
        assert_eq!(afternoon.start, w.solar_noon_local);
    }

    #[test]
    fn deterministic_on_dst_change_day() {
        let d = date(2024, 3, 31);
        let a = find_bands(36.7213, -4.4214, d, &Europe::Madrid, ElevationBand::default(), 1).unwrap();
        let b = find_bands(36.7213, -4.4214, d, &Europe::Madrid, ElevationBand::default(), 1).unwrap();
        assert_eq!(a, b);
        let m = a.morning.unwrap();
        assert!(m.start < m.end);
        assert_eq!(m.start.hour(), 10);
    }

    #[test]
    fn invalid_inputs_fail_before_sampling() {
        let d = date(2024, 6, 21);
        let band = ElevationBand::default();
        assert!(matches!(
            find_bands(91.0, 0.0, d, &Europe::Madrid, band, 1),
            Err(SolarError::InvalidLatitude { .. })
        ));
        assert!(matches!(
            find_bands(0.0, f64::NAN, d, &Europe::Madrid, band, 1),
            Err(SolarError::InvalidLongitude { .. })
        ));
        assert!(matches!(
            find_bands(0.0, 0.0, d, &Europe::Madrid, ElevationBand { low: 40.0, high: 30.0 }, 1),
            Err(SolarError::InvalidBand { .. })
        ));
        assert!(matches!(
            find_bands(0.0, 0.0, d, &Europe::Madrid, band, 0),
            Err(SolarError::InvalidStep { value: 0 })
        ));
    }

    #[test]
    fn short_band_inside_one_step_is_found() {
        let band = ElevationBand::default();
        let samples = [(0.0, 20.0), (60.0, 50.0)];
        let spans = band_spans(&samples, band, &|t: f64| Ok(20.0 + t * 0.5)).unwrap();
        assert_eq!(spans.len(), 1);
        assert!((spans[0].start - 20.0).abs() < 1e-4);
        assert!((spans[0].end - 40.0).abs() < 1e-4);
    }

    #[test]
    fn crossing_follows_curved_elevation() {
        // linear interpolation between the samples would give 30 minutes
        let curve = |t: f64| Ok(t * t / 90.0);
        let t = crossing(&curve, (0.0, 0.0), (60.0, 40.0), 20.0).unwrap();
        assert!((curve(t).unwrap() - 20.0).abs() < 1e-4, "{t}");
        assert!((t - 1800.0f64.sqrt()).abs() < 1e-3);
    }

    #[test]
    fn coarse_step_keeps_peak_inside_low_band() {
        // peak barely above 30 degrees; hourly samples straddle the top of the arc
        let d = date(2024, 12, 21);
        let fine = find_bands(36.4, -4.4214, d, &Europe::Madrid, ElevationBand::default(), 1).unwrap();
        let coarse = find_bands(36.4, -4.4214, d, &Europe::Madrid, ElevationBand::default(), 60).unwrap();
        assert!(fine.max_elevation_deg > 30.0 && fine.max_elevation_deg < 30.5, "{}", fine.max_elevation_deg);

        for w in [&fine, &coarse] {
            let morning = w.morning.clone().expect("morning half");
            let afternoon = w.afternoon.clone().expect("afternoon half");
            assert_eq!(morning.end, w.solar_noon_local);
            assert_eq!(afternoon.start, w.solar_noon_local);
        }
        let fm = fine.morning.unwrap();
        let cm = coarse.morning.unwrap();
        assert!((fm.start - cm.start).num_seconds().abs() <= 1);
        let fa = fine.afternoon.unwrap();
        let ca = coarse.afternoon.unwrap();
        assert!((fa.end - ca.end).num_seconds().abs() <= 1);
    }

    #[test]
    fn nearest_span_to_noon_wins_per_side() {
        let spans = [
            Span { start: 100.0, end: 200.0 },
            Span { start: 300.0, end: 400.0 },
            Span { start: 800.0, end: 900.0 },
            Span { start: 1000.0, end: 1100.0 },
        ];
        let (m, a) = pick_sides(&spans, 600.0);
        assert_eq!(m, Some(Span { start: 300.0, end: 400.0 }));
        assert_eq!(a, Some(Span { start: 800.0, end: 900.0 }));
    }
}
