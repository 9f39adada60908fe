//! Smart-charging schedule composition.
//!
//! Charging profiles are stacked by `stackLevel`; composing two schedules
//! over a window gives the effective limit curve: the higher-priority
//! schedule wins over its footprint, the lower-priority one fills the rest.
//! Projection clips a single schedule to the window first, so composition
//! only ever reasons about in-window periods.

use chrono::{DateTime, Duration, Utc};
use tracing::trace;
use voltsim_types::v16::{
    ChargingProfile, ChargingProfileKind, ChargingSchedule, ChargingSchedulePeriod, RecurrencyKind,
};

/// Closed time window a composite schedule is requested over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ScheduleWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window of `duration_secs` starting at `start`.
    pub fn starting_at(start: DateTime<Utc>, duration_secs: i64) -> Self {
        Self { start, end: start + Duration::seconds(duration_secs) }
    }

    /// Inclusive containment on both bounds.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

/// A schedule whose bounds have been resolved against a window.
#[derive(Debug, Clone)]
struct Projected {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    schedule: ChargingSchedule,
}

/// Project one schedule onto the window, clipping its timing. Limits and
/// per-phase counts are never reinterpreted. Returns `None` when the
/// schedule lies entirely outside the window or has no start.
pub fn project_schedule(
    schedule: ChargingSchedule,
    window: &ScheduleWindow,
) -> Option<ChargingSchedule> {
    project(schedule, window).map(|p| p.schedule)
}

fn project(mut schedule: ChargingSchedule, window: &ScheduleWindow) -> Option<Projected> {
    let mut start = schedule.start_schedule?;
    let duration = schedule
        .duration
        .map(i64::from)
        .unwrap_or_else(|| (window.end - start).num_seconds().max(0));
    let end = start + Duration::seconds(duration);

    if end <= window.start || start >= window.end {
        return None;
    }

    schedule
        .charging_schedule_period
        .sort_by_key(|period| period.start_period);

    if start < window.start {
        let periods = &schedule.charging_schedule_period;
        let mut kept: Vec<ChargingSchedulePeriod> = Vec::with_capacity(periods.len());
        for (index, period) in periods.iter().enumerate() {
            let instant = start + Duration::seconds(period.start_period.into());
            let successor_inside = periods
                .get(index + 1)
                .map(|next| window.contains(start + Duration::seconds(next.start_period.into())))
                .unwrap_or(false);
            // Keep in-window periods, plus the one straddling the window
            // start so the clipped region opens with a defined limit.
            if window.contains(instant) || successor_inside {
                kept.push(*period);
            }
        }
        if let Some(first) = kept.first_mut() {
            if first.start_period != 0 {
                first.start_period = 0;
            }
        }
        schedule.charging_schedule_period = kept;
        schedule.start_schedule = Some(window.start);
        schedule.duration = Some((end - window.start).num_seconds() as i32);
        start = window.start;
    }

    if end > window.end {
        schedule.duration = Some((window.end - start).num_seconds() as i32);
        schedule.charging_schedule_period.retain(|period| {
            window.contains(start + Duration::seconds(period.start_period.into()))
        });
    }

    let end = end.min(window.end);
    Some(Projected { start, end, schedule })
}

/// Compose two stack entries over the window; `higher` is the
/// higher-priority one. `None` inputs degrade to projecting the other.
pub fn compose_schedules(
    higher: Option<ChargingSchedule>,
    lower: Option<ChargingSchedule>,
    window: &ScheduleWindow,
) -> Option<ChargingSchedule> {
    match (higher, lower) {
        (None, None) => None,
        (Some(single), None) | (None, Some(single)) => project_schedule(single, window),
        (Some(higher), Some(lower)) => {
            match (project(higher, window), project(lower, window)) {
                (None, None) => None,
                (Some(one), None) | (None, Some(one)) => Some(one.schedule),
                (Some(higher), Some(lower)) => Some(merge(higher, lower)),
            }
        }
    }
}

fn merge(higher: Projected, lower: Projected) -> ChargingSchedule {
    let higher_first = higher.start < lower.start;
    let union_start = higher.start.min(lower.start);
    let union_end = higher.end.max(lower.end);
    let higher_shift = (higher.start - union_start).num_seconds() as i32;
    let lower_shift = (lower.start - union_start).num_seconds() as i32;

    // Higher-priority periods always survive, re-keyed to the union start.
    let mut periods: Vec<ChargingSchedulePeriod> = higher
        .schedule
        .charging_schedule_period
        .iter()
        .map(|period| ChargingSchedulePeriod {
            start_period: period.start_period + higher_shift,
            ..*period
        })
        .collect();

    let overlap_start = higher.start.max(lower.start);
    let overlap_end = higher.end.min(lower.end);

    if overlap_start >= overlap_end {
        // Disjoint footprints: plain union.
        periods.extend(lower.schedule.charging_schedule_period.iter().map(|period| {
            ChargingSchedulePeriod { start_period: period.start_period + lower_shift, ..*period }
        }));
    } else {
        let overlap = ScheduleWindow::new(overlap_start, overlap_end);
        trace!(?overlap_start, ?overlap_end, higher_first, "composing overlapping schedules");

        let lower_periods = &lower.schedule.charging_schedule_period;
        let mut kept: Vec<ChargingSchedulePeriod> = Vec::with_capacity(lower_periods.len());
        for (index, period) in lower_periods.iter().enumerate() {
            let instant = lower.start + Duration::seconds(period.start_period.into());
            if overlap.contains(instant) {
                continue;
            }
            // Drop a period that would re-assert the lower limit right
            // before the higher-priority schedule takes over.
            let successor_inside = lower_periods
                .get(index + 1)
                .map(|next| {
                    overlap.contains(lower.start + Duration::seconds(next.start_period.into()))
                })
                .unwrap_or(false);
            if successor_inside {
                continue;
            }
            kept.push(ChargingSchedulePeriod {
                start_period: period.start_period + lower_shift,
                ..*period
            });
        }
        if !higher_first {
            if let Some(first) = kept.first_mut() {
                if first.start_period != 0 {
                    first.start_period = 0;
                }
            }
        }
        periods.extend(kept);
    }

    // Stable sort keeps higher-priority entries ahead on equal keys, so the
    // dedup below resolves collisions in the higher schedule's favor.
    periods.sort_by_key(|period| period.start_period);
    periods.dedup_by_key(|period| period.start_period);

    ChargingSchedule {
        duration: Some((union_end - union_start).num_seconds() as i32),
        start_schedule: Some(union_start),
        charging_rate_unit: higher.schedule.charging_rate_unit,
        charging_schedule_period: periods,
        min_charging_rate: None,
    }
}

/// Resolve a profile's schedule start against the current instant:
/// `Relative` anchors at now, `Recurring` advances to the latest occurrence
/// not after now, `Absolute` is used as-is.
pub fn anchor_schedule(profile: &ChargingProfile, now: DateTime<Utc>) -> ChargingSchedule {
    let mut schedule = profile.charging_schedule.clone();
    match profile.charging_profile_kind {
        ChargingProfileKind::Relative => schedule.start_schedule = Some(now),
        ChargingProfileKind::Absolute => {
            if schedule.start_schedule.is_none() {
                schedule.start_schedule = Some(now);
            }
        }
        ChargingProfileKind::Recurring => {
            if let (Some(start), Some(kind)) = (schedule.start_schedule, profile.recurrency_kind) {
                let step = match kind {
                    RecurrencyKind::Daily => Duration::days(1),
                    RecurrencyKind::Weekly => Duration::weeks(1),
                };
                if start <= now {
                    let occurrences = (now - start).num_seconds() / step.num_seconds();
                    schedule.start_schedule = Some(start + step * occurrences as i32);
                }
            }
        }
    }
    schedule
}

/// Stack every applicable profile over the window, highest stack level
/// first. Profiles outside their validity window are skipped.
pub fn composite_schedule(
    profiles: &[ChargingProfile],
    window: &ScheduleWindow,
    now: DateTime<Utc>,
) -> Option<ChargingSchedule> {
    let mut stacked: Vec<&ChargingProfile> = profiles
        .iter()
        .filter(|profile| {
            profile.valid_from.map_or(true, |from| from <= now)
                && profile.valid_to.map_or(true, |to| to >= now)
        })
        .collect();
    stacked.sort_by(|a, b| b.stack_level.cmp(&a.stack_level));

    let mut composite: Option<ChargingSchedule> = None;
    for profile in stacked {
        composite = compose_schedules(composite, Some(anchor_schedule(profile, now)), window);
    }
    composite
}

/// Effective limit of a schedule at an instant, if the schedule covers it.
pub fn limit_at(schedule: &ChargingSchedule, instant: DateTime<Utc>) -> Option<f64> {
    let start = schedule.start_schedule?;
    if instant < start {
        return None;
    }
    if let Some(duration) = schedule.duration {
        if instant > start + Duration::seconds(duration.into()) {
            return None;
        }
    }
    let offset = (instant - start).num_seconds();
    schedule
        .charging_schedule_period
        .iter()
        .filter(|period| i64::from(period.start_period) <= offset)
        .last()
        .map(|period| period.limit)
}
