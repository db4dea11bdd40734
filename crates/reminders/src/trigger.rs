//! Trigger computation.
//!
//! Turns a [`ReminderSpec`] into the trigger the reminder API expects:
//!
//! - one-time reminders due within `max_relative_secs` use a relative offset
//! - later one-time reminders and every recurring one use an absolute local
//!   time plus time zone
//! - a one-time schedule that already passed today is moved to tomorrow
//!
//! Local times are resolved in the user's zone. An ambiguous time (clocks
//! going back) resolves to its earliest instant; a time inside a gap (clocks
//! going forward) is shifted forward by one hour.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vocalis_core::error::ReminderError;

use crate::spec::{Frequency, ReminderSpec, WeekdayCode};

/// Default upper bound for relative triggers: 48 hours.
pub const MAX_RELATIVE_SECS: i64 = 172_800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Relative,
    Absolute,
}

/// Repetition of an absolute trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    #[serde(rename = "freq")]
    pub frequency: Frequency,

    #[serde(rename = "byDay", default, skip_serializing_if = "Vec::is_empty")]
    pub by_days: Vec<WeekdayCode>,
}

/// When a reminder fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Trigger {
    #[serde(rename = "SCHEDULED_RELATIVE")]
    Relative {
        #[serde(rename = "offsetInSeconds")]
        offset_seconds: i64,
    },

    #[serde(rename = "SCHEDULED_ABSOLUTE")]
    Absolute {
        #[serde(rename = "scheduledTime")]
        scheduled_at: NaiveDateTime,
        #[serde(rename = "timeZoneId")]
        time_zone: Tz,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recurrence: Option<Recurrence>,
    },
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::Relative { .. } => TriggerKind::Relative,
            Self::Absolute { .. } => TriggerKind::Absolute,
        }
    }

    pub fn recurrence(&self) -> Option<&Recurrence> {
        match self {
            Self::Absolute { recurrence, .. } => recurrence.as_ref(),
            Self::Relative { .. } => None,
        }
    }
}

/// Resolve a wall-clock time in `tz` to an instant.
pub fn resolve_local(local: NaiveDateTime, tz: Tz) -> Result<DateTime<Tz>, ReminderError> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(t) => Ok(t),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => {
            let shifted = local + Duration::hours(1);
            tz.from_local_datetime(&shifted).earliest().ok_or_else(|| {
                ReminderError::InvalidSchedule(format!("{local} does not exist in {tz}"))
            })
        }
    }
}

fn seconds_until(local: NaiveDateTime, tz: Tz, now: DateTime<Utc>) -> Result<i64, ReminderError> {
    let scheduled = resolve_local(local, tz)?;
    let delta = scheduled.with_timezone(&Utc) - now;
    debug!(now = %now, scheduled = %scheduled, seconds = delta.num_seconds(), "Trigger delta computed");
    Ok(delta.num_seconds())
}

/// Compute the trigger for `spec` as seen at `now` by a user in `tz`.
pub fn compute_trigger(
    spec: &ReminderSpec,
    now: DateTime<Utc>,
    tz: Tz,
    max_relative_secs: i64,
) -> Result<Trigger, ReminderError> {
    if spec.is_recurring {
        let frequency = match &spec.frequency {
            Some(Frequency::Unsupported(raw)) => {
                return Err(ReminderError::UnsupportedRecurrence(raw.clone()));
            }
            None => return Err(ReminderError::UnsupportedRecurrence("unspecified".into())),
            Some(f) => f.clone(),
        };

        info!(scheduled_at = %spec.scheduled_at, time_zone = %tz, frequency = %frequency, "Using recurring absolute trigger");
        return Ok(Trigger::Absolute {
            scheduled_at: spec.scheduled_at,
            time_zone: tz,
            recurrence: Some(Recurrence {
                frequency,
                by_days: spec.by_days.clone().unwrap_or_default(),
            }),
        });
    }

    let mut scheduled_at = spec.scheduled_at;
    let mut delta = seconds_until(scheduled_at, tz, now)?;

    if delta <= 0 {
        scheduled_at += Duration::days(1);
        delta = seconds_until(scheduled_at, tz, now)?;
        if delta <= 0 {
            return Err(ReminderError::ScheduleInPast(spec.scheduled_at.to_string()));
        }
        info!(scheduled_at = %scheduled_at, "Adjusted past time to tomorrow");
    }

    if delta <= max_relative_secs {
        info!(offset_seconds = delta, "Using relative trigger");
        Ok(Trigger::Relative {
            offset_seconds: delta,
        })
    } else {
        info!(scheduled_at = %scheduled_at, time_zone = %tz, "Using absolute trigger");
        Ok(Trigger::Absolute {
            scheduled_at,
            time_zone: tz,
            recurrence: None,
        })
    }
}
