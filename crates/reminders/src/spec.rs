//! Reminder specification and its session-attribute encoding.
//!
//! A pending reminder survives between two turns only inside the request's
//! session attributes, so the spec is written there key by key and read back
//! when the user answers the yes/no prompt.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use vocalis_core::error::ReminderError;
use vocalis_core::session::{AttributeValue, SessionAttributes};

pub const KEY_WAITING: &str = "waitingForReminderConfirmation";
pub const KEY_TOPIC: &str = "reminderTopic";
pub const KEY_SCHEDULE: &str = "reminderSchedule";
pub const KEY_IS_RECURRING: &str = "reminderIsRecurring";
pub const KEY_FREQUENCY: &str = "reminderFrequency";
pub const KEY_BY_DAYS: &str = "reminderByDays";

/// Spec keys, excluding the waiting flag.
pub(crate) const SPEC_KEYS: [&str; 5] = [
    KEY_TOPIC,
    KEY_SCHEDULE,
    KEY_IS_RECURRING,
    KEY_FREQUENCY,
    KEY_BY_DAYS,
];

/// Local date-time format used for schedules (`2026-01-09T14:00:00`).
pub const SCHEDULE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// ── Frequency ─────────────────────────────────────────────────────────────

/// Recurrence frequency as requested by the user.
///
/// Only `Daily` and `Weekly` can be scheduled; anything else is carried
/// verbatim until confirmation rejects it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Frequency {
    Daily,
    Weekly,
    Unsupported(String),
}

impl Frequency {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Self::Daily,
            "WEEKLY" => Self::Weekly,
            other => Self::Unsupported(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Unsupported(raw) => raw,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

impl From<String> for Frequency {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<Frequency> for String {
    fn from(f: Frequency) -> Self {
        f.as_str().to_string()
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Weekdays ──────────────────────────────────────────────────────────────

/// Two-letter weekday codes used by weekly recurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WeekdayCode {
    Mo,
    Tu,
    We,
    Th,
    Fr,
    Sa,
    Su,
}

impl WeekdayCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mo => "MO",
            Self::Tu => "TU",
            Self::We => "WE",
            Self::Th => "TH",
            Self::Fr => "FR",
            Self::Sa => "SA",
            Self::Su => "SU",
        }
    }
}

impl FromStr for WeekdayCode {
    type Err = ReminderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MO" => Ok(Self::Mo),
            "TU" => Ok(Self::Tu),
            "WE" => Ok(Self::We),
            "TH" => Ok(Self::Th),
            "FR" => Ok(Self::Fr),
            "SA" => Ok(Self::Sa),
            "SU" => Ok(Self::Su),
            other => Err(ReminderError::InvalidSchedule(format!(
                "unknown weekday code '{other}'"
            ))),
        }
    }
}

// ── ReminderSpec ──────────────────────────────────────────────────────────

/// A reminder the assistant has offered to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSpec {
    pub topic: String,

    /// Wall-clock time in the user's time zone
    pub scheduled_at: NaiveDateTime,

    pub is_recurring: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_days: Option<Vec<WeekdayCode>>,
}

impl ReminderSpec {
    pub fn one_time(topic: impl Into<String>, scheduled_at: NaiveDateTime) -> Self {
        Self {
            topic: topic.into(),
            scheduled_at,
            is_recurring: false,
            frequency: None,
            by_days: None,
        }
    }

    pub fn recurring(
        topic: impl Into<String>,
        scheduled_at: NaiveDateTime,
        frequency: Frequency,
        by_days: Option<Vec<WeekdayCode>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            scheduled_at,
            is_recurring: true,
            frequency: Some(frequency),
            by_days,
        }
    }

    /// Parse a local schedule string; seconds are optional.
    pub fn parse_schedule(raw: &str) -> Result<NaiveDateTime, ReminderError> {
        let raw = raw.trim();
        NaiveDateTime::parse_from_str(raw, SCHEDULE_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
            .map_err(|e| ReminderError::InvalidSchedule(format!("'{raw}': {e}")))
    }

    /// Write every spec key. Optional fields that are absent are removed.
    pub(crate) fn write_to(&self, attrs: &mut SessionAttributes) {
        attrs.set(KEY_TOPIC, self.topic.as_str());
        attrs.set(KEY_SCHEDULE, self.scheduled_at.format(SCHEDULE_FORMAT).to_string());
        attrs.set(KEY_IS_RECURRING, self.is_recurring);

        match &self.frequency {
            Some(f) => attrs.set(KEY_FREQUENCY, f.as_str()),
            None => {
                attrs.remove(KEY_FREQUENCY);
            }
        }
        match &self.by_days {
            Some(days) => attrs.set(
                KEY_BY_DAYS,
                days.iter().map(|d| d.as_str().to_string()).collect::<Vec<_>>(),
            ),
            None => {
                attrs.remove(KEY_BY_DAYS);
            }
        }
    }

    /// Read the spec keys back.
    ///
    /// `Ok(None)` when no spec key is present, `Err` with a reason when the
    /// keys are present but incomplete or malformed.
    pub(crate) fn read_from(attrs: &SessionAttributes) -> Result<Option<Self>, String> {
        if !SPEC_KEYS.iter().any(|k| attrs.contains(k)) {
            return Ok(None);
        }

        let topic = attrs
            .get(KEY_TOPIC)
            .and_then(AttributeValue::as_str)
            .ok_or("reminder topic missing")?;
        let schedule = attrs
            .get(KEY_SCHEDULE)
            .and_then(AttributeValue::as_str)
            .ok_or("reminder schedule missing")?;
        let scheduled_at = Self::parse_schedule(schedule).map_err(|e| e.to_string())?;

        let is_recurring = attrs
            .get(KEY_IS_RECURRING)
            .and_then(AttributeValue::as_bool)
            .unwrap_or(false);
        let frequency = attrs
            .get(KEY_FREQUENCY)
            .and_then(AttributeValue::as_str)
            .map(Frequency::parse);
        let by_days = attrs
            .get(KEY_BY_DAYS)
            .and_then(AttributeValue::as_list)
            .map(|days| {
                days.iter()
                    .map(|d| d.parse::<WeekdayCode>())
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()
            .map_err(|e| e.to_string())?;

        Ok(Some(Self {
            topic: topic.to_string(),
            scheduled_at,
            is_recurring,
            frequency,
            by_days,
        }))
    }
}
