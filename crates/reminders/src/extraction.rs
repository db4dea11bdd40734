//! Parsing of the model's "remember" analysis.
//!
//! When the user asks the assistant to remember something, the model answers
//! with a JSON object holding the spoken confirmation plus, optionally, a
//! reminder suggestion. Models sometimes wrap the object in prose or code
//! fences; only the outermost `{...}` is parsed.

use serde::Deserialize;
use tracing::warn;

use crate::spec::{Frequency, ReminderSpec, WeekdayCode};

/// The JSON contract the model is asked to follow.
pub const EXTRACTION_FORMAT: &str = r#"{
    "answer": "Confirmation message to user",
    "suggest_reminder": boolean,
    "reminder_topic": "short topic without schedule details",
    "schedule": "YYYY-MM-DDTHH:MM:SS or empty",
    "is_recurring": boolean,
    "frequency": "DAILY/WEEKLY or null",
    "by_days": ["MO"] or null,
    "memory_stored": boolean
}"#;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReminderExtraction {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub suggest_reminder: bool,
    #[serde(default)]
    pub reminder_topic: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub by_days: Option<Vec<String>>,
    #[serde(default)]
    pub memory_stored: bool,
}

impl ReminderExtraction {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let json = match (raw.find('{'), raw.rfind('}')) {
            (Some(start), Some(end)) if start < end => &raw[start..=end],
            _ => raw,
        };
        serde_json::from_str(json)
    }

    /// The suggested reminder, if the suggestion is usable.
    pub fn reminder_spec(&self) -> Option<ReminderSpec> {
        if !self.suggest_reminder {
            return None;
        }

        let schedule = self.schedule.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let scheduled_at = match ReminderSpec::parse_schedule(schedule) {
            Ok(at) => at,
            Err(e) => {
                warn!(error = %e, "Ignoring reminder suggestion with bad schedule");
                return None;
            }
        };

        let Some(topic) = self
            .reminder_topic
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        else {
            warn!("Ignoring reminder suggestion without a topic");
            return None;
        };

        let by_days = self.by_days.as_ref().map(|days| {
            days.iter()
                .filter_map(|d| match d.parse::<WeekdayCode>() {
                    Ok(code) => Some(code),
                    Err(e) => {
                        warn!(error = %e, "Dropping weekday code");
                        None
                    }
                })
                .collect::<Vec<_>>()
        });

        Some(ReminderSpec {
            topic: topic.to_string(),
            scheduled_at,
            is_recurring: self.is_recurring,
            frequency: self.frequency.as_deref().map(Frequency::parse),
            by_days: by_days.filter(|d| !d.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_one_time_suggestion() {
        let raw = r#"{
            "answer": "Certainly, I've noted your dentist appointment.",
            "suggest_reminder": true,
            "reminder_topic": "Dentist appointment",
            "schedule": "2026-01-09T14:00:00",
            "is_recurring": false,
            "frequency": null,
            "by_days": null,
            "memory_stored": true
        }"#;
        let extraction = ReminderExtraction::parse(raw).unwrap();
        assert!(extraction.memory_stored);

        let spec = extraction.reminder_spec().unwrap();
        assert_eq!(spec.topic, "Dentist appointment");
        assert!(!spec.is_recurring);
        assert_eq!(spec.frequency, None);
    }

    #[test]
    fn tolerates_code_fences() {
        let raw = "```json\n{\"answer\": \"Noted.\", \"suggest_reminder\": false}\n```";
        let extraction = ReminderExtraction::parse(raw).unwrap();
        assert_eq!(extraction.answer, "Noted.");
        assert!(extraction.reminder_spec().is_none());
    }

    #[test]
    fn keeps_unsupported_frequency_for_later_rejection() {
        let raw = r#"{"answer":"ok","suggest_reminder":true,"reminder_topic":"Rent",
            "schedule":"2026-02-01T09:00:00","is_recurring":true,"frequency":"MONTHLY"}"#;
        let spec = ReminderExtraction::parse(raw).unwrap().reminder_spec().unwrap();
        assert_eq!(spec.frequency, Some(Frequency::Unsupported("MONTHLY".into())));
    }

    #[test]
    fn weekly_days_are_parsed() {
        let raw = r#"{"answer":"ok","suggest_reminder":true,"reminder_topic":"Gym",
            "schedule":"2026-02-02T07:00","is_recurring":true,"frequency":"WEEKLY",
            "by_days":["MO","XX","TH"]}"#;
        let spec = ReminderExtraction::parse(raw).unwrap().reminder_spec().unwrap();
        assert_eq!(spec.by_days, Some(vec![WeekdayCode::Mo, WeekdayCode::Th]));
    }

    #[test]
    fn unusable_suggestions_are_dropped() {
        let no_schedule = r#"{"answer":"ok","suggest_reminder":true,"reminder_topic":"X","schedule":""}"#;
        assert!(ReminderExtraction::parse(no_schedule).unwrap().reminder_spec().is_none());

        let no_topic = r#"{"answer":"ok","suggest_reminder":true,"schedule":"2026-02-02T07:00:00"}"#;
        assert!(ReminderExtraction::parse(no_topic).unwrap().reminder_spec().is_none());

        assert!(ReminderExtraction::parse("I remembered it!").is_err());
    }
}
