//! # Vocalis Reminders
//!
//! Reminder scheduling for the assistant:
//!
//! - [`spec`]: the pending [`ReminderSpec`] and its session encoding
//! - [`trigger`]: relative vs. absolute trigger computation, DST handling
//! - [`api`]: the reminder service seam plus HTTP and in-memory clients
//! - [`confirmation`]: the offer → yes/no state machine
//! - [`extraction`]: parsing the model's reminder suggestion

pub mod api;
pub mod confirmation;
pub mod extraction;
pub mod spec;
pub mod trigger;

pub use api::{HttpReminderApi, InMemoryReminderApi, RecordedReminder, ReminderApi};
pub use confirmation::{
    ConfirmOutcome, ConfirmSettings, ConfirmationState, confirm, decline, offer, state, take_pending,
};
pub use extraction::ReminderExtraction;
pub use spec::{Frequency, ReminderSpec, WeekdayCode};
pub use trigger::{Recurrence, Trigger, TriggerKind, compute_trigger};

use std::sync::Arc;
use vocalis_config::ReminderConfig;
use vocalis_core::error::ReminderError;

/// Build the configured reminder API; without an endpoint, a dry-run
/// in-memory API is used.
pub fn build_api(config: &ReminderConfig) -> Result<Arc<dyn ReminderApi>, ReminderError> {
    match &config.api_url {
        Some(url) => Ok(Arc::new(HttpReminderApi::new(
            url,
            config.api_token.clone().unwrap_or_default(),
            &config.locale,
        )?)),
        None => {
            tracing::info!("No reminder endpoint configured, reminders are dry-run");
            Ok(Arc::new(InMemoryReminderApi::new()))
        }
    }
}
