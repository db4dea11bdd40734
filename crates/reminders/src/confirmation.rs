//! Two-phase reminder confirmation.
//!
//! ```text
//!            offer()                     confirm() / decline()
//!   Idle ─────────────▶ AwaitingConfirmation ─────────────────────▶ Idle
//! ```
//!
//! The state lives entirely in the session attributes: the waiting flag plus
//! the `ReminderSpec` keys. `confirm` reads and clears them before doing anything else,
//! so a pending reminder is acted on at most once even if the user says "yes" twice.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};
use vocalis_config::ReminderConfig;
use vocalis_core::Error;
use vocalis_core::error::ReminderError;
use vocalis_core::session::{AttributeValue, SessionAttributes};

use crate::api::ReminderApi;
use crate::spec::{KEY_WAITING, ReminderSpec, SPEC_KEYS};
use crate::trigger::{MAX_RELATIVE_SECS, Trigger, compute_trigger};

const OFFER_SUFFIX: &str = "Would you like me to set up a reminder for this?";
const DECLINE_ACK: &str = "Understood. No reminder will be set.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationState {
    Idle,
    AwaitingConfirmation,
}

/// Knobs for [`confirm`].
#[derive(Debug, Clone)]
pub struct ConfirmSettings {
    /// Upper bound for every reminder API call
    pub timeout: Duration,
    pub max_relative_secs: i64,
}

impl Default for ConfirmSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_relative_secs: MAX_RELATIVE_SECS,
        }
    }
}

impl From<&ReminderConfig> for ConfirmSettings {
    fn from(config: &ReminderConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            max_relative_secs: config.max_relative_secs,
        }
    }
}

/// Result of a confirmed reminder.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    Created { token: String, trigger: Trigger },
    /// The user must grant reminder permission first; nothing was created
    PermissionRequired,
    /// There was no pending reminder to confirm
    NothingPending,
}

impl ConfirmOutcome {
    /// What to say back to the user.
    pub fn speech(&self) -> &'static str {
        match self {
            Self::Created { .. } => "Perfect! I've set up your reminder.",
            Self::PermissionRequired => {
                "I need permission to create reminders. Please enable the Reminders \
                 permission in your companion app, then ask me to set the reminder again."
            }
            Self::NothingPending => "I'm not sure what you're confirming. Please start over.",
        }
    }
}

fn waiting_flag(attrs: &SessionAttributes) -> bool {
    attrs.get(KEY_WAITING).and_then(AttributeValue::as_bool) == Some(true)
}

fn clear(attrs: &mut SessionAttributes) {
    attrs.remove(KEY_WAITING);
    for key in SPEC_KEYS {
        attrs.remove(key);
    }
}

fn inconsistent(reason: &str) {
    let err = Error::InconsistentSessionState(reason.to_string());
    warn!(error = %err, "Treating reminder session as idle");
}

/// Derive the confirmation state from the session attributes.
pub fn state(attrs: &SessionAttributes) -> ConfirmationState {
    match (waiting_flag(attrs), ReminderSpec::read_from(attrs)) {
        (true, Ok(Some(_))) => ConfirmationState::AwaitingConfirmation,
        (false, Ok(None)) => ConfirmationState::Idle,
        (true, Ok(None)) => {
            inconsistent("waiting for confirmation without a reminder");
            ConfirmationState::Idle
        }
        (false, Ok(Some(_))) => {
            inconsistent("reminder present without the waiting flag");
            ConfirmationState::Idle
        }
        (_, Err(reason)) => {
            inconsistent(&reason);
            ConfirmationState::Idle
        }
    }
}

/// Offer a reminder: store it as pending and return the yes/no prompt.
pub fn offer(attrs: &mut SessionAttributes, spec: &ReminderSpec, answer: &str) -> String {
    spec.write_to(attrs);
    attrs.set(KEY_WAITING, true);
    info!(topic = %spec.topic, scheduled_at = %spec.scheduled_at, "Offered reminder");

    let answer = answer.trim();
    if answer.is_empty() {
        OFFER_SUFFIX.to_string()
    } else {
        format!("{answer} {OFFER_SUFFIX}")
    }
}

/// The user said no: drop the pending reminder.
pub fn decline(attrs: &mut SessionAttributes) -> String {
    if let Ok(Some(spec)) = ReminderSpec::read_from(attrs) {
        info!(topic = %spec.topic, "User declined reminder");
    }
    clear(attrs);
    DECLINE_ACK.to_string()
}

/// Read and clear the pending reminder.
pub fn take_pending(attrs: &mut SessionAttributes) -> Option<ReminderSpec> {
    let flag = waiting_flag(attrs);
    let spec = ReminderSpec::read_from(attrs);
    clear(attrs);

    match (flag, spec) {
        (true, Ok(Some(spec))) => Some(spec),
        (false, Ok(None)) => None,
        (_, Ok(Some(_))) => {
            inconsistent("reminder present without the waiting flag");
            None
        }
        (_, Ok(None)) => {
            inconsistent("waiting for confirmation without a reminder");
            None
        }
        (_, Err(reason)) => {
            inconsistent(&reason);
            None
        }
    }
}

async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T, ReminderError>
where
    F: Future<Output = Result<T, ReminderError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| ReminderError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        })?
}

/// The user said yes: create the pending reminder.
pub async fn confirm(
    attrs: &mut SessionAttributes,
    api: &dyn ReminderApi,
    now: DateTime<Utc>,
    tz: Tz,
    settings: &ConfirmSettings,
) -> Result<ConfirmOutcome, ReminderError> {
    let Some(spec) = take_pending(attrs) else {
        return Ok(ConfirmOutcome::NothingPending);
    };

    let trigger = compute_trigger(&spec, now, tz, settings.max_relative_secs)?;

    if !bounded(settings.timeout, api.check_permission()).await? {
        info!(api = api.name(), "Reminder permission not granted");
        return Ok(ConfirmOutcome::PermissionRequired);
    }

    let token = match trigger.recurrence() {
        Some(recurrence) => {
            bounded(
                settings.timeout,
                api.create_recurring(&spec.topic, &trigger, &recurrence.frequency, &recurrence.by_days),
            )
            .await?
        }
        None => bounded(settings.timeout, api.create_one_time(&spec.topic, &trigger)).await?,
    };

    info!(token = %token, kind = ?trigger.kind(), topic = %spec.topic, "Reminder confirmed");
    Ok(ConfirmOutcome::Created { token, trigger })
}
