//! Reminder API — the external service that actually fires reminders.
//!
//! [`HttpReminderApi`] talks to a REST reminders endpoint with a bearer
//! token. [`InMemoryReminderApi`] records requests instead; it backs dry runs
//! and tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use vocalis_core::error::ReminderError;

use crate::spec::{Frequency, WeekdayCode};
use crate::trigger::Trigger;

/// The reminder service seam.
#[async_trait]
pub trait ReminderApi: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the user granted reminder permission.
    async fn check_permission(&self) -> Result<bool, ReminderError>;

    /// Create a one-time reminder, returning its token.
    async fn create_one_time(&self, topic: &str, trigger: &Trigger) -> Result<String, ReminderError>;

    /// Create a recurring reminder, returning its token.
    async fn create_recurring(
        &self,
        topic: &str,
        trigger: &Trigger,
        frequency: &Frequency,
        by_days: &[WeekdayCode],
    ) -> Result<String, ReminderError>;
}

// ── Wire format ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRequest {
    pub request_time: String,
    pub trigger: Trigger,
    pub alert_info: AlertInfo,
    pub push_notification: PushNotification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertInfo {
    pub spoken_info: SpokenInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpokenInfo {
    pub content: Vec<SpokenText>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpokenText {
    pub locale: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushNotification {
    pub status: String,
}

impl ReminderRequest {
    pub fn new(topic: &str, trigger: &Trigger, locale: &str) -> Self {
        Self {
            request_time: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            trigger: trigger.clone(),
            alert_info: AlertInfo {
                spoken_info: SpokenInfo {
                    content: vec![SpokenText {
                        locale: locale.to_string(),
                        text: topic.to_string(),
                    }],
                },
            },
            push_notification: PushNotification {
                status: "ENABLED".into(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    alert_token: String,
}

// ── HTTP implementation ───────────────────────────────────────────────────

/// REST client for a reminders management endpoint.
pub struct HttpReminderApi {
    base_url: String,
    token: String,
    locale: String,
    client: reqwest::Client,
}

impl HttpReminderApi {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        locale: impl Into<String>,
    ) -> Result<Self, ReminderError> {
        let client = reqwest::Client::builder().build().map_err(|e| ReminderError::Api {
            status_code: 0,
            message: format!("Failed to create HTTP client: {e}"),
        })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            locale: locale.into(),
            client,
        })
    }

    fn reminders_url(&self) -> String {
        format!("{}/v1/alerts/reminders", self.base_url)
    }

    async fn create(&self, topic: &str, trigger: &Trigger) -> Result<String, ReminderError> {
        let request = ReminderRequest::new(topic, trigger, &self.locale);
        debug!(trigger = ?request.trigger, "Sending reminder request");

        let response = self
            .client
            .post(self.reminders_url())
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(network)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status, body = %message, "Reminder API returned error");
            return Err(ReminderError::Api {
                status_code: status,
                message,
            });
        }

        let created: CreateResponse = response.json().await.map_err(|e| ReminderError::Api {
            status_code: status,
            message: format!("Failed to parse reminder response: {e}"),
        })?;
        Ok(created.alert_token)
    }
}

fn network(e: reqwest::Error) -> ReminderError {
    ReminderError::Api {
        status_code: 0,
        message: e.to_string(),
    }
}

#[async_trait]
impl ReminderApi for HttpReminderApi {
    fn name(&self) -> &str {
        "http"
    }

    async fn check_permission(&self) -> Result<bool, ReminderError> {
        let response = self
            .client
            .get(self.reminders_url())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(network)?;

        match response.status().as_u16() {
            200..=299 => Ok(true),
            401 | 403 => Ok(false),
            status => Err(ReminderError::Api {
                status_code: status,
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn create_one_time(&self, topic: &str, trigger: &Trigger) -> Result<String, ReminderError> {
        let token = self.create(topic, trigger).await?;
        info!(token = %token, "Created reminder");
        Ok(token)
    }

    async fn create_recurring(
        &self,
        topic: &str,
        trigger: &Trigger,
        frequency: &Frequency,
        _by_days: &[WeekdayCode],
    ) -> Result<String, ReminderError> {
        let token = self.create(topic, trigger).await?;
        info!(token = %token, frequency = %frequency, "Created recurring reminder");
        Ok(token)
    }
}

// ── In-memory implementation ──────────────────────────────────────────────

/// A reminder request captured by [`InMemoryReminderApi`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedReminder {
    pub token: String,
    pub topic: String,
    pub trigger: Trigger,
    pub frequency: Option<Frequency>,
    pub by_days: Vec<WeekdayCode>,
}

/// Records reminders instead of creating them.
pub struct InMemoryReminderApi {
    granted: AtomicBool,
    recorded: Mutex<Vec<RecordedReminder>>,
}

impl Default for InMemoryReminderApi {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryReminderApi {
    /// An API with permission granted.
    pub fn new() -> Self {
        Self {
            granted: AtomicBool::new(true),
            recorded: Mutex::new(Vec::new()),
        }
    }

    pub fn with_permission(granted: bool) -> Self {
        let api = Self::new();
        api.set_permission(granted);
        api
    }

    pub fn set_permission(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    /// Everything created so far.
    pub fn recorded(&self) -> Vec<RecordedReminder> {
        self.recorded.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn record(&self, reminder: RecordedReminder) -> Result<String, ReminderError> {
        let token = reminder.token.clone();
        self.recorded
            .lock()
            .map_err(|_| ReminderError::Api {
                status_code: 0,
                message: "reminder log poisoned".into(),
            })?
            .push(reminder);
        info!(token = %token, "Recorded dry-run reminder");
        Ok(token)
    }
}

#[async_trait]
impl ReminderApi for InMemoryReminderApi {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn check_permission(&self) -> Result<bool, ReminderError> {
        Ok(self.granted.load(Ordering::SeqCst))
    }

    async fn create_one_time(&self, topic: &str, trigger: &Trigger) -> Result<String, ReminderError> {
        self.record(RecordedReminder {
            token: format!("dry-run-{}", uuid::Uuid::new_v4()),
            topic: topic.to_string(),
            trigger: trigger.clone(),
            frequency: None,
            by_days: Vec::new(),
        })
    }

    async fn create_recurring(
        &self,
        topic: &str,
        trigger: &Trigger,
        frequency: &Frequency,
        by_days: &[WeekdayCode],
    ) -> Result<String, ReminderError> {
        self.record(RecordedReminder {
            token: format!("dry-run-{}", uuid::Uuid::new_v4()),
            topic: topic.to_string(),
            trigger: trigger.clone(),
            frequency: Some(frequency.clone()),
            by_days: by_days.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use serde_json::{Value, json};
    use std::sync::Arc;

    async fn spawn_api(permission_status: u16, seen: Arc<Mutex<Vec<Value>>>) -> String {
        let app = Router::new().route(
            "/v1/alerts/reminders",
            get(move || async move {
                (StatusCode::from_u16(permission_status).unwrap(), Json(json!({"alerts": []})))
            })
            .post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let seen = seen.clone();
                async move {
                    assert_eq!(headers["authorization"], "Bearer tok");
                    seen.lock().unwrap().push(body);
                    Json(json!({"alertToken": "alert-1", "status": "ON"}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn permission_probe_maps_auth_failures_to_not_granted() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for (status, expected) in [(200, true), (401, false), (403, false)] {
            let url = spawn_api(status, seen.clone()).await;
            let api = HttpReminderApi::new(url, "tok", "en-US").unwrap();
            assert_eq!(api.check_permission().await.unwrap(), expected, "status {status}");
        }
    }

    #[tokio::test]
    async fn permission_probe_surfaces_server_errors() {
        let url = spawn_api(500, Arc::new(Mutex::new(Vec::new()))).await;
        let api = HttpReminderApi::new(url, "tok", "en-US").unwrap();
        assert!(matches!(
            api.check_permission().await,
            Err(ReminderError::Api { status_code: 500, .. })
        ));
    }

    #[tokio::test]
    async fn create_sends_spoken_alert() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let url = spawn_api(200, seen.clone()).await;
        let api = HttpReminderApi::new(url, "tok", "en-US").unwrap();

        let token = api
            .create_one_time("Dentist", &Trigger::Relative { offset_seconds: 3600 })
            .await
            .unwrap();
        assert_eq!(token, "alert-1");

        let body = seen.lock().unwrap()[0].clone();
        assert_eq!(body["trigger"]["type"], "SCHEDULED_RELATIVE");
        assert_eq!(body["alertInfo"]["spokenInfo"]["content"][0]["text"], "Dentist");
        assert_eq!(body["alertInfo"]["spokenInfo"]["content"][0]["locale"], "en-US");
        assert_eq!(body["pushNotification"]["status"], "ENABLED");
        assert!(body["requestTime"].is_string());
    }

    #[tokio::test]
    async fn in_memory_records_requests() {
        let api = InMemoryReminderApi::new();
        let trigger = Trigger::Relative { offset_seconds: 60 };
        api.create_one_time("Tea", &trigger).await.unwrap();
        api.create_recurring("Gym", &trigger, &Frequency::Weekly, &[WeekdayCode::Fr])
            .await
            .unwrap();

        let recorded = api.recorded();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].frequency, None);
        assert_eq!(recorded[1].by_days, vec![WeekdayCode::Fr]);
        assert!(recorded[1].token.starts_with("dry-run-"));
    }

    #[tokio::test]
    async fn in_memory_permission_toggle() {
        let api = InMemoryReminderApi::with_permission(false);
        assert!(!api.check_permission().await.unwrap());
        api.set_permission(true);
        assert!(api.check_permission().await.unwrap());
    }
}
