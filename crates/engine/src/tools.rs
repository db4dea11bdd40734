//! Tools the model may call during a conversation turn.
//!
//! A turn advertises every registered tool; when the reply carries tool
//! calls, the orchestrator runs them here and feeds the outputs back as
//! tool-result messages before asking again.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Utc, Weekday};
use chrono_tz::Tz;
use std::collections::HashMap;
use vocalis_core::error::ToolError;
use vocalis_core::provider::ToolDefinition;

const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// The request a tool runs on behalf of.
#[derive(Debug, Clone, Copy)]
pub struct ToolContext {
    pub now: DateTime<Utc>,
    pub time_zone: Tz,
}

impl ToolContext {
    fn local_now(&self) -> NaiveDateTime {
        self.now.with_timezone(&self.time_zone).naive_local()
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name the model calls this tool by.
    fn name(&self) -> &str;

    /// What the tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing the arguments.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Run the tool; the returned text becomes the tool-result message.
    async fn execute(&self, arguments: serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The tools offered to the model, by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry every orchestrator starts with.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(DateTimeTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions for the request, sorted by name so requests are stable.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Parse the raw argument string and run the named tool.
    pub async fn execute(&self, name: &str, arguments: &str, ctx: &ToolContext) -> Result<String, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let arguments = match arguments.trim() {
            "" => serde_json::Value::Object(Default::default()),
            raw => serde_json::from_str(raw)
                .map_err(|e| ToolError::InvalidArguments(format!("arguments are not JSON: {e}")))?,
        };
        tool.execute(arguments, ctx).await
    }
}

// ── Date and time ─────────────────────────────────────────────────────────

/// Calendar arithmetic on the user's wall clock.
pub struct DateTimeTool;

#[async_trait]
impl Tool for DateTimeTool {
    fn name(&self) -> &str {
        "date_time"
    }

    fn description(&self) -> &str {
        "Date and time in the user's time zone. Operations: \"now\" (yyyy-MM-ddTHH:mm:ss), \
         \"date\" (yyyy-MM-dd), \"day_of_week\", \"next_day_of_week\" (date of the next given \
         weekday, never today), \"add_minutes\" and \"add_hours\" (now plus an amount)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["now", "date", "day_of_week", "next_day_of_week", "add_minutes", "add_hours"]
                },
                "day": {
                    "type": "string",
                    "description": "Weekday name for next_day_of_week, e.g. 'friday'"
                },
                "amount": {
                    "type": "integer",
                    "description": "Minutes or hours to add"
                }
            },
            "required": ["operation"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let operation = arguments["operation"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'operation' argument".into()))?;
        let now = ctx.local_now();

        let output = match operation {
            "now" => now.format(LOCAL_FORMAT).to_string(),
            "date" => now.date().to_string(),
            "day_of_week" => now.format("%A").to_string().to_uppercase(),
            "next_day_of_week" => {
                let day = arguments["day"]
                    .as_str()
                    .ok_or_else(|| ToolError::InvalidArguments("Missing 'day' argument".into()))?;
                let target: Weekday = day
                    .trim()
                    .parse()
                    .map_err(|_| ToolError::InvalidArguments(format!("Unknown weekday: {day}")))?;
                let today = now.date();
                let ahead = (7 + i64::from(target.num_days_from_monday())
                    - i64::from(today.weekday().num_days_from_monday()))
                    % 7;
                let ahead = if ahead == 0 { 7 } else { ahead };
                (today + Duration::days(ahead)).to_string()
            }
            "add_minutes" => (now + Duration::minutes(amount(&arguments)?)).format(LOCAL_FORMAT).to_string(),
            "add_hours" => (now + Duration::hours(amount(&arguments)?)).format(LOCAL_FORMAT).to_string(),
            other => return Err(ToolError::InvalidArguments(format!("Unknown operation: {other}"))),
        };
        Ok(output)
    }
}

fn amount(arguments: &serde_json::Value) -> Result<i64, ToolError> {
    arguments["amount"]
        .as_i64()
        .ok_or_else(|| ToolError::InvalidArguments("Missing integer 'amount' argument".into()))
}
