//! Channel naming and realtime message types
//!
//! A channel is a named addressable scope `user:{userId}:workflow:{workflowId}`
//! with two topics: `updates` for status/progress/log/result messages and
//! `ai-stream` for chunked model output. Channels are addressable, not
//! pre-registered; constructing one performs no existence check.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Addressable realtime scope for one user's one workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Channel {
    pub user_id: Uuid,
    pub workflow_id: Uuid,
}

impl Channel {
    pub fn new(user_id: Uuid, workflow_id: Uuid) -> Self {
        Self {
            user_id,
            workflow_id,
        }
    }

    /// Canonical channel name
    pub fn name(&self) -> String {
        format!("user:{}:workflow:{}", self.user_id, self.workflow_id)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Topics available on every channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Topic {
    #[serde(rename = "updates")]
    Updates,
    #[serde(rename = "ai-stream")]
    AiStream,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Updates => "updates",
            Topic::AiStream => "ai-stream",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "updates" => Ok(Topic::Updates),
            "ai-stream" => Ok(Topic::AiStream),
            other => Err(format!("unknown topic '{}'", other)),
        }
    }
}

/// Lifecycle label carried by status updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLabel {
    Started,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StatusData {
    pub status: Option<StatusLabel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressData {
    pub current: u64,
    pub total: u64,
    pub percentage: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
    /// Estimated remaining time in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LogData {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultData {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock execution time in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<u64>,
}

/// Message published on the `updates` topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkflowUpdate {
    Status {
        message: String,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<StatusData>,
    },
    Progress {
        message: String,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<ProgressData>,
    },
    Log {
        message: String,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<LogData>,
    },
    Result {
        message: String,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<ResultData>,
    },
}

impl WorkflowUpdate {
    pub fn status(message: impl Into<String>, label: StatusLabel) -> Self {
        WorkflowUpdate::Status {
            message: message.into(),
            timestamp: Utc::now(),
            data: Some(StatusData {
                status: Some(label),
                ..Default::default()
            }),
        }
    }

    pub fn progress(message: impl Into<String>, current: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            (current as f32 / total as f32) * 100.0
        };
        WorkflowUpdate::Progress {
            message: message.into(),
            timestamp: Utc::now(),
            data: Some(ProgressData {
                current,
                total,
                percentage,
                step_id: None,
                step_name: None,
                estimated_time_remaining: None,
            }),
        }
    }

    pub fn log(message: impl Into<String>, level: LogLevel) -> Self {
        WorkflowUpdate::Log {
            message: message.into(),
            timestamp: Utc::now(),
            data: Some(LogData {
                level,
                ..Default::default()
            }),
        }
    }

    pub fn result(message: impl Into<String>, data: ResultData) -> Self {
        WorkflowUpdate::Result {
            message: message.into(),
            timestamp: Utc::now(),
            data: Some(data),
        }
    }
}

/// Message published on the `ai-stream` topic. A logical generation is a
/// sequence of chunks terminated by exactly one `is_complete=true` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiStreamMessage {
    pub chunk: String,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AiStreamMessage {
    pub fn chunk(chunk: impl Into<String>) -> Self {
        Self {
            chunk: chunk.into(),
            is_complete: false,
            metadata: None,
        }
    }

    pub fn complete() -> Self {
        Self {
            chunk: String::new(),
            is_complete: true,
            metadata: None,
        }
    }
}
