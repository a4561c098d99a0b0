use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    pub message: Option<String>,
    pub response_time_ms: Option<u64>,
    pub last_checked: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>, response_time_ms: Option<u64>) -> Self {
        Self {
            status,
            message,
            response_time_ms,
            last_checked: Utc::now(),
            details: BTreeMap::new(),
        }
    }

    pub fn healthy(response_time_ms: u64) -> Self {
        Self::with_status(ComponentStatus::Healthy, None, Some(response_time_ms))
    }

    pub fn unhealthy(error: String) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(error), None)
    }

    pub fn degraded(message: String, response_time_ms: Option<u64>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message), response_time_ms)
    }

    pub fn detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Overall report: the worst status of any component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: ComponentStatus,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthReport {
    pub fn new(version: String, uptime_seconds: u64) -> Self {
        Self {
            status: ComponentStatus::Healthy,
            timestamp: Utc::now(),
            version,
            uptime_seconds,
            components: BTreeMap::new(),
        }
    }

    pub fn add_component(&mut self, name: String, health: ComponentHealth) {
        self.status = match (self.status, health.status) {
            (_, ComponentStatus::Unhealthy) | (ComponentStatus::Unhealthy, _) => {
                ComponentStatus::Unhealthy
            }
            (_, ComponentStatus::Degraded) | (ComponentStatus::Degraded, _) => {
                ComponentStatus::Degraded
            }
            _ => ComponentStatus::Healthy,
        };
        self.components.insert(name, health);
    }

    /// Degraded still serves traffic; only unhealthy should be taken out.
    pub fn is_serving(&self) -> bool {
        self.status != ComponentStatus::Unhealthy
    }
}
