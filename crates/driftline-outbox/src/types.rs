use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionStatus {
    Pending,
    Syncing,
    Done,
    Failed,
}

/// The atomic unit exchanged between replicas: a single queued mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: String,
    pub kind: ActionKind,
    pub collection: String,
    pub document_id: String,
    pub data: Value,
    pub timestamp: i64,
    pub status: ActionStatus,
    pub retry_count: u32,
    pub error: Option<String>,
}

impl Action {
    pub fn new_id() -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix: u32 = rand::random();
        format!("{millis:x}-{suffix:08x}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub initial_delay_ms: i64,
    pub multiplier: f64,
    pub max_delay_ms: i64,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 60_000,
            max_retries: 5,
        }
    }
}

impl RetryPolicy {
    pub fn calculate_delay(&self, retry_count: u32) -> i64 {
        let raw = self.initial_delay_ms as f64 * self.multiplier.powi(retry_count as i32);
        (raw.min(self.max_delay_ms as f64)) as i64
    }
}
