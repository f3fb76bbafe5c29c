use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted summary run. Immutable once inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub id: i32,
    pub url: String,
    pub title: String,
    pub summary: String,
    pub original_content: Option<String>,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert shape: everything except the server-assigned `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub url: String,
    pub title: String,
    pub summary: String,
    pub original_content: Option<String>,
    pub session_id: Option<String>,
}
