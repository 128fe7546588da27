//! Cognitive-state sample data model.
//!
//! One row per capture tick. Samples are append-only and only removed together with
//! the owning user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CognitiveSample {
    pub id: Option<i64>,
    pub user_id: i64,
    pub timestamp: DateTime<Utc>,
    pub stress: f64,
    pub fatigue: f64,
    pub attention: f64,
    pub face_label: Option<String>,
    pub voice_label: Option<String>,
}
