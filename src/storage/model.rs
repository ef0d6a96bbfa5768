use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

pub type Embedding = Vec<f32>;

/// Identity anchor for a student. Owned by the student-management
/// subsystem; this engine only appends to (and evicts from) `embeddings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub student_id: String,
    /// Owning account; None until the profile-linking flow sets it.
    #[serde(default)]
    pub auth_uid: Option<String>,
    pub full_name: String,
    pub class: String,
    pub shift: String,
    /// Per-student grace override in minutes. Historical data carries this
    /// as a number, a numeric string, or under a misspelled field name;
    /// all three normalize here so reads never have to coerce.
    #[serde(
        default,
        alias = "gradePeriodMinutes",
        deserialize_with = "de_grace_minutes"
    )]
    pub grace_period_minutes: Option<u32>,
    #[serde(default)]
    pub embeddings: Vec<Embedding>,
}

impl StudentProfile {
    /// Class documents are keyed without the display prefix ("Class 12B"
    /// on the profile joins against the "12B" document).
    pub fn class_key(&self) -> &str {
        self.class.strip_prefix("Class ").unwrap_or(&self.class)
    }
}

fn de_grace_minutes<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    let parsed = match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::Number(n)) if n.is_finite() && n >= 0.0 => Some(n as u32),
        Some(Raw::Number(_)) => None,
        Some(Raw::Text(s)) => s.trim().parse::<f64>().ok().and_then(|n| {
            if n.is_finite() && n >= 0.0 {
                Some(n as u32)
            } else {
                None
            }
        }),
    };
    Ok(parsed)
}

/// Per class+shift schedule. Read-only to this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftConfig {
    /// Wall-clock "HH:MM" in the operational timezone.
    #[serde(rename = "startTime")]
    pub start_time: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassConfig {
    #[serde(default)]
    pub shifts: HashMap<String, ShiftConfig>,
}

/// Short-lived single-use credential. Created at issue time, flipped to
/// `used` exactly once at redemption, never deleted (kept for audit).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendancePasscode {
    pub code: String,
    pub student_auth_uid: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    #[serde(default)]
    pub used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttendanceStatus::Present => write!(f, "present"),
            AttendanceStatus::Late => write!(f, "late"),
        }
    }
}

/// Ledger entry. At most one per (auth_uid, date); immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub student_id: String,
    pub auth_uid: String,
    pub student_name: String,
    pub class: String,
    pub shift: String,
    pub status: AttendanceStatus,
    /// Calendar day "YYYY-MM-DD" in the operational timezone.
    pub date: String,
    pub timestamp: DateTime<Utc>,
    /// Operator or channel that produced the record.
    pub scanned_by: String,
}
