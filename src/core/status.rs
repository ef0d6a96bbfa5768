use crate::common::error::{AttendanceError, Result};
use crate::storage::{AttendanceStatus, ShiftConfig, StudentProfile};
use chrono::{DateTime, FixedOffset, NaiveTime, Utc};

/// The status plus the operational-timezone calendar day it applies to.
#[derive(Debug, Clone)]
pub struct StatusDecision {
    pub status: AttendanceStatus,
    /// "YYYY-MM-DD" in the operational timezone; the ledger key.
    pub date: String,
}

/// Derives present/late from the shift schedule, the grace period and a
/// decision instant. All comparisons happen in the fixed operational
/// timezone; the caller's local clock never participates.
pub struct StatusCalculator {
    tz: FixedOffset,
    default_grace_minutes: u32,
}

impl StatusCalculator {
    pub fn new(utc_offset_hours: i32, default_grace_minutes: u32) -> Result<Self> {
        let tz = FixedOffset::east_opt(utc_offset_hours * 3600).ok_or_else(|| {
            AttendanceError::InvalidArgument(format!(
                "Invalid UTC offset: {} hours",
                utc_offset_hours
            ))
        })?;
        Ok(Self {
            tz,
            default_grace_minutes,
        })
    }

    /// Compute the status for `student` arriving at `at`. A missing shift
    /// schedule cannot judge lateness, so it defaults to present with a
    /// warning rather than failing the check-in.
    pub fn decide(
        &self,
        student: &StudentProfile,
        shift_config: Option<&ShiftConfig>,
        at: DateTime<Utc>,
    ) -> Result<StatusDecision> {
        let local = at.with_timezone(&self.tz);
        let date = local.date_naive().format("%Y-%m-%d").to_string();

        let shift_config = match shift_config {
            Some(config) => config,
            None => {
                tracing::warn!(
                    "No shift schedule for class {} shift {}; defaulting {} to present",
                    student.class_key(),
                    student.shift,
                    student.student_id
                );
                return Ok(StatusDecision {
                    status: AttendanceStatus::Present,
                    date,
                });
            }
        };

        let start = NaiveTime::parse_from_str(&shift_config.start_time, "%H:%M").map_err(|e| {
            AttendanceError::InvalidArgument(format!(
                "Unparseable shift start time {:?}: {}",
                shift_config.start_time, e
            ))
        })?;

        let shift_start = local
            .date_naive()
            .and_time(start)
            .and_local_timezone(self.tz)
            .single()
            .ok_or_else(|| {
                AttendanceError::InvalidArgument(format!(
                    "Shift start {} is not a valid instant in the operational timezone",
                    shift_config.start_time
                ))
            })?;

        let grace_minutes = student
            .grace_period_minutes
            .unwrap_or(self.default_grace_minutes);
        let deadline = shift_start + chrono::Duration::minutes(grace_minutes as i64);

        let status = if local > deadline {
            AttendanceStatus::Late
        } else {
            AttendanceStatus::Present
        };

        tracing::debug!(
            "Status for {}: shift start {}, grace {}m, deadline {}, arrival {} -> {}",
            student.student_id,
            shift_start,
            grace_minutes,
            deadline,
            local,
            status
        );

        Ok(StatusDecision { status, date })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn student(grace: Option<u32>) -> StudentProfile {
        StudentProfile {
            student_id: "s1".to_string(),
            auth_uid: Some("uid-1".to_string()),
            full_name: "Student One".to_string(),
            class: "Class 12B".to_string(),
            shift: "Morning".to_string(),
            grace_period_minutes: grace,
            embeddings: Vec::new(),
        }
    }

    fn shift(start: &str) -> ShiftConfig {
        ShiftConfig {
            start_time: start.to_string(),
        }
    }

    /// 08:14 / 08:16 local in UTC+7 expressed as UTC instants.
    fn local_0814_utc() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 4, 1, 14, 0).unwrap()
    }
    fn local_0816_utc() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 4, 1, 16, 0).unwrap()
    }

    #[test]
    fn within_grace_is_present() {
        let calc = StatusCalculator::new(7, 15).unwrap();
        let decision = calc
            .decide(&student(None), Some(&shift("08:00")), local_0814_utc())
            .unwrap();
        assert_eq!(decision.status, AttendanceStatus::Present);
        assert_eq!(decision.date, "2025-08-04");
    }

    #[test]
    fn past_grace_is_late() {
        let calc = StatusCalculator::new(7, 15).unwrap();
        let decision = calc
            .decide(&student(None), Some(&shift("08:00")), local_0816_utc())
            .unwrap();
        assert_eq!(decision.status, AttendanceStatus::Late);
    }

    #[test]
    fn exact_deadline_is_still_present() {
        let calc = StatusCalculator::new(7, 15).unwrap();
        let at = Utc.with_ymd_and_hms(2025, 8, 4, 1, 15, 0).unwrap();
        let decision = calc
            .decide(&student(None), Some(&shift("08:00")), at)
            .unwrap();
        assert_eq!(decision.status, AttendanceStatus::Present);
    }

    #[test]
    fn student_grace_override_applies() {
        let calc = StatusCalculator::new(7, 15).unwrap();
        // 30-minute override keeps an 08:16 arrival present.
        let decision = calc
            .decide(&student(Some(30)), Some(&shift("08:00")), local_0816_utc())
            .unwrap();
        assert_eq!(decision.status, AttendanceStatus::Present);

        // Zero-minute override makes 08:14 late.
        let decision = calc
            .decide(&student(Some(0)), Some(&shift("08:00")), local_0814_utc())
            .unwrap();
        assert_eq!(decision.status, AttendanceStatus::Late);
    }

    #[test]
    fn missing_schedule_defaults_to_present() {
        let calc = StatusCalculator::new(7, 15).unwrap();
        let decision = calc.decide(&student(None), None, local_0816_utc()).unwrap();
        assert_eq!(decision.status, AttendanceStatus::Present);
    }

    #[test]
    fn decision_uses_operational_timezone_not_utc() {
        // 23:30 UTC on Aug 3 is 06:30 Aug 4 in UTC+7: next day, early.
        let calc = StatusCalculator::new(7, 15).unwrap();
        let at = Utc.with_ymd_and_hms(2025, 8, 3, 23, 30, 0).unwrap();
        let decision = calc
            .decide(&student(None), Some(&shift("08:00")), at)
            .unwrap();
        assert_eq!(decision.status, AttendanceStatus::Present);
        assert_eq!(decision.date, "2025-08-04");
    }

    #[test]
    fn garbage_start_time_is_rejected() {
        let calc = StatusCalculator::new(7, 15).unwrap();
        let err = calc
            .decide(&student(None), Some(&shift("late-ish")), local_0814_utc())
            .unwrap_err();
        assert_eq!(err.kind(), "invalid-argument");
    }
}
