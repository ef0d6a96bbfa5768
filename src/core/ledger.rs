use crate::common::clock::Clock;
use crate::common::error::Result;
use crate::core::status::StatusDecision;
use crate::storage::{AttendanceRecord, AttendanceStatus, AttendanceStore, LedgerInsert, StudentProfile};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum LedgerOutcome {
    Recorded { status: AttendanceStatus },
    /// A record already existed for this student today. Idempotent no-op,
    /// distinguishable from a fresh success; carries the prior status.
    AlreadyMarked { status: AttendanceStatus },
}

/// Persists the final decision, one record per student per operational day.
pub struct LedgerWriter {
    store: Arc<dyn AttendanceStore>,
    clock: Arc<dyn Clock>,
}

impl LedgerWriter {
    pub fn new(store: Arc<dyn AttendanceStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn mark(
        &self,
        student: &StudentProfile,
        decision: &StatusDecision,
        scanned_by: &str,
    ) -> Result<LedgerOutcome> {
        let auth_uid = student
            .auth_uid
            .clone()
            .ok_or_else(|| {
                crate::common::error::AttendanceError::InvalidArgument(format!(
                    "Student {} has no linked account",
                    student.student_id
                ))
            })?;

        let record = AttendanceRecord {
            student_id: student.student_id.clone(),
            auth_uid,
            student_name: student.full_name.clone(),
            class: student.class.clone(),
            shift: student.shift.clone(),
            status: decision.status,
            date: decision.date.clone(),
            timestamp: self.clock.now(),
            scanned_by: scanned_by.to_string(),
        };

        match self.store.insert_attendance(record)? {
            LedgerInsert::Created => {
                tracing::info!(
                    "Marked {} {} for {}",
                    student.full_name,
                    decision.status,
                    decision.date
                );
                Ok(LedgerOutcome::Recorded {
                    status: decision.status,
                })
            }
            LedgerInsert::Existing(existing) => {
                tracing::info!(
                    "{} already marked {} for {}",
                    student.full_name,
                    existing.status,
                    existing.date
                );
                Ok(LedgerOutcome::AlreadyMarked {
                    status: existing.status,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::test_support::FixedClock;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;
    use chrono::Utc;

    fn student() -> StudentProfile {
        StudentProfile {
            student_id: "s1".to_string(),
            auth_uid: Some("uid-1".to_string()),
            full_name: "Student One".to_string(),
            class: "Class 12B".to_string(),
            shift: "Morning".to_string(),
            grace_period_minutes: None,
            embeddings: Vec::new(),
        }
    }

    fn writer() -> (LedgerWriter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 8, 4, 1, 0, 0).unwrap(),
        ));
        (LedgerWriter::new(store.clone(), clock), store)
    }

    fn decision(status: AttendanceStatus) -> StatusDecision {
        StatusDecision {
            status,
            date: "2025-08-04".to_string(),
        }
    }

    #[test]
    fn first_mark_creates_a_record() {
        let (writer, store) = writer();
        let outcome = writer
            .mark(&student(), &decision(AttendanceStatus::Late), "operator")
            .unwrap();
        assert!(matches!(
            outcome,
            LedgerOutcome::Recorded {
                status: AttendanceStatus::Late
            }
        ));
        assert_eq!(store.attendance_count(), 1);
    }

    #[test]
    fn second_mark_same_day_is_already_marked_with_original_status() {
        let (writer, store) = writer();
        writer
            .mark(&student(), &decision(AttendanceStatus::Present), "operator")
            .unwrap();

        // Later arrival would have been late, but the morning record wins.
        let outcome = writer
            .mark(&student(), &decision(AttendanceStatus::Late), "operator")
            .unwrap();
        assert!(matches!(
            outcome,
            LedgerOutcome::AlreadyMarked {
                status: AttendanceStatus::Present
            }
        ));
        assert_eq!(store.attendance_count(), 1);
    }

    #[test]
    fn different_days_get_separate_records() {
        let (writer, store) = writer();
        writer
            .mark(&student(), &decision(AttendanceStatus::Present), "operator")
            .unwrap();

        let next_day = StatusDecision {
            status: AttendanceStatus::Present,
            date: "2025-08-05".to_string(),
        };
        writer.mark(&student(), &next_day, "operator").unwrap();
        assert_eq!(store.attendance_count(), 2);
    }

    #[test]
    fn unlinked_student_is_rejected() {
        let (writer, _) = writer();
        let mut unlinked = student();
        unlinked.auth_uid = None;
        let err = writer
            .mark(&unlinked, &decision(AttendanceStatus::Present), "operator")
            .unwrap_err();
        assert_eq!(err.kind(), "invalid-argument");
    }
}
