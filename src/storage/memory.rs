use crate::common::error::{AttendanceError, Result};
use crate::storage::model::{
    AttendancePasscode, AttendanceRecord, ClassConfig, Embedding, ShiftConfig, StudentProfile,
};
use crate::storage::store::{AttendanceStore, LedgerInsert};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-process store. Each collection sits behind its own mutex, so a held
/// lock is the per-document transaction the trait promises.
#[derive(Default)]
pub struct MemoryStore {
    students: Mutex<HashMap<String, StudentProfile>>,
    classes: Mutex<HashMap<String, ClassConfig>>,
    passcodes: Mutex<HashMap<String, AttendancePasscode>>,
    /// Keyed by (auth_uid, date) so the one-record-per-day invariant is a
    /// map-key property rather than a scan.
    attendance: Mutex<HashMap<(String, String), AttendanceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_student(&self, profile: StudentProfile) {
        self.students
            .lock()
            .unwrap()
            .insert(profile.student_id.clone(), profile);
    }

    pub fn upsert_class(&self, class_key: &str, config: ClassConfig) {
        self.classes
            .lock()
            .unwrap()
            .insert(class_key.to_string(), config);
    }

    pub fn student_by_id(&self, student_id: &str) -> Option<StudentProfile> {
        self.students.lock().unwrap().get(student_id).cloned()
    }

    pub fn passcode(&self, code: &str) -> Option<AttendancePasscode> {
        self.passcodes.lock().unwrap().get(code).cloned()
    }

    pub fn attendance_count(&self) -> usize {
        self.attendance.lock().unwrap().len()
    }
}

impl AttendanceStore for MemoryStore {
    fn student_by_auth_uid(&self, auth_uid: &str) -> Result<Option<StudentProfile>> {
        let students = self.students.lock().unwrap();
        Ok(students
            .values()
            .find(|s| s.auth_uid.as_deref() == Some(auth_uid))
            .cloned())
    }

    fn enrolled_students(&self) -> Result<Vec<StudentProfile>> {
        let students = self.students.lock().unwrap();
        Ok(students
            .values()
            .filter(|s| !s.embeddings.is_empty() && s.auth_uid.is_some())
            .cloned()
            .collect())
    }

    fn append_embedding(
        &self,
        auth_uid: &str,
        embedding: Embedding,
        max_history: usize,
    ) -> Result<usize> {
        let mut students = self.students.lock().unwrap();
        let profile = students
            .values_mut()
            .find(|s| s.auth_uid.as_deref() == Some(auth_uid))
            .ok_or_else(|| {
                AttendanceError::NotFound(format!("No student linked to account {}", auth_uid))
            })?;

        profile.embeddings.push(embedding);
        while profile.embeddings.len() > max_history {
            profile.embeddings.remove(0);
        }
        Ok(profile.embeddings.len())
    }

    fn insert_passcode(&self, passcode: &AttendancePasscode) -> Result<()> {
        let mut passcodes = self.passcodes.lock().unwrap();
        if passcodes.contains_key(&passcode.code) {
            // Vanishingly rare with a 36^6 code space; the issuer retries.
            return Err(AttendanceError::Conflict(format!(
                "Passcode {} already exists",
                passcode.code
            )));
        }
        passcodes.insert(passcode.code.clone(), passcode.clone());
        Ok(())
    }

    fn consume_passcode(&self, code: &str, now: DateTime<Utc>) -> Result<AttendancePasscode> {
        let mut passcodes = self.passcodes.lock().unwrap();
        let passcode = passcodes
            .get_mut(code)
            .ok_or_else(|| AttendanceError::NotFound("Invalid passcode".to_string()))?;

        if passcode.used {
            return Err(AttendanceError::AlreadyUsed);
        }
        if now > passcode.expires_at {
            return Err(AttendanceError::Expired);
        }

        passcode.used = true;
        passcode.used_at = Some(now);
        Ok(passcode.clone())
    }

    fn attendance_for_day(&self, auth_uid: &str, date: &str) -> Result<Option<AttendanceRecord>> {
        let attendance = self.attendance.lock().unwrap();
        Ok(attendance
            .get(&(auth_uid.to_string(), date.to_string()))
            .cloned())
    }

    fn insert_attendance(&self, record: AttendanceRecord) -> Result<LedgerInsert> {
        let mut attendance = self.attendance.lock().unwrap();
        let key = (record.auth_uid.clone(), record.date.clone());
        if let Some(existing) = attendance.get(&key) {
            return Ok(LedgerInsert::Existing(existing.clone()));
        }
        attendance.insert(key, record);
        Ok(LedgerInsert::Created)
    }

    fn shift_config(&self, class_key: &str, shift: &str) -> Result<Option<ShiftConfig>> {
        let classes = self.classes.lock().unwrap();
        Ok(classes
            .get(class_key)
            .and_then(|c| c.shifts.get(shift))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn student(id: &str, auth_uid: Option<&str>, embeddings: usize) -> StudentProfile {
        StudentProfile {
            student_id: id.to_string(),
            auth_uid: auth_uid.map(str::to_string),
            full_name: format!("Student {}", id),
            class: "Class 12B".to_string(),
            shift: "Morning".to_string(),
            grace_period_minutes: None,
            embeddings: (0..embeddings).map(|i| vec![i as f32, 1.0]).collect(),
        }
    }

    #[test]
    fn enrolled_students_need_embeddings_and_auth_uid() {
        let store = MemoryStore::new();
        store.upsert_student(student("a", Some("uid-a"), 2));
        store.upsert_student(student("b", Some("uid-b"), 0));
        store.upsert_student(student("c", None, 3));

        let enrolled = store.enrolled_students().unwrap();
        assert_eq!(enrolled.len(), 1);
        assert_eq!(enrolled[0].student_id, "a");
    }

    #[test]
    fn append_evicts_oldest_beyond_bound() {
        let store = MemoryStore::new();
        store.upsert_student(student("a", Some("uid-a"), 4));

        let count = store
            .append_embedding("uid-a", vec![99.0, 99.0], 4)
            .unwrap();
        assert_eq!(count, 4);

        let profile = store.student_by_id("a").unwrap();
        // Oldest (index 0) evicted, newest at the tail.
        assert_eq!(profile.embeddings[0], vec![1.0, 1.0]);
        assert_eq!(profile.embeddings[3], vec![99.0, 99.0]);
    }

    #[test]
    fn append_for_unknown_account_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .append_embedding("ghost", vec![1.0], 4)
            .unwrap_err();
        assert_eq!(err.kind(), "not-found");
    }

    #[test]
    fn consume_flips_used_exactly_once() {
        let store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2025, 8, 4, 1, 0, 0).unwrap();
        store
            .insert_passcode(&AttendancePasscode {
                code: "AB12CD".to_string(),
                student_auth_uid: "uid-a".to_string(),
                issued_at: now,
                expires_at: now + chrono::Duration::seconds(60),
                used: false,
                used_at: None,
            })
            .unwrap();

        let consumed = store.consume_passcode("AB12CD", now).unwrap();
        assert!(consumed.used);

        let err = store.consume_passcode("AB12CD", now).unwrap_err();
        assert_eq!(err.kind(), "already-used");
    }

    #[test]
    fn attendance_insert_is_idempotent_per_day() {
        let store = MemoryStore::new();
        let record = AttendanceRecord {
            student_id: "a".to_string(),
            auth_uid: "uid-a".to_string(),
            student_name: "Student a".to_string(),
            class: "Class 12B".to_string(),
            shift: "Morning".to_string(),
            status: crate::storage::model::AttendanceStatus::Present,
            date: "2025-08-04".to_string(),
            timestamp: Utc::now(),
            scanned_by: "test".to_string(),
        };

        assert!(matches!(
            store.insert_attendance(record.clone()).unwrap(),
            LedgerInsert::Created
        ));
        assert!(matches!(
            store.insert_attendance(record).unwrap(),
            LedgerInsert::Existing(_)
        ));
        assert_eq!(store.attendance_count(), 1);
    }
}
