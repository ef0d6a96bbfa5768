use crate::common::error::{AttendanceError, Result};
use crate::storage::model::{
    AttendancePasscode, AttendanceRecord, ClassConfig, Embedding, ShiftConfig, StudentProfile,
};
use crate::storage::store::{AttendanceStore, LedgerInsert};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// JSON-on-disk store for the local daemon: one document per file under a
/// collection directory. A single store-level lock serializes every
/// read-modify-write, which is all the transactionality a one-process
/// deployment needs.
pub struct FileStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

const STUDENTS_DIR: &str = "students";
const CLASSES_DIR: &str = "classes";
const PASSCODES_DIR: &str = "passcodes";
const ATTENDANCE_DIR: &str = "attendance";

impl FileStore {
    pub fn new_with_path(data_dir: PathBuf) -> Result<Self> {
        for collection in [STUDENTS_DIR, CLASSES_DIR, PASSCODES_DIR, ATTENDANCE_DIR] {
            fs::create_dir_all(data_dir.join(collection))?;
        }
        Ok(Self {
            data_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn new() -> Result<Self> {
        let dirs = ProjectDirs::from("center", "school", "AttendanceEngine").ok_or_else(|| {
            AttendanceError::Storage("Failed to resolve project data directory".to_string())
        })?;
        Self::new_with_path(dirs.data_dir().to_path_buf())
    }

    pub fn upsert_student(&self, profile: &StudentProfile) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        self.write_doc(STUDENTS_DIR, &profile.student_id, profile)
    }

    pub fn upsert_class(&self, class_key: &str, config: &ClassConfig) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        self.write_doc(CLASSES_DIR, class_key, config)
    }

    fn doc_path(&self, collection: &str, key: &str) -> PathBuf {
        // Document keys become file names; anything path-hostile is mapped
        // to '-' so a key can never escape its collection directory.
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        self.data_dir.join(collection).join(format!("{}.json", safe))
    }

    fn read_doc<T: serde::de::DeserializeOwned>(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<T>> {
        let path = self.doc_path(collection, key);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&path)?;
        let doc = serde_json::from_str(&data).map_err(|e| {
            AttendanceError::Storage(format!("Failed to decode {}: {}", path.display(), e))
        })?;
        Ok(Some(doc))
    }

    fn write_doc<T: serde::Serialize>(&self, collection: &str, key: &str, doc: &T) -> Result<()> {
        let path = self.doc_path(collection, key);
        let data = serde_json::to_vec_pretty(doc)
            .map_err(|e| AttendanceError::Storage(format!("Failed to encode document: {}", e)))?;
        // Write-then-rename so a crash mid-write never leaves a torn document.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn each_student<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(StudentProfile),
    {
        let dir = self.data_dir.join(STUDENTS_DIR);
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_profile(&path) {
                Ok(profile) => visit(profile),
                Err(e) => {
                    // One bad document should not take matching offline.
                    tracing::warn!("Skipping unreadable student document {:?}: {}", path, e);
                }
            }
        }
        Ok(())
    }

    fn attendance_key(auth_uid: &str, date: &str) -> String {
        format!("{}__{}", auth_uid, date)
    }
}

fn read_profile(path: &Path) -> Result<StudentProfile> {
    let data = fs::read_to_string(path)?;
    serde_json::from_str(&data)
        .map_err(|e| AttendanceError::Storage(format!("Failed to decode {}: {}", path.display(), e)))
}

impl AttendanceStore for FileStore {
    fn student_by_auth_uid(&self, auth_uid: &str) -> Result<Option<StudentProfile>> {
        let mut found = None;
        self.each_student(|profile| {
            if found.is_none() && profile.auth_uid.as_deref() == Some(auth_uid) {
                found = Some(profile);
            }
        })?;
        Ok(found)
    }

    fn enrolled_students(&self) -> Result<Vec<StudentProfile>> {
        let mut students = Vec::new();
        self.each_student(|profile| {
            if !profile.embeddings.is_empty() && profile.auth_uid.is_some() {
                students.push(profile);
            }
        })?;
        Ok(students)
    }

    fn append_embedding(
        &self,
        auth_uid: &str,
        embedding: Embedding,
        max_history: usize,
    ) -> Result<usize> {
        let _guard = self.write_lock.lock().unwrap();
        let mut profile = self.student_by_auth_uid(auth_uid)?.ok_or_else(|| {
            AttendanceError::NotFound(format!("No student linked to account {}", auth_uid))
        })?;

        profile.embeddings.push(embedding);
        while profile.embeddings.len() > max_history {
            profile.embeddings.remove(0);
        }
        let count = profile.embeddings.len();
        self.write_doc(STUDENTS_DIR, &profile.student_id, &profile)?;
        Ok(count)
    }

    fn insert_passcode(&self, passcode: &AttendancePasscode) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        if self
            .read_doc::<AttendancePasscode>(PASSCODES_DIR, &passcode.code)?
            .is_some()
        {
            return Err(AttendanceError::Conflict(format!(
                "Passcode {} already exists",
                passcode.code
            )));
        }
        self.write_doc(PASSCODES_DIR, &passcode.code, passcode)
    }

    fn consume_passcode(&self, code: &str, now: DateTime<Utc>) -> Result<AttendancePasscode> {
        let _guard = self.write_lock.lock().unwrap();
        let mut passcode: AttendancePasscode = self
            .read_doc(PASSCODES_DIR, code)?
            .ok_or_else(|| AttendanceError::NotFound("Invalid passcode".to_string()))?;

        if passcode.used {
            return Err(AttendanceError::AlreadyUsed);
        }
        if now > passcode.expires_at {
            return Err(AttendanceError::Expired);
        }

        passcode.used = true;
        passcode.used_at = Some(now);
        self.write_doc(PASSCODES_DIR, code, &passcode)?;
        Ok(passcode)
    }

    fn attendance_for_day(&self, auth_uid: &str, date: &str) -> Result<Option<AttendanceRecord>> {
        self.read_doc(ATTENDANCE_DIR, &Self::attendance_key(auth_uid, date))
    }

    fn insert_attendance(&self, record: AttendanceRecord) -> Result<LedgerInsert> {
        let _guard = self.write_lock.lock().unwrap();
        let key = Self::attendance_key(&record.auth_uid, &record.date);
        if let Some(existing) = self.read_doc::<AttendanceRecord>(ATTENDANCE_DIR, &key)? {
            return Ok(LedgerInsert::Existing(existing));
        }
        self.write_doc(ATTENDANCE_DIR, &key, &record)?;
        Ok(LedgerInsert::Created)
    }

    fn shift_config(&self, class_key: &str, shift: &str) -> Result<Option<ShiftConfig>> {
        let config: Option<ClassConfig> = self.read_doc(CLASSES_DIR, class_key)?;
        Ok(config.and_then(|c| c.shifts.get(shift).cloned()))
    }
}
