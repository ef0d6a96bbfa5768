use crate::common::error::Result;
use crate::storage::model::{
    AttendancePasscode, AttendanceRecord, Embedding, ShiftConfig, StudentProfile,
};
use chrono::{DateTime, Utc};

/// Outcome of the ledger's atomic check-then-insert.
#[derive(Debug, Clone)]
pub enum LedgerInsert {
    Created,
    /// A record for this (auth_uid, date) already existed; carried back so
    /// callers can report the prior status.
    Existing(AttendanceRecord),
}

/// Document-store seam. The deployed system sits on a managed document
/// database; tests and the local daemon use the in-process implementations.
/// Every method that mutates is atomic per document (or per ledger key),
/// which the passcode flip and embedding append rely on.
pub trait AttendanceStore: Send + Sync {
    fn student_by_auth_uid(&self, auth_uid: &str) -> Result<Option<StudentProfile>>;

    /// Students eligible for matching: at least one embedding and a linked
    /// auth uid.
    fn enrolled_students(&self) -> Result<Vec<StudentProfile>>;

    /// Atomically append an embedding to the student owning `auth_uid`,
    /// evicting the oldest entry while more than `max_history` are stored.
    /// Returns the resulting history length.
    fn append_embedding(
        &self,
        auth_uid: &str,
        embedding: Embedding,
        max_history: usize,
    ) -> Result<usize>;

    fn insert_passcode(&self, passcode: &AttendancePasscode) -> Result<()>;

    /// Atomically look up `code` and flip `used` to true. Fails with
    /// NotFound / AlreadyUsed / Expired without mutating anything; on
    /// success the returned passcode reflects the consumed state.
    fn consume_passcode(&self, code: &str, now: DateTime<Utc>) -> Result<AttendancePasscode>;

    fn attendance_for_day(&self, auth_uid: &str, date: &str) -> Result<Option<AttendanceRecord>>;

    /// Atomic per (auth_uid, date): insert the record unless one already
    /// exists, in which case the existing record is returned untouched.
    fn insert_attendance(&self, record: AttendanceRecord) -> Result<LedgerInsert>;

    fn shift_config(&self, class_key: &str, shift: &str) -> Result<Option<ShiftConfig>>;
}
