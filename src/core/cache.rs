use crate::common::clock::Clock;
use crate::storage::{AttendanceStore, StudentProfile};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Immutable view of every enrolled student at one point in time. Replaced
/// wholesale on refresh; readers holding an `Arc` keep a consistent view.
pub struct Snapshot {
    pub students: Vec<StudentProfile>,
    pub refreshed_at: DateTime<Utc>,
}

/// Time-bounded snapshot of enrolled embeddings. Newly enrolled students
/// stay invisible to matching for up to the TTL; that staleness is an
/// accepted tradeoff for keeping the hot path free of store reads.
pub struct EmbeddingCache {
    current: RwLock<Option<Arc<Snapshot>>>,
    /// Serializes rebuilders so concurrent expiries fetch once, not N times.
    refresh_lock: Mutex<()>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl EmbeddingCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            ttl,
            clock,
        }
    }

    /// Returns a snapshot no older than the TTL, refreshing from the store
    /// if needed. A failed refresh logs a warning and serves the
    /// last-known-good snapshot rather than propagating the error.
    pub fn snapshot(&self, store: &dyn AttendanceStore) -> Arc<Snapshot> {
        let now = self.clock.now();
        if let Some(snapshot) = self.fresh_snapshot(now) {
            return snapshot;
        }

        let _guard = self.refresh_lock.lock().unwrap();
        // Another thread may have refreshed while we waited for the lock.
        if let Some(snapshot) = self.fresh_snapshot(self.clock.now()) {
            return snapshot;
        }

        match store.enrolled_students() {
            Ok(students) => {
                let snapshot = Arc::new(Snapshot {
                    students,
                    refreshed_at: self.clock.now(),
                });
                tracing::debug!(
                    "Embedding cache refreshed: {} enrolled students",
                    snapshot.students.len()
                );
                *self.current.write().unwrap() = Some(Arc::clone(&snapshot));
                snapshot
            }
            Err(e) => {
                tracing::warn!("Embedding cache refresh failed, serving stale snapshot: {}", e);
                let stale = self.current.read().unwrap().clone();
                stale.unwrap_or_else(|| {
                    Arc::new(Snapshot {
                        students: Vec::new(),
                        refreshed_at: self.clock.now(),
                    })
                })
            }
        }
    }

    fn fresh_snapshot(&self, now: DateTime<Utc>) -> Option<Arc<Snapshot>> {
        let current = self.current.read().unwrap();
        let snapshot = current.as_ref()?;
        let age = (now - snapshot.refreshed_at).to_std().unwrap_or(Duration::ZERO);
        if age < self.ttl && !snapshot.students.is_empty() {
            Some(Arc::clone(snapshot))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::test_support::FixedClock;
    use crate::common::error::{AttendanceError, Result};
    use crate::storage::model::{
        AttendancePasscode, AttendanceRecord, Embedding, ShiftConfig,
    };
    use crate::storage::store::LedgerInsert;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn enrolled(store: &MemoryStore, id: &str) {
        store.upsert_student(StudentProfile {
            student_id: id.to_string(),
            auth_uid: Some(format!("uid-{}", id)),
            full_name: format!("Student {}", id),
            class: "12B".to_string(),
            shift: "Morning".to_string(),
            grace_period_minutes: None,
            embeddings: vec![vec![1.0, 0.0]],
        });
    }

    fn cache_with_clock() -> (EmbeddingCache, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 8, 4, 1, 0, 0).unwrap(),
        ));
        let cache = EmbeddingCache::new(Duration::from_secs(300), clock.clone());
        (cache, clock)
    }

    #[test]
    fn serves_cached_snapshot_within_ttl() {
        let store = MemoryStore::new();
        enrolled(&store, "a");
        let (cache, clock) = cache_with_clock();

        let first = cache.snapshot(&store);
        enrolled(&store, "b");

        clock.advance(chrono::Duration::seconds(200));
        let second = cache.snapshot(&store);
        // Still the same snapshot: "b" is invisible until the TTL lapses.
        assert_eq!(second.students.len(), 1);
        assert_eq!(first.refreshed_at, second.refreshed_at);
    }

    #[test]
    fn refreshes_after_ttl() {
        let store = MemoryStore::new();
        enrolled(&store, "a");
        let (cache, clock) = cache_with_clock();

        cache.snapshot(&store);
        enrolled(&store, "b");

        clock.advance(chrono::Duration::seconds(301));
        let refreshed = cache.snapshot(&store);
        assert_eq!(refreshed.students.len(), 2);
    }

    /// Store whose student listing fails after the first call.
    struct FlakyStore {
        inner: MemoryStore,
        calls: AtomicUsize,
    }

    impl AttendanceStore for FlakyStore {
        fn student_by_auth_uid(&self, auth_uid: &str) -> Result<Option<StudentProfile>> {
            self.inner.student_by_auth_uid(auth_uid)
        }
        fn enrolled_students(&self) -> Result<Vec<StudentProfile>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.inner.enrolled_students()
            } else {
                Err(AttendanceError::Storage("backend unavailable".to_string()))
            }
        }
        fn append_embedding(
            &self,
            auth_uid: &str,
            embedding: Embedding,
            max_history: usize,
        ) -> Result<usize> {
            self.inner.append_embedding(auth_uid, embedding, max_history)
        }
        fn insert_passcode(&self, passcode: &AttendancePasscode) -> Result<()> {
            self.inner.insert_passcode(passcode)
        }
        fn consume_passcode(
            &self,
            code: &str,
            now: DateTime<Utc>,
        ) -> Result<AttendancePasscode> {
            self.inner.consume_passcode(code, now)
        }
        fn attendance_for_day(
            &self,
            auth_uid: &str,
            date: &str,
        ) -> Result<Option<AttendanceRecord>> {
            self.inner.attendance_for_day(auth_uid, date)
        }
        fn insert_attendance(&self, record: AttendanceRecord) -> Result<LedgerInsert> {
            self.inner.insert_attendance(record)
        }
        fn shift_config(&self, class_key: &str, shift: &str) -> Result<Option<ShiftConfig>> {
            self.inner.shift_config(class_key, shift)
        }
    }

    #[test]
    fn failed_refresh_serves_stale_snapshot() {
        let inner = MemoryStore::new();
        enrolled(&inner, "a");
        let store = FlakyStore {
            inner,
            calls: AtomicUsize::new(0),
        };
        let (cache, clock) = cache_with_clock();

        let first = cache.snapshot(&store);
        assert_eq!(first.students.len(), 1);

        clock.advance(chrono::Duration::seconds(301));
        let stale = cache.snapshot(&store);
        assert_eq!(stale.students.len(), 1);
        assert_eq!(stale.refreshed_at, first.refreshed_at);
    }
}
