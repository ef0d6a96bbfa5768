use crate::common::clock::Clock;
use crate::common::config::Config;
use crate::common::error::{AttendanceError, Result};
use crate::core::{
    EmbeddingCache, EmbeddingProvider, EnrollOutcome, EnrollmentPipeline, FaceMatcher,
    IssuedPasscode, LedgerOutcome, LedgerWriter, MatchOutcome, PasscodeService, StatusCalculator,
};
use crate::service::protocol::CallerIdentity;
use crate::storage::{AttendanceStatus, AttendanceStore, StudentProfile};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum RedeemOutcome {
    Marked {
        student_name: String,
        status: AttendanceStatus,
    },
    AlreadyMarked {
        student_name: String,
        status: AttendanceStatus,
    },
}

#[derive(Debug, Clone)]
pub enum LiveMatchOutcome {
    Success {
        student_name: String,
        status: AttendanceStatus,
    },
    AlreadyMarked {
        student_name: String,
        status: AttendanceStatus,
    },
    Unknown {
        similarity: f32,
    },
    NoFaceDetected,
}

/// Wires the core components together and enforces caller authorization.
/// One instance serves concurrent requests; the embedding cache is the
/// only shared mutable state.
pub struct AttendanceEngine {
    store: Arc<dyn AttendanceStore>,
    clock: Arc<dyn Clock>,
    provider: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
    matcher: FaceMatcher,
    pipeline: EnrollmentPipeline,
    passcodes: PasscodeService,
    calculator: StatusCalculator,
    ledger: LedgerWriter,
}

impl AttendanceEngine {
    pub fn new(
        config: &Config,
        store: Arc<dyn AttendanceStore>,
        provider: Arc<dyn EmbeddingProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let cache = EmbeddingCache::new(
            Duration::from_secs(config.matcher.cache_ttl_seconds),
            clock.clone(),
        );
        let matcher = FaceMatcher::new(config.matcher.similarity_threshold);
        let pipeline = EnrollmentPipeline::new(
            provider.clone(),
            store.clone(),
            config.enrollment.max_embeddings,
        );
        let passcodes = PasscodeService::new(
            store.clone(),
            clock.clone(),
            Duration::from_secs(config.passcode.validity_seconds),
            config.passcode.code_length,
        );
        let calculator = StatusCalculator::new(
            config.attendance.utc_offset_hours,
            config.attendance.default_grace_minutes,
        )?;
        let ledger = LedgerWriter::new(store.clone(), clock.clone());

        Ok(Self {
            store,
            clock,
            provider,
            cache,
            matcher,
            pipeline,
            passcodes,
            calculator,
            ledger,
        })
    }

    /// Enroll one captured image for a student's account. Fire-and-forget
    /// from the caller's perspective; a missing face is a soft failure.
    pub fn enroll(
        &self,
        caller: &CallerIdentity,
        auth_uid: &str,
        image: &[u8],
    ) -> Result<EnrollOutcome> {
        caller.require_operator()?;
        if auth_uid.is_empty() {
            return Err(AttendanceError::InvalidArgument(
                "Enrollment requires a target account id".to_string(),
            ));
        }
        if image.is_empty() {
            return Err(AttendanceError::InvalidArgument(
                "Enrollment requires an image".to_string(),
            ));
        }
        self.pipeline.enroll_image(auth_uid, image)
    }

    /// Issue a short-lived passcode bound to the calling student.
    pub fn generate_passcode(&self, caller: &CallerIdentity) -> Result<IssuedPasscode> {
        let auth_uid = caller.require_uid()?;
        self.passcodes.issue(auth_uid)
    }

    /// Redeem a scanned passcode. The code is consumed before the student
    /// lookup, so a downstream failure leaves it burned; that is the
    /// price of making double redemption impossible.
    pub fn redeem_passcode(&self, caller: &CallerIdentity, code: &str) -> Result<RedeemOutcome> {
        let operator = caller.require_operator()?;
        let code = code.trim();
        if code.is_empty() {
            return Err(AttendanceError::InvalidArgument(
                "Redemption requires a passcode".to_string(),
            ));
        }

        let passcode = self.passcodes.consume(code)?;

        let student = self
            .store
            .student_by_auth_uid(&passcode.student_auth_uid)?
            .ok_or_else(|| {
                tracing::warn!(
                    "Passcode {} consumed but account {} has no student profile",
                    passcode.code,
                    passcode.student_auth_uid
                );
                AttendanceError::NotFound(format!(
                    "No student linked to account {}",
                    passcode.student_auth_uid
                ))
            })?;

        let scanned_by = format!("Passcode scan by {}", operator);
        match self.decide_and_mark(&student, &scanned_by)? {
            LedgerOutcome::Recorded { status } => Ok(RedeemOutcome::Marked {
                student_name: student.full_name,
                status,
            }),
            LedgerOutcome::AlreadyMarked { status } => Ok(RedeemOutcome::AlreadyMarked {
                student_name: student.full_name,
                status,
            }),
        }
    }

    /// Match one live image against the enrolled population and mark
    /// attendance for the best match at or above the threshold.
    pub fn live_match(&self, caller: &CallerIdentity, image: &[u8]) -> Result<LiveMatchOutcome> {
        let operator = caller.require_operator()?;
        if image.is_empty() {
            return Err(AttendanceError::InvalidArgument(
                "Live match requires an image".to_string(),
            ));
        }

        let live = match self.provider.embedding_from_image(image)? {
            Some(embedding) => embedding,
            None => return Ok(LiveMatchOutcome::NoFaceDetected),
        };

        let snapshot = self.cache.snapshot(self.store.as_ref());
        let (matched, similarity) = match self.matcher.match_embedding(&live, &snapshot) {
            MatchOutcome::Match {
                student,
                similarity,
            } => (student, similarity),
            MatchOutcome::Unknown { similarity } => {
                return Ok(LiveMatchOutcome::Unknown { similarity })
            }
        };

        // The cache may be up to a TTL stale; re-read the profile so the
        // decision uses current class/shift/grace data.
        let auth_uid = matched.auth_uid.as_deref().unwrap_or_default();
        let student = match self.store.student_by_auth_uid(auth_uid)? {
            Some(student) => student,
            None => {
                tracing::warn!(
                    "Matched cached student {} but the profile is gone",
                    matched.student_id
                );
                return Ok(LiveMatchOutcome::Unknown { similarity });
            }
        };

        let scanned_by = format!("Face scan by {}", operator);
        match self.decide_and_mark(&student, &scanned_by)? {
            LedgerOutcome::Recorded { status } => Ok(LiveMatchOutcome::Success {
                student_name: student.full_name,
                status,
            }),
            LedgerOutcome::AlreadyMarked { status } => Ok(LiveMatchOutcome::AlreadyMarked {
                student_name: student.full_name,
                status,
            }),
        }
    }

    fn decide_and_mark(
        &self,
        student: &StudentProfile,
        scanned_by: &str,
    ) -> Result<LedgerOutcome> {
        let shift_config = self
            .store
            .shift_config(student.class_key(), &student.shift)?;
        let decision = self
            .calculator
            .decide(student, shift_config.as_ref(), self.clock.now())?;
        self.ledger.mark(student, &decision, scanned_by)
    }
}
