// Core modules
pub mod common;
pub mod core;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use common::{AttendanceError, Clock, Config, Result, SystemClock};
pub use core::{
    cosine_similarity, EmbeddingCache, EmbeddingProvider, EnrollOutcome, FaceMatcher,
    LedgerOutcome, MatchOutcome, PasscodeService, StatusCalculator,
};
pub use service::{AttendanceEngine, CallerIdentity, HttpEmbeddingClient, LiveMatchOutcome, RedeemOutcome};
pub use storage::{
    AttendancePasscode, AttendanceRecord, AttendanceStatus, AttendanceStore, Embedding, FileStore,
    MemoryStore, ShiftConfig, StudentProfile,
};
