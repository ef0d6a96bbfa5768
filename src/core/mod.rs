pub mod cache;
pub mod enroll;
pub mod ledger;
pub mod matcher;
pub mod passcode;
pub mod status;

pub use cache::{EmbeddingCache, Snapshot};
pub use enroll::{EmbeddingProvider, EnrollOutcome, EnrollmentPipeline};
pub use ledger::{LedgerOutcome, LedgerWriter};
pub use matcher::{cosine_similarity, FaceMatcher, MatchOutcome};
pub use passcode::{IssuedPasscode, PasscodeService};
pub use status::{StatusCalculator, StatusDecision};
