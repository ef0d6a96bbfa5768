pub mod embedding;
pub mod handlers;
pub mod protocol;

pub use embedding::HttpEmbeddingClient;
pub use handlers::{AttendanceEngine, LiveMatchOutcome, RedeemOutcome};
pub use protocol::{CallerIdentity, Envelope, Request, Response, Role};
