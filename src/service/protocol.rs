use crate::common::error::{AttendanceError, Result};
use serde::{Deserialize, Serialize};

// Socket paths for the local daemon
pub const SOCKET_PATH: &str = "/run/attendance-engine/service.sock";
pub const DEV_SOCKET_PATH: &str = "/tmp/attendance-engine.sock";

/// Frames larger than this are rejected before allocation.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Operator,
}

/// Authenticated caller, resolved by the transport layer before a request
/// reaches the engine.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CallerIdentity {
    pub auth_uid: Option<String>,
    pub role: Role,
}

impl CallerIdentity {
    pub fn operator(name: &str) -> Self {
        Self {
            auth_uid: Some(name.to_string()),
            role: Role::Operator,
        }
    }

    pub fn student(auth_uid: &str) -> Self {
        Self {
            auth_uid: Some(auth_uid.to_string()),
            role: Role::Student,
        }
    }

    /// Any authenticated account.
    pub fn require_uid(&self) -> Result<&str> {
        self.auth_uid
            .as_deref()
            .filter(|uid| !uid.is_empty())
            .ok_or(AttendanceError::Unauthenticated)
    }

    /// Elevated access for scanning-station operations.
    pub fn require_operator(&self) -> Result<&str> {
        let uid = self.require_uid()?;
        if self.role != Role::Operator {
            return Err(AttendanceError::Unauthenticated);
        }
        Ok(uid)
    }
}

// Request types
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Envelope {
    pub caller: CallerIdentity,
    pub request: Request,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Request {
    Enroll(EnrollRequest),
    GeneratePasscode,
    RedeemPasscode(RedeemRequest),
    LiveMatch(LiveMatchRequest),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EnrollRequest {
    /// Owning account of the student being enrolled.
    pub auth_uid: String,
    pub image: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RedeemRequest {
    pub code: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LiveMatchRequest {
    pub image: Vec<u8>,
}

// Response types
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Response {
    Enroll(EnrollResponse),
    Passcode(PasscodeResponse),
    Redeem(RedeemResponse),
    LiveMatch(LiveMatchResponse),
    Error { kind: String, message: String },
}

impl Response {
    pub fn from_error(e: &AttendanceError) -> Self {
        Response::Error {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EnrollResponse {
    pub face_detected: bool,
    /// History length after the append; None when no face was found.
    pub embedding_count: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PasscodeResponse {
    pub code: String,
    pub valid_for_seconds: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RedeemResponse {
    /// "success" or "already_marked".
    pub status: String,
    pub student_name: String,
    pub attendance_status: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LiveMatchResponse {
    /// "success", "already_marked", "unknown" or "no_face_detected".
    pub status: String,
    pub student_name: Option<String>,
    pub attendance_status: Option<String>,
    /// Best similarity seen, for operator judgment on unknowns.
    pub similarity: Option<f32>,
}
