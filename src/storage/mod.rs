pub mod file;
pub mod memory;
pub mod model;
pub mod store;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use model::{
    AttendancePasscode, AttendanceRecord, AttendanceStatus, ClassConfig, Embedding, ShiftConfig,
    StudentProfile,
};
pub use store::{AttendanceStore, LedgerInsert};
