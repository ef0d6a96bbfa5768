pub mod clock;
pub mod config;
pub mod error;

pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use error::{AttendanceError, Result};
