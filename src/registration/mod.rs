//! External stack registration: running the tool and translating its log.

pub mod log;
pub mod tool;

pub use log::{LineError, SIFT_PARAMETERS, Shift, TRANSFORM_MARKER, parse_log, render_report, translate_log};
pub use tool::{RegistrationJob, RegistrationTool};
