//! The bnr sequence container: encoding, reading and range validation.

pub mod encoder;
pub mod format;
pub mod reader;
pub mod timestamps;
pub mod validator;

pub use encoder::{EncodeOpts, EncodeStats, encode_sequence};
pub use format::BnrHeader;
pub use reader::BnrReader;
pub use timestamps::{TIME_COLUMN, parse_timestamps, read_timestamps};
pub use validator::{ContainerCheck, PHASE_LIMIT, RangeViolation, ScanMode, validate_container};
