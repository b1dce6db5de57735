//! phaseseq turns Koala phase-map acquisitions into registered bnr sequence containers.
//!
//! # Pipeline overview
//!
//! 1. **Compose**: per-frame `*_phase.bin` files → multi-page float TIFF stack ([`compose_stack`])
//! 2. **Register**: run the external alignment tool on the stack ([`RegistrationTool`])
//! 3. **Translate log**: rewrite the tool's log as a parameter block plus per-frame shifts
//!    ([`translate_log`])
//! 4. **Encode**: aligned stack + timestamp table + metadata → bnr container ([`encode_sequence`])
//! 5. **Validate**: re-read the container and check the phase range ([`validate_container`])
//!
//! Every stage streams one frame at a time. [`PipelineWorker`] runs the stages for a set of
//! sequences on a single background thread and reports progress over a channel.
#![forbid(unsafe_code)]

mod foundation;

pub mod compose;
pub mod container;
pub mod pipeline;
pub mod preview;
pub mod registration;
pub mod source;
pub mod stack;

pub use compose::{ComposeOpts, ComposeStats, compose_stack};
pub use container::{
    BnrHeader, BnrReader, ContainerCheck, EncodeOpts, EncodeStats, PHASE_LIMIT, RangeViolation,
    ScanMode, encode_sequence, parse_timestamps, read_timestamps, validate_container,
};
pub use foundation::cancel::CancelToken;
pub use foundation::core::{AcquisitionMetadata, Frame, NoProgress, ProgressSink};
pub use foundation::error::{SeqError, SeqResult, Stage};
pub use foundation::fs::{ensure_parent_dir, prepare_destination};
pub use pipeline::{
    JobReport, KOALA_WELLS, OverwriteConfirm, Pipeline, PipelineConfig, PipelineEvent,
    PipelineWorker, RegistrationConfig, RunHandle, RunReport, SequenceJob,
};
pub use preview::write_preview_png;
pub use registration::{RegistrationJob, RegistrationTool, Shift, parse_log, translate_log};
pub use source::{FrameHeader, FrameSource, KoalaBinSource, list_phase_frames};
pub use stack::{StackReader, StackWriter};
