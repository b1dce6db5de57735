//! End-to-end conversion of acquisition folders, one sequence at a time.

pub mod config;
pub mod job;
pub mod worker;

pub use config::{PipelineConfig, RegistrationConfig};
pub use job::{FRAME_SUBDIR, KOALA_WELLS, SequenceJob};
pub use worker::{
    JobReport, OverwriteConfirm, Pipeline, PipelineEvent, PipelineWorker, RunHandle, RunReport,
};
