use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use serde::Serialize;

use crate::compose::{ComposeOpts, compose_stack};
use crate::container::{EncodeOpts, RangeViolation, encode_sequence, validate_container};
use crate::foundation::cancel::CancelToken;
use crate::foundation::core::AcquisitionMetadata;
use crate::foundation::error::{SeqError, SeqResult, Stage};
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::job::SequenceJob;
use crate::registration::{RegistrationJob, RegistrationTool, translate_log};
use crate::source::{FrameSource, list_phase_frames};

/// Notification emitted by a running pipeline. Delivered over a channel so the consumer's own loop
/// decides when to handle it.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    JobStarted { job: String, index: usize, total: usize },
    Stage { job: String, stage: Stage },
    Progress { stage: Stage, percent: u8 },
    Warning(String),
    RangeViolation(RangeViolation),
    JobFinished(JobReport),
    Finished(RunReport),
    Failed(String),
}

/// Per-sequence outcome.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobReport {
    pub label: String,
    pub output: PathBuf,
    pub frames: usize,
    pub width: u32,
    pub height: u32,
    pub shifts: usize,
    pub metadata: AcquisitionMetadata,
}

/// Outcome of a whole run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub jobs: Vec<JobReport>,
    /// Jobs whose frame folder was missing.
    pub skipped: Vec<String>,
    pub violations: Vec<RangeViolation>,
}

/// Decides whether existing outputs may be replaced. Called once per run, before anything is
/// written, and only when at least one output already exists.
pub trait OverwriteConfirm {
    fn confirm(&mut self, existing: &[PathBuf]) -> bool;
}

impl<F: FnMut(&[PathBuf]) -> bool> OverwriteConfirm for F {
    fn confirm(&mut self, existing: &[PathBuf]) -> bool {
        self(existing)
    }
}

/// The conversion pipeline: compose → register → translate log → encode → validate.
pub struct Pipeline {
    config: PipelineConfig,
    source: Arc<dyn FrameSource + Send + Sync>,
    tool: RegistrationTool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, source: Arc<dyn FrameSource + Send + Sync>) -> SeqResult<Self> {
        let tool = config.registration.tool()?;
        Ok(Self {
            config,
            source,
            tool,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run `jobs` one after another on the calling thread.
    pub fn run(
        &self,
        jobs: &[SequenceJob],
        confirm: &mut dyn OverwriteConfirm,
        events: &Sender<PipelineEvent>,
        cancel: &CancelToken,
    ) -> SeqResult<RunReport> {
        let emit = |ev: PipelineEvent| {
            let _ = events.send(ev);
        };

        let existing: Vec<PathBuf> = jobs
            .iter()
            .flat_map(|j| j.outputs())
            .filter(|p| p.exists())
            .map(Path::to_path_buf)
            .collect();
        if !existing.is_empty() {
            tracing::warn!(count = existing.len(), "some outputs already exist");
            if !confirm.confirm(&existing) {
                return Err(SeqError::OverwriteDeclined { paths: existing });
            }
        }
        let overwrite = !existing.is_empty();

        let mut report = RunReport::default();
        let total = jobs.len();
        for (index, job) in jobs.iter().enumerate() {
            if !job.frames_dir.is_dir() {
                let msg = format!("files missing for '{}': no folder '{}'", job.label, job.frames_dir.display());
                tracing::warn!("{msg}");
                emit(PipelineEvent::Warning(msg));
                report.skipped.push(job.label.clone());
                continue;
            }
            if cancel.is_cancelled() {
                return Err(SeqError::Cancelled);
            }

            tracing::info!(job = %job.label, "processing sequence");
            emit(PipelineEvent::JobStarted {
                job: job.label.clone(),
                index,
                total,
            });
            let done = self.run_job(job, overwrite, events, cancel)?;
            emit(PipelineEvent::JobFinished(done.clone()));
            report.jobs.push(done);
        }

        for done in &report.jobs {
            emit(PipelineEvent::Stage {
                job: done.label.clone(),
                stage: Stage::Validate,
            });
            let check = validate_container(&done.output, self.config.scan_mode)
                .map_err(|e| e.in_stage(Stage::Validate, &done.label))?;
            if let Some(v) = check.violation {
                emit(PipelineEvent::RangeViolation(v.clone()));
                report.violations.push(v);
            }
        }

        tracing::info!(
            converted = report.jobs.len(),
            skipped = report.skipped.len(),
            violations = report.violations.len(),
            "run finished"
        );
        Ok(report)
    }

    fn run_job(
        &self,
        job: &SequenceJob,
        overwrite: bool,
        events: &Sender<PipelineEvent>,
        cancel: &CancelToken,
    ) -> SeqResult<JobReport> {
        let stage_event = |stage| {
            let _ = events.send(PipelineEvent::Stage {
                job: job.label.clone(),
                stage,
            });
        };
        let progress_for = |stage| {
            let tx = events.clone();
            move |percent| {
                let _ = tx.send(PipelineEvent::Progress { stage, percent });
            }
        };
        let in_stage = |stage| move |e: SeqError| e.in_stage(stage, &job.label);

        stage_event(Stage::Compose);
        let frames = list_phase_frames(&job.frames_dir).map_err(in_stage(Stage::Compose))?;
        let composed = compose_stack(
            self.source.as_ref(),
            &frames,
            &job.stack,
            ComposeOpts { overwrite },
            &mut progress_for(Stage::Compose),
        )
        .map_err(in_stage(Stage::Compose))?;

        let mut metadata = self.config.metadata;
        if self.config.pixel_size_from_frames {
            metadata.pixel_size = composed.first_header.pixel_size;
        }

        if cancel.is_cancelled() {
            return Err(SeqError::Cancelled);
        }
        stage_event(Stage::Register);
        let reg = RegistrationJob::single(&job.stack, &job.aligned, &job.log).with_overwrite(overwrite);
        self.tool.run(&reg, cancel).map_err(in_stage(Stage::Register))?;

        stage_event(Stage::TranslateLog);
        let shifts = translate_log(&job.log).map_err(in_stage(Stage::TranslateLog))?;

        if !self.config.keep_intermediates {
            remove_intermediate(&job.stack);
        }

        stage_event(Stage::Encode);
        let encoded = encode_sequence(
            &job.aligned,
            &job.timestamps,
            &metadata,
            &job.output,
            EncodeOpts { overwrite },
            &mut progress_for(Stage::Encode),
        )
        .map_err(in_stage(Stage::Encode))?;

        if !self.config.keep_intermediates {
            remove_intermediate(&job.aligned);
        }

        Ok(JobReport {
            label: job.label.clone(),
            output: job.output.clone(),
            frames: encoded.header.frame_count as usize,
            width: composed.width,
            height: composed.height,
            shifts: shifts.len(),
            metadata,
        })
    }
}

fn remove_intermediate(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "could not remove intermediate stack");
    }
}

/// Releases the busy flag when the run ends, including by unwinding.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to a run started by [`PipelineWorker::submit`].
pub struct RunHandle {
    handle: JoinHandle<SeqResult<RunReport>>,
    cancel: CancelToken,
}

impl RunHandle {
    /// Ask the run to stop; a running registration tool is killed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) -> SeqResult<RunReport> {
        self.handle
            .join()
            .map_err(|_| SeqError::Other(anyhow::anyhow!("pipeline worker panicked")))?
    }
}

/// Single-slot background worker. At most one run is in flight; a second `submit` while one is
/// running fails with [`SeqError::Busy`].
pub struct PipelineWorker {
    pipeline: Arc<Pipeline>,
    busy: Arc<AtomicBool>,
    events: Sender<PipelineEvent>,
}

impl PipelineWorker {
    /// Create the worker and the receiving end of its event channel.
    pub fn new(pipeline: Pipeline) -> (Self, Receiver<PipelineEvent>) {
        let (tx, rx) = mpsc::channel();
        let worker = Self {
            pipeline: Arc::new(pipeline),
            busy: Arc::new(AtomicBool::new(false)),
            events: tx,
        };
        (worker, rx)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Start processing `jobs` on a background thread.
    pub fn submit<C>(&self, jobs: Vec<SequenceJob>, mut confirm: C) -> SeqResult<RunHandle>
    where
        C: OverwriteConfirm + Send + 'static,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SeqError::Busy);
        }
        let guard = BusyGuard(Arc::clone(&self.busy));

        let pipeline = Arc::clone(&self.pipeline);
        let events = self.events.clone();
        let cancel = CancelToken::new();
        let run_cancel = cancel.clone();

        let handle = std::thread::Builder::new()
            .name("phaseseq-pipeline".to_owned())
            .spawn(move || {
                let result = pipeline.run(&jobs, &mut confirm, &events, &run_cancel);
                drop(guard);
                let _ = events.send(match &result {
                    Ok(report) => PipelineEvent::Finished(report.clone()),
                    Err(e) => PipelineEvent::Failed(e.to_string()),
                });
                result
            })
            .map_err(|e| SeqError::Other(anyhow::anyhow!("failed to spawn pipeline worker: {e}")))?;

        Ok(RunHandle { handle, cancel })
    }
}
