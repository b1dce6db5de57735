use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::foundation::cancel::CancelToken;
use crate::foundation::error::{SeqError, SeqResult};
use crate::foundation::fs::prepare_destination;

/// Separates repeated paths inside one argument group.
pub const PATH_DELIMITER: char = '*';
/// Separates the input, output and log groups.
pub const GROUP_DELIMITER: char = '?';

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Input/output/log paths handed to the registration tool in a single argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationJob {
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    /// Log files; may be empty for batch macros that do not write logs.
    pub logs: Vec<PathBuf>,
    /// Remove pre-existing outputs and logs before the tool runs instead of failing.
    pub overwrite: bool,
}

impl RegistrationJob {
    /// One stack: `input?output?log`.
    pub fn single(input: impl Into<PathBuf>, output: impl Into<PathBuf>, log: impl Into<PathBuf>) -> Self {
        Self {
            inputs: vec![input.into()],
            outputs: vec![output.into()],
            logs: vec![log.into()],
            overwrite: false,
        }
    }

    /// Several stacks in one invocation: `in1*in2?out1*out2`.
    pub fn batch(pairs: impl IntoIterator<Item = (PathBuf, PathBuf)>) -> Self {
        let (inputs, outputs) = pairs.into_iter().unzip();
        Self {
            inputs,
            outputs,
            logs: Vec::new(),
            overwrite: false,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    fn validate(&self) -> SeqResult<()> {
        if self.inputs.is_empty() {
            return Err(SeqError::validation("registration job has no input stack"));
        }
        if self.outputs.len() != self.inputs.len() {
            return Err(SeqError::validation(format!(
                "registration job has {} inputs but {} outputs",
                self.inputs.len(),
                self.outputs.len()
            )));
        }
        if !self.logs.is_empty() && self.logs.len() != self.inputs.len() {
            return Err(SeqError::validation(format!(
                "registration job has {} inputs but {} logs",
                self.inputs.len(),
                self.logs.len()
            )));
        }
        for path in self.inputs.iter().chain(&self.outputs).chain(&self.logs) {
            let s = path.to_string_lossy();
            if s.contains([PATH_DELIMITER, GROUP_DELIMITER]) {
                return Err(SeqError::validation(format!(
                    "path '{s}' contains a reserved delimiter ('{PATH_DELIMITER}' or '{GROUP_DELIMITER}')"
                )));
            }
        }
        Ok(())
    }

    /// The delimited argument string passed to the tool.
    pub fn argument(&self) -> String {
        let join = |paths: &[PathBuf]| {
            paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(&PATH_DELIMITER.to_string())
        };
        let mut groups = vec![join(&self.inputs), join(&self.outputs)];
        if !self.logs.is_empty() {
            groups.push(join(&self.logs));
        }
        groups.join(&GROUP_DELIMITER.to_string())
    }
}

/// External registration program, e.g. Fiji running the SIFT alignment macro.
#[derive(Clone, Debug)]
pub struct RegistrationTool {
    pub program: PathBuf,
    /// Arguments placed before the job argument.
    pub args: Vec<String>,
    /// Kill the tool when it runs longer than this. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl RegistrationTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Fiji in console mode running `macro_path`: `<exe> --console -macro <macro> <job>`.
    pub fn fiji(exe: impl Into<PathBuf>, macro_path: &Path) -> Self {
        Self {
            program: exe.into(),
            args: vec![
                "--console".to_owned(),
                "-macro".to_owned(),
                macro_path.to_string_lossy().into_owned(),
            ],
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn check_program(&self) -> SeqResult<()> {
        let has_dir = self.program.components().count() > 1;
        if has_dir && !self.program.is_file() {
            return Err(SeqError::registration(format!(
                "registration tool not found: '{}'",
                self.program.display()
            )));
        }
        Ok(())
    }

    /// Run the tool on `job` and wait for it to exit.
    ///
    /// The child inherits stdout/stderr. It is killed when the timeout elapses or `cancel` fires.
    /// On success every output and log named by the job must exist.
    #[tracing::instrument(skip_all, fields(program = %self.program.display()))]
    pub fn run(&self, job: &RegistrationJob, cancel: &CancelToken) -> SeqResult<()> {
        job.validate()?;
        self.check_program()?;
        for out in job.outputs.iter().chain(&job.logs) {
            prepare_destination(out, job.overwrite)?;
        }

        let arg = job.argument();
        tracing::info!(args = ?self.args, job = %arg, "starting registration tool");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&arg)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                SeqError::registration(format!(
                    "failed to spawn '{}': {e}",
                    self.program.display()
                ))
            })?;

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    return Err(SeqError::registration(format!(
                        "failed to poll registration tool: {e}"
                    )));
                }
            }

            let timed_out = self.timeout.is_some_and(|t| started.elapsed() >= t);
            if timed_out || cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                if timed_out {
                    tracing::warn!(elapsed = ?started.elapsed(), "registration tool timed out");
                    return Err(SeqError::registration(format!(
                        "registration tool did not finish within {:?}",
                        self.timeout.unwrap_or_default()
                    )));
                }
                tracing::warn!("registration tool cancelled");
                return Err(SeqError::Cancelled);
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            return Err(SeqError::registration(format!(
                "registration tool exited with status {status}"
            )));
        }

        for expected in job.outputs.iter().chain(&job.logs) {
            if !expected.is_file() {
                return Err(SeqError::registration(format!(
                    "registration tool finished without writing '{}'",
                    expected.display()
                )));
            }
        }
        tracing::info!(elapsed = ?started.elapsed(), "registration finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_argument_uses_group_delimiter() {
        let job = RegistrationJob::single("/d/w1_phase.tif", "/d/w1_aligned.tif", "/d/log.txt");
        assert_eq!(job.argument(), "/d/w1_phase.tif?/d/w1_aligned.tif?/d/log.txt");
    }

    #[test]
    fn batch_argument_joins_paths_per_group() {
        let job = RegistrationJob::batch([
            (PathBuf::from("a.tif"), PathBuf::from("a_al.tif")),
            (PathBuf::from("b.tif"), PathBuf::from("b_al.tif")),
            (PathBuf::from("c.tif"), PathBuf::from("c_al.tif")),
        ]);
        assert_eq!(job.argument(), "a.tif*b.tif*c.tif?a_al.tif*b_al.tif*c_al.tif");
    }

    #[test]
    fn reserved_delimiters_in_paths_are_rejected() {
        let job = RegistrationJob::single("in?.tif", "out.tif", "log.txt");
        assert!(matches!(job.validate(), Err(SeqError::Validation(_))));
        let job = RegistrationJob::single("in.tif", "out*.tif", "log.txt");
        assert!(job.validate().is_err());
    }

    #[test]
    fn fiji_command_layout() {
        let tool = RegistrationTool::fiji("ImageJ-win64.exe", Path::new("macro_SIFT.ijm"));
        assert_eq!(tool.args, vec!["--console", "-macro", "macro_SIFT.ijm"]);
        assert!(tool.timeout.is_none());
    }

    #[test]
    fn missing_program_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RegistrationTool::new(dir.path().join("no-such-fiji"));
        let job = RegistrationJob::single(
            dir.path().join("in.tif"),
            dir.path().join("out.tif"),
            dir.path().join("log.txt"),
        );
        let err = tool.run(&job, &CancelToken::new()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
