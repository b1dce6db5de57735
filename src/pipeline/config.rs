use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::container::ScanMode;
use crate::foundation::core::AcquisitionMetadata;
use crate::foundation::error::{SeqError, SeqResult};
use crate::registration::RegistrationTool;

/// How to invoke the external registration tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrationConfig {
    /// Tool executable (a bare name is looked up on `PATH`).
    pub program: PathBuf,
    /// Fiji macro to run; adds `--console -macro <macro>` ahead of `args`.
    pub macro_path: Option<PathBuf>,
    /// Extra arguments placed before the job argument.
    pub args: Vec<String>,
    /// Kill the tool after this many seconds. Absent means wait indefinitely.
    pub timeout_secs: Option<f64>,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ImageJ-linux64"),
            macro_path: None,
            args: Vec::new(),
            timeout_secs: None,
        }
    }
}

impl RegistrationConfig {
    pub fn tool(&self) -> SeqResult<RegistrationTool> {
        let timeout = match self.timeout_secs {
            None => None,
            Some(secs) if secs > 0.0 => Some(Duration::try_from_secs_f64(secs).map_err(|e| {
                SeqError::validation(format!("registration timeout of {secs} seconds is not usable: {e}"))
            })?),
            Some(secs) => {
                return Err(SeqError::validation(format!(
                    "registration timeout must be a positive number of seconds, got {secs}"
                )));
            }
        };

        let mut tool = match &self.macro_path {
            Some(m) => RegistrationTool::fiji(&self.program, m),
            None => RegistrationTool::new(&self.program),
        };
        tool.args.extend(self.args.iter().cloned());
        Ok(tool.with_timeout(timeout))
    }
}

/// Settings of a pipeline run, loadable from JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub registration: RegistrationConfig,
    /// Scalars written into every container header.
    pub metadata: AcquisitionMetadata,
    /// Take the pixel size from the first frame file of each sequence instead of `metadata`.
    pub pixel_size_from_frames: bool,
    pub scan_mode: ScanMode,
    /// Keep the composed and aligned TIFF stacks after encoding.
    pub keep_intermediates: bool,
}

impl PipelineConfig {
    pub fn from_json_str(s: &str) -> SeqResult<Self> {
        let cfg: Self = serde_json::from_str(s).context("parse pipeline config JSON")?;
        cfg.registration.tool()?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> SeqResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read pipeline config '{}'", path.display()))?;
        Self::from_json_str(&text)
    }
}
