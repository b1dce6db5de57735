use std::fmt;
use std::path::{Path, PathBuf};

/// Result alias used throughout the crate.
pub type SeqResult<T> = Result<T, SeqError>;

/// Pipeline stage an error was raised in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Frame files to multi-page stack.
    Compose,
    /// External registration tool.
    Register,
    /// Registration log rewrite.
    TranslateLog,
    /// Stack + timestamps to bnr container.
    Encode,
    /// Container range check.
    Validate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Compose => "compose",
            Stage::Register => "register",
            Stage::TranslateLog => "translate-log",
            Stage::Encode => "encode",
            Stage::Validate => "validate",
        };
        f.write_str(s)
    }
}

/// Errors raised by the sequence codec and pipeline.
///
/// Range violations found by the container check are reported as data, never as errors.
#[derive(thiserror::Error, Debug)]
pub enum SeqError {
    #[error("decode error: '{}': {msg}", path.display())]
    Decode { path: PathBuf, msg: String },

    #[error("parse error: '{}' line {line}: {msg}", path.display())]
    Parse {
        path: PathBuf,
        /// 1-based line number; 0 when the error concerns the file as a whole.
        line: usize,
        msg: String,
    },

    #[error("io error: '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("registration error: {0}")]
    Registration(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("a pipeline run is already in progress")]
    Busy,

    #[error("overwrite of {} existing output(s) was declined", paths.len())]
    OverwriteDeclined { paths: Vec<PathBuf> },

    #[error("{stage} failed for '{job}': {source}")]
    Stage {
        stage: Stage,
        job: String,
        #[source]
        source: Box<SeqError>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SeqError {
    pub fn decode(path: impl AsRef<Path>, msg: impl Into<String>) -> Self {
        Self::Decode {
            path: path.as_ref().to_path_buf(),
            msg: msg.into(),
        }
    }

    pub fn parse(path: impl AsRef<Path>, line: usize, msg: impl Into<String>) -> Self {
        Self::Parse {
            path: path.as_ref().to_path_buf(),
            line,
            msg: msg.into(),
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn registration(msg: impl Into<String>) -> Self {
        Self::Registration(msg.into())
    }

    /// Attach the pipeline stage and job label to an error.
    pub fn in_stage(self, stage: Stage, job: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            job: job.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, looking through [`SeqError::Stage`] wrappers.
    pub fn root(&self) -> &SeqError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Extension for mapping `std::io::Result` onto [`SeqError::Io`] with the offending path.
pub(crate) trait IoResultExt<T> {
    fn at_path(self, path: &Path) -> SeqResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at_path(self, path: &Path) -> SeqResult<T> {
        self.map_err(|e| SeqError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            SeqError::decode("a.bin", "x")
                .to_string()
                .starts_with("decode error:")
        );
        assert!(
            SeqError::parse("t.txt", 3, "x")
                .to_string()
                .contains("line 3")
        );
        assert!(
            SeqError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            SeqError::registration("x")
                .to_string()
                .contains("registration error:")
        );
    }

    #[test]
    fn stage_wrapper_keeps_root_and_context() {
        let err = SeqError::parse("ts.txt", 2, "bad").in_stage(Stage::Encode, "00001_00001");
        let msg = err.to_string();
        assert!(msg.contains("encode failed"));
        assert!(msg.contains("00001_00001"));
        assert!(matches!(err.root(), SeqError::Parse { line: 2, .. }));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = SeqError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
