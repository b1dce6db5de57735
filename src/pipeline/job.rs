use std::path::{Path, PathBuf};

/// The four well positions of a 4-well Koala acquisition, in processing order.
pub const KOALA_WELLS: [&str; 4] = ["00001_00001", "00001_00002", "00002_00001", "00002_00002"];

/// Location of the float phase frames inside a well folder.
pub const FRAME_SUBDIR: &str = "Phase/Float/Bin";

/// Every file one sequence conversion reads or writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceJob {
    /// Name used in events, reports and error context.
    pub label: String,
    pub frames_dir: PathBuf,
    pub timestamps: PathBuf,
    /// Composed stack, input of the registration tool.
    pub stack: PathBuf,
    /// Registered stack written by the tool.
    pub aligned: PathBuf,
    pub log: PathBuf,
    /// Destination bnr container.
    pub output: PathBuf,
}

impl SequenceJob {
    /// Paths for well `well` of the acquisition folder `root`, following the Koala layout.
    pub fn for_well(root: &Path, well: &str, output: impl Into<PathBuf>) -> Self {
        let well_dir = root.join(well);
        Self {
            label: well.to_owned(),
            frames_dir: well_dir.join(FRAME_SUBDIR),
            timestamps: well_dir.join("timestamps.txt"),
            stack: root.join(format!("{well}_phase.tif")),
            aligned: root.join(format!("{well}_phase_aligned.tif")),
            log: well_dir.join("SIFT alignment log.txt"),
            output: output.into(),
        }
    }

    /// Paths for a standalone frame folder, with all outputs placed in `out_dir`.
    pub fn standalone(frames_dir: impl Into<PathBuf>, timestamps: impl Into<PathBuf>, out_dir: &Path) -> Self {
        Self {
            label: "0000X_0000X".to_owned(),
            frames_dir: frames_dir.into(),
            timestamps: timestamps.into(),
            stack: out_dir.join("0000X_0000X_phase.tif"),
            aligned: out_dir.join("0000X_0000X_phase_aligned.tif"),
            log: out_dir.join("0000X_0000X_phase_alignment log.txt"),
            output: out_dir.join("0000X_0000X_phase_aligned.bnr"),
        }
    }

    /// Artifacts a run of this job creates or replaces.
    pub fn outputs(&self) -> [&Path; 4] {
        [&self.stack, &self.aligned, &self.log, &self.output]
    }
}
