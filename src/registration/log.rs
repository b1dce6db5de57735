use std::fmt;
use std::path::Path;

use crate::foundation::error::{IoResultExt as _, SeqError, SeqResult};

/// Tag that marks a per-transition matrix line in the registration log.
pub const TRANSFORM_MARKER: &str = "Transformation Matrix: AffineTransform";

/// Configuration of the "Linear Stack Alignment with SIFT" run, written at the top of every
/// translated log ahead of the per-frame shifts.
pub const SIFT_PARAMETERS: &str = "Linear Stack Alignment with SIFT parameter:

initial_gaussian_blur = 1.60
steps_per_scale_octave = 3
minimum_image_size = 64
maximum_image_size = 1024
feature_descriptor_size = 4
feature_descriptor_orientation_bins = 8
closest/next_closest_ratio = 0.92
maximal_alignment_error = 25
inlier_ratio = 0.05
expected_transformation = Translation
interpolate
show_transformation_matrix

Translation per frame (x,y):

";

/// Translation of one frame transition, `(tx, ty)` of a row-major 2×3 affine matrix.
///
/// The textual form is kept as it appeared in the log so the rewritten report matches the tool's
/// own number formatting.
#[derive(Clone, Debug, PartialEq)]
pub struct Shift {
    pub tx: f64,
    pub ty: f64,
    tx_text: String,
    ty_text: String,
}

impl Shift {
    fn from_tokens(tx: &str, ty: &str) -> Result<Self, String> {
        let parse = |name: &str, tok: &str| {
            tok.parse::<f64>()
                .map_err(|_| format!("{name} token '{tok}' is not a number"))
        };
        Ok(Self {
            tx: parse("tx", tx)?,
            ty: parse("ty", ty)?,
            tx_text: tx.to_owned(),
            ty_text: ty.to_owned(),
        })
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.tx_text, self.ty_text)
    }
}

/// A malformed matrix line (1-based line number).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineError {
    pub line: usize,
    pub msg: String,
}

/// Match one log line. Lines without the marker yield `Ok(None)`.
fn match_line(line: &str) -> Result<Option<Shift>, String> {
    let Some(at) = line.find(TRANSFORM_MARKER) else {
        return Ok(None);
    };
    let body = &line[at + TRANSFORM_MARKER.len()..];
    let cleaned: String = body.chars().filter(|c| !matches!(c, '[' | ']')).collect();
    let tokens: Vec<&str> = cleaned.split(',').map(str::trim).collect();
    if tokens.len() != 6 {
        return Err(format!(
            "expected 6 matrix entries after '{TRANSFORM_MARKER}', found {}",
            tokens.len()
        ));
    }
    Shift::from_tokens(tokens[2], tokens[5]).map(Some)
}

/// Extract one [`Shift`] per matrix line, in log order.
pub fn parse_log(text: &str) -> Result<Vec<Shift>, LineError> {
    let mut shifts = Vec::new();
    for (i, line) in text.lines().enumerate() {
        match match_line(line) {
            Ok(Some(shift)) => shifts.push(shift),
            Ok(None) => {}
            Err(msg) => return Err(LineError { line: i + 1, msg }),
        }
    }
    Ok(shifts)
}

/// Body of the rewritten log: parameter block, then one `tx,ty` line per transition.
pub fn render_report(shifts: &[Shift]) -> String {
    let mut out = String::from(SIFT_PARAMETERS);
    for s in shifts {
        out.push_str(&s.to_string());
        out.push('\n');
    }
    out
}

/// Parse the registration log at `path` and overwrite it with the shift report.
///
/// The file is read completely before it is rewritten. A malformed matrix line fails the call and
/// leaves the log untouched; a log without any matrix line is rewritten with an empty shift section.
#[tracing::instrument(skip(path), fields(log = %path.display()))]
pub fn translate_log(path: &Path) -> SeqResult<Vec<Shift>> {
    let bytes = std::fs::read(path).at_path(path)?;
    let text = String::from_utf8_lossy(&bytes);
    let shifts = parse_log(&text).map_err(|e| SeqError::parse(path, e.line, e.msg))?;
    if shifts.is_empty() {
        tracing::warn!("registration log has no transformation matrix lines");
    }

    std::fs::write(path, render_report(&shifts)).at_path(path)?;
    tracing::debug!(shifts = shifts.len(), "rewrote registration log");
    Ok(shifts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "Linear Stack Alignment with SIFT
Processing slice 2
Transformation Matrix: AffineTransform[[1.0, 0.0, 5.25], [0.0, 1.0, -3.1]]
some other line
  Transformation Matrix: AffineTransform[[1.0, 0.0, 0.0], [0.0, 1.0, 12]]
";

    #[test]
    fn parses_matrix_lines_in_order() {
        let shifts = parse_log(LOG).unwrap();
        assert_eq!(shifts.len(), 2);
        assert_eq!((shifts[0].tx, shifts[0].ty), (5.25, -3.1));
        assert_eq!(shifts[0].to_string(), "5.25,-3.1");
        assert_eq!(shifts[1].to_string(), "0.0,12");
    }

    #[test]
    fn malformed_matrix_line_reports_line_number() {
        let text = "ok\nTransformation Matrix: AffineTransform[[1.0, 0.0], [0.0, 1.0]]\n";
        let err = parse_log(text).unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.msg.contains("found 4"));

        let text = "Transformation Matrix: AffineTransform[[1, 0, x], [0, 1, 2]]";
        assert!(parse_log(text).unwrap_err().msg.contains("'x'"));
    }

    #[test]
    fn report_starts_with_parameter_block() {
        let shifts = parse_log(LOG).unwrap();
        let report = render_report(&shifts);
        assert!(report.starts_with("Linear Stack Alignment with SIFT parameter:\n"));
        assert!(report.ends_with("Translation per frame (x,y):\n\n5.25,-3.1\n0.0,12\n"));
        assert_eq!(render_report(&[]), SIFT_PARAMETERS);
    }

    #[test]
    fn translate_rewrites_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SIFT alignment log.txt");
        std::fs::write(&path, LOG).unwrap();

        let shifts = translate_log(&path).unwrap();
        assert_eq!(shifts.len(), 2);
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, render_report(&shifts));
    }

    #[test]
    fn failed_parse_leaves_log_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let bad = "Transformation Matrix: AffineTransform[[1, 0, 1]]\n";
        std::fs::write(&path, bad).unwrap();

        let err = translate_log(&path).unwrap_err();
        assert!(matches!(err, SeqError::Parse { line: 1, .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), bad);
    }

    #[test]
    fn missing_log_is_io_error() {
        let err = translate_log(Path::new("no/such/log.txt")).unwrap_err();
        assert!(matches!(err, SeqError::Io { .. }));
    }
}
