use std::path::Path;

use crate::foundation::error::{IoResultExt as _, SeqError, SeqResult};

/// Zero-based column of the timestamp table holding the per-frame time.
pub const TIME_COLUMN: usize = 3;

/// Parse the per-frame times of a whitespace-delimited timestamp table.
///
/// One row per frame; blank lines are skipped. A row with fewer than `TIME_COLUMN + 1` columns or
/// a non-numeric time aborts with a parse error naming the 1-based line.
pub fn parse_timestamps(path: &Path, text: &str) -> SeqResult<Vec<f32>> {
    let mut times = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split_whitespace().collect();
        let Some(tok) = cols.get(TIME_COLUMN) else {
            return Err(SeqError::parse(
                path,
                i + 1,
                format!("expected at least {} columns, found {}", TIME_COLUMN + 1, cols.len()),
            ));
        };
        let t = tok
            .parse::<f32>()
            .map_err(|_| SeqError::parse(path, i + 1, format!("time value '{tok}' is not a number")))?;
        times.push(t);
    }
    Ok(times)
}

/// Read and parse the timestamp table at `path`.
pub fn read_timestamps(path: &Path) -> SeqResult<Vec<f32>> {
    let text = std::fs::read_to_string(path).at_path(path)?;
    parse_timestamps(path, &text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_fourth_column() {
        let text = "0 1 12:00:00 0.000 x\n1 1 12:00:00 0.033 x\n\n2 1 12:00:00 0.066 x\n";
        let ts = parse_timestamps(Path::new("timestamps.txt"), text).unwrap();
        assert_eq!(ts, vec![0.0, 0.033, 0.066]);
    }

    #[test]
    fn short_row_is_parse_error() {
        let err = parse_timestamps(Path::new("t.txt"), "0 1 2 3\n0 1 2\n").unwrap_err();
        assert!(matches!(err, SeqError::Parse { line: 2, .. }));
    }

    #[test]
    fn non_numeric_time_is_parse_error() {
        let err = parse_timestamps(Path::new("t.txt"), "0 1 2 abc\n").unwrap_err();
        assert!(err.to_string().contains("'abc'"));
    }
}
