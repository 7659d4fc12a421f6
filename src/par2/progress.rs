//! Parses progress percentages out of `par2 create`'s stdout.
//!
//! The reference `par2cmdline` tool prints lines like `Processing: 23.4%` or
//! `Constructing: 81%` while it works; we only need the trailing percentage.

/// Extract a `NN[.N]%` progress figure from one line of `par2` stdout, if present.
pub fn parse_progress_percent(line: &str) -> Option<f32> {
    let percent_idx = line.find('%')?;
    let before = &line[..percent_idx];
    let start = before
        .rfind(|c: char| !c.is_ascii_digit() && c != '.')
        .map(|i| i + 1)
        .unwrap_or(0);
    let number = &before[start..];
    if number.is_empty() {
        return None;
    }
    number.parse::<f32>().ok().filter(|p| (0.0..=100.0).contains(p))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integer_percent() {
        assert_eq!(parse_progress_percent("Processing: 42%"), Some(42.0));
    }

    #[test]
    fn parses_fractional_percent() {
        assert_eq!(parse_progress_percent("Constructing: 81.5%"), Some(81.5));
    }

    #[test]
    fn ignores_lines_without_percent() {
        assert_eq!(parse_progress_percent("Opening: movie.mkv"), None);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert_eq!(parse_progress_percent("weird: 142%"), None);
    }

    #[test]
    fn handles_percent_at_line_start_gracefully() {
        assert_eq!(parse_progress_percent("%"), None);
    }
}
