//! Regex-backed progress decoders.

use regex::Regex;

use crate::traits::ProgressDecoder;

/// Decodes lines like `Progress: 42.5%` via a single capture group.
pub struct RegexProgressDecoder {
    pattern: Regex,
}

impl RegexProgressDecoder {
    /// `pattern` must contain one capture group matching a float.
    pub fn new(pattern: &str) -> Self {
        Self {
            // Adapter patterns are compile-time constants; a bad one is a
            // programming error caught by the adapter's own tests.
            pattern: Regex::new(pattern).unwrap_or_else(|e| {
                panic!("invalid progress pattern {pattern:?}: {e}");
            }),
        }
    }
}

impl ProgressDecoder for RegexProgressDecoder {
    fn decode(&self, line: &str) -> Option<f32> {
        let caps = self.pattern.captures(line)?;
        let pct: f32 = caps.get(1)?.as_str().parse().ok()?;
        Some(pct.clamp(0.0, 100.0))
    }
}

/// For engines that never report progress.
pub struct NoProgress;

impl ProgressDecoder for NoProgress {
    fn decode(&self, _line: &str) -> Option<f32> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_percentage_lines() {
        let decoder = RegexProgressDecoder::new(r"Progress:\s*([0-9.]+)%");
        assert_eq!(decoder.decode("Progress: 42.5%"), Some(42.5));
        assert_eq!(decoder.decode("Progress:100%"), Some(100.0));
        assert_eq!(decoder.decode("loading model..."), None);
    }

    #[test]
    fn clamps_out_of_range_values() {
        let decoder = RegexProgressDecoder::new(r"Progress:\s*([0-9.]+)%");
        assert_eq!(decoder.decode("Progress: 120.0%"), Some(100.0));
    }

    #[test]
    fn no_progress_always_none() {
        assert_eq!(NoProgress.decode("Progress: 50%"), None);
    }
}
