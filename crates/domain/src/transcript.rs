//! Canonical transcript shape every engine adapter normalizes into.

use serde::{Deserialize, Serialize};

/// The normalized output of a transcription run, stored on the job row as a
/// JSON blob once the job completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptResult {
    pub language: String,
    pub segments: Vec<Segment>,
}

impl TranscriptResult {
    /// Full text with single spaces between segments, used for
    /// summarization prompts.
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Duration covered by the transcript, from the last segment end.
    pub fn duration(&self) -> f64 {
        self.segments.last().map(|s| s.end).unwrap_or(0.0)
    }
}

/// One contiguous span of speech.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default)]
    pub words: Vec<Word>,
}

/// Word-level timing inside a segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Word {
    pub start: f64,
    pub end: f64,
    pub word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

impl Word {
    pub fn midpoint(&self) -> f64 {
        (self.start + self.end) / 2.0
    }
}

/// One diarized speaker turn, produced by a diarization adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeakerTurn {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}

impl SpeakerTurn {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Half-open containment check: `[start, end)`.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, text: &str) -> Segment {
        Segment {
            start,
            end,
            text: text.into(),
            speaker: None,
            words: Vec::new(),
        }
    }

    #[test]
    fn plain_text_joins_segments() {
        let t = TranscriptResult {
            language: "en".into(),
            segments: vec![seg(0.0, 1.0, " ask not "), seg(1.0, 2.0, "what")],
        };
        assert_eq!(t.plain_text(), "ask not what");
    }

    #[test]
    fn plain_text_skips_empty_segments() {
        let t = TranscriptResult {
            language: "en".into(),
            segments: vec![seg(0.0, 1.0, "  "), seg(1.0, 2.0, "hello")],
        };
        assert_eq!(t.plain_text(), "hello");
    }

    #[test]
    fn turn_containment_is_half_open() {
        let turn = SpeakerTurn {
            start: 1.0,
            end: 2.0,
            speaker: "SPEAKER_00".into(),
        };
        assert!(turn.contains(1.0));
        assert!(turn.contains(1.999));
        assert!(!turn.contains(2.0));
        assert!(!turn.contains(0.999));
    }

    #[test]
    fn word_midpoint() {
        let w = Word {
            start: 1.0,
            end: 2.0,
            word: "ask".into(),
            score: None,
            speaker: None,
        };
        assert!((w.midpoint() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn transcript_duration_from_last_segment() {
        let t = TranscriptResult {
            language: "en".into(),
            segments: vec![seg(0.0, 1.0, "a"), seg(1.0, 12.5, "b")],
        };
        assert!((t.duration() - 12.5).abs() < f64::EPSILON);
        let empty = TranscriptResult {
            language: "en".into(),
            segments: Vec::new(),
        };
        assert_eq!(empty.duration(), 0.0);
    }
}
