//! Speaker alignment: tag transcript words with diarized turns.
//!
//! Policy:
//! - a word belongs to the turn whose `[start, end)` span contains its
//!   midpoint; overlapping turns break by earliest start, then longest
//!   duration,
//! - a word with no enclosing turn inherits the nearest earlier turn
//!   within a 0.5 s tolerance, else `UNKNOWN`,
//! - a segment's speaker is the modal speaker of its words, ties broken
//!   by the first-occurring word's speaker.

use scriberr_domain::{SpeakerTurn, TranscriptResult};

pub const UNKNOWN_SPEAKER: &str = "UNKNOWN";

/// Grace window for words falling just after a turn ended.
const EARLIER_TURN_TOLERANCE: f64 = 0.5;

/// Label the speaker for one instant.
fn speaker_at(t: f64, turns: &[SpeakerTurn]) -> String {
    // Enclosing turns, best first: earliest start, then longest duration.
    let enclosing = turns
        .iter()
        .filter(|turn| turn.contains(t))
        .min_by(|a, b| {
            a.start
                .total_cmp(&b.start)
                .then(b.duration().total_cmp(&a.duration()))
        });
    if let Some(turn) = enclosing {
        return turn.speaker.clone();
    }

    // Nearest earlier turn within tolerance.
    turns
        .iter()
        .filter(|turn| turn.end <= t && t - turn.end <= EARLIER_TURN_TOLERANCE)
        .max_by(|a, b| a.end.total_cmp(&b.end))
        .map(|turn| turn.speaker.clone())
        .unwrap_or_else(|| UNKNOWN_SPEAKER.to_string())
}

/// Modal element; ties break by first occurrence order.
fn modal_speaker(labels: &[String]) -> Option<String> {
    let first = labels.first()?;
    let mut best = first.as_str();
    let mut best_count = 0usize;
    for candidate in labels {
        let count = labels.iter().filter(|l| *l == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    Some(best.to_string())
}

/// Tag every word and segment in place.
pub fn align_speakers(transcript: &mut TranscriptResult, turns: &[SpeakerTurn]) {
    for segment in &mut transcript.segments {
        let mut labels = Vec::with_capacity(segment.words.len());
        for word in &mut segment.words {
            let speaker = speaker_at(word.midpoint(), turns);
            word.speaker = Some(speaker.clone());
            labels.push(speaker);
        }

        segment.speaker = match modal_speaker(&labels) {
            Some(speaker) => Some(speaker),
            // A segment without word timings falls back to its own
            // midpoint.
            None => Some(speaker_at((segment.start + segment.end) / 2.0, turns)),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriberr_domain::{Segment, Word};

    fn turn(start: f64, end: f64, speaker: &str) -> SpeakerTurn {
        SpeakerTurn {
            start,
            end,
            speaker: speaker.into(),
        }
    }

    fn word(start: f64, end: f64, text: &str) -> Word {
        Word {
            start,
            end,
            word: text.into(),
            score: None,
            speaker: None,
        }
    }

    fn transcript(words: Vec<Word>) -> TranscriptResult {
        let start = words.first().map(|w| w.start).unwrap_or(0.0);
        let end = words.last().map(|w| w.end).unwrap_or(0.0);
        TranscriptResult {
            language: "en".into(),
            segments: vec![Segment {
                start,
                end,
                text: String::new(),
                speaker: None,
                words,
            }],
        }
    }

    #[test]
    fn word_midpoint_selects_enclosing_turn() {
        let turns = vec![turn(0.0, 2.0, "SPEAKER_00"), turn(2.0, 4.0, "SPEAKER_01")];
        let mut t = transcript(vec![word(0.5, 1.0, "ask"), word(2.5, 3.0, "what")]);
        align_speakers(&mut t, &turns);

        let words = &t.segments[0].words;
        assert_eq!(words[0].speaker.as_deref(), Some("SPEAKER_00"));
        assert_eq!(words[1].speaker.as_deref(), Some("SPEAKER_01"));
    }

    #[test]
    fn boundary_word_belongs_to_the_later_turn() {
        // Midpoint exactly at a boundary: [start, end) puts it in the
        // turn that starts there.
        let turns = vec![turn(0.0, 2.0, "A"), turn(2.0, 4.0, "B")];
        let mut t = transcript(vec![word(1.5, 2.5, "edge")]);
        align_speakers(&mut t, &turns);
        assert_eq!(t.segments[0].words[0].speaker.as_deref(), Some("B"));
    }

    #[test]
    fn overlap_breaks_by_earliest_start_then_longest() {
        // Both turns contain t=3.0.
        let turns = vec![
            turn(2.0, 5.0, "LONG_EARLY"),
            turn(2.5, 3.5, "SHORT_LATE"),
        ];
        let mut t = transcript(vec![word(2.8, 3.2, "x")]);
        align_speakers(&mut t, &turns);
        assert_eq!(
            t.segments[0].words[0].speaker.as_deref(),
            Some("LONG_EARLY")
        );

        // Same start: longest duration wins.
        let turns = vec![turn(2.0, 3.1, "SHORT"), turn(2.0, 6.0, "LONG")];
        let mut t = transcript(vec![word(2.8, 3.2, "x")]);
        align_speakers(&mut t, &turns);
        assert_eq!(t.segments[0].words[0].speaker.as_deref(), Some("LONG"));
    }

    #[test]
    fn gap_word_inherits_recent_earlier_turn() {
        let turns = vec![turn(0.0, 2.0, "A")];
        // Midpoint 2.3, 0.3s after A ended: within tolerance.
        let mut t = transcript(vec![word(2.2, 2.4, "uh")]);
        align_speakers(&mut t, &turns);
        assert_eq!(t.segments[0].words[0].speaker.as_deref(), Some("A"));
    }

    #[test]
    fn distant_gap_word_is_unknown() {
        let turns = vec![turn(0.0, 2.0, "A")];
        // Midpoint 3.0, a full second after A ended.
        let mut t = transcript(vec![word(2.9, 3.1, "noise")]);
        align_speakers(&mut t, &turns);
        assert_eq!(
            t.segments[0].words[0].speaker.as_deref(),
            Some(UNKNOWN_SPEAKER)
        );
    }

    #[test]
    fn segment_speaker_is_modal() {
        let turns = vec![turn(0.0, 3.0, "A"), turn(3.0, 4.0, "B")];
        let mut t = transcript(vec![
            word(0.0, 1.0, "one"),
            word(1.0, 2.0, "two"),
            word(3.0, 4.0, "three"),
        ]);
        align_speakers(&mut t, &turns);
        assert_eq!(t.segments[0].speaker.as_deref(), Some("A"));
    }

    #[test]
    fn segment_tie_breaks_by_first_word() {
        let turns = vec![turn(0.0, 1.0, "B"), turn(1.0, 2.0, "A")];
        let mut t = transcript(vec![word(0.2, 0.8, "one"), word(1.2, 1.8, "two")]);
        align_speakers(&mut t, &turns);
        // 1-1 tie: first word's speaker wins.
        assert_eq!(t.segments[0].speaker.as_deref(), Some("B"));
    }

    #[test]
    fn wordless_segment_uses_its_own_midpoint() {
        let turns = vec![turn(0.0, 10.0, "A")];
        let mut t = TranscriptResult {
            language: "en".into(),
            segments: vec![Segment {
                start: 2.0,
                end: 4.0,
                text: "hello".into(),
                speaker: None,
                words: Vec::new(),
            }],
        };
        align_speakers(&mut t, &turns);
        assert_eq!(t.segments[0].speaker.as_deref(), Some("A"));
    }
}
