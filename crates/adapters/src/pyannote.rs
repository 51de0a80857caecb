//! PyAnnote diarization adapter. The runner writes an RTTM file, the
//! de-facto interchange format for speaker turns.

use std::path::{Path, PathBuf};

use scriberr_domain::{Error, Result, SpeakerTurn, TranscriptionParams};

use crate::progress::NoProgress;
use crate::traits::{CommandSpec, DiarizationAdapter, ProgressDecoder};

pub struct PyannoteAdapter {
    env_path: PathBuf,
}

impl PyannoteAdapter {
    pub fn new(env_path: impl Into<PathBuf>) -> Self {
        Self {
            env_path: env_path.into(),
        }
    }
}

/// Parse one RTTM `SPEAKER` line:
/// `SPEAKER <file> <chan> <onset> <duration> <NA> <NA> <label> <NA> <NA>`
fn parse_rttm_line(line: &str) -> Option<SpeakerTurn> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 8 || fields[0] != "SPEAKER" {
        return None;
    }
    let onset: f64 = fields[3].parse().ok()?;
    let duration: f64 = fields[4].parse().ok()?;
    if duration <= 0.0 {
        return None;
    }
    Some(SpeakerTurn {
        start: onset,
        end: onset + duration,
        speaker: fields[7].to_string(),
    })
}

pub(crate) fn parse_rttm(raw: &str) -> Vec<SpeakerTurn> {
    let mut turns: Vec<SpeakerTurn> = raw.lines().filter_map(parse_rttm_line).collect();
    turns.sort_by(|a, b| a.start.total_cmp(&b.start));
    turns
}

impl DiarizationAdapter for PyannoteAdapter {
    fn name(&self) -> &str {
        "pyannote"
    }

    fn build_command(
        &self,
        params: &TranscriptionParams,
        audio_path: &Path,
        output_dir: &Path,
    ) -> CommandSpec {
        let mut spec = CommandSpec::new(self.env_path.join("bin").join("python3"))
            .arg(self.env_path.join("diarize.py").display().to_string())
            .args(["--audio", &audio_path.display().to_string()])
            .args(["--output-dir", &output_dir.display().to_string()])
            .args(["--device", &params.device])
            .env("HF_HOME", self.env_path.join("cache").display().to_string());

        if let Some(min) = params.min_speakers {
            spec = spec.args(["--min-speakers", &min.to_string()]);
        }
        if let Some(max) = params.max_speakers {
            spec = spec.args(["--max-speakers", &max.to_string()]);
        }
        spec
    }

    fn parse_output(&self, output_dir: &Path) -> Result<Vec<SpeakerTurn>> {
        let artifact = output_dir.join("diarization.rttm");
        if !artifact.exists() {
            return Err(Error::EngineFailed(format!(
                "pyannote produced no diarization.rttm in {}",
                output_dir.display()
            )));
        }
        let raw = std::fs::read_to_string(&artifact)?;
        let turns = parse_rttm(&raw);
        if turns.is_empty() {
            return Err(Error::EngineFailed(
                "pyannote RTTM contained no speaker turns".into(),
            ));
        }
        Ok(turns)
    }

    fn progress_decoder(&self) -> Box<dyn ProgressDecoder> {
        Box::new(NoProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RTTM: &str = "\
SPEAKER audio 1 0.52 3.48 <NA> <NA> SPEAKER_00 <NA> <NA>
SPEAKER audio 1 4.10 2.90 <NA> <NA> SPEAKER_01 <NA> <NA>
SPEAKER audio 1 7.00 1.00 <NA> <NA> SPEAKER_00 <NA> <NA>
";

    #[test]
    fn parses_rttm_turns_in_time_order() {
        let turns = parse_rttm(RTTM);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].speaker, "SPEAKER_00");
        assert!((turns[0].end - 4.0).abs() < 1e-9);
        assert_eq!(turns[1].speaker, "SPEAKER_01");
    }

    #[test]
    fn ignores_malformed_and_zero_length_lines() {
        let raw = "garbage line\nSPEAKER audio 1 1.0 0.0 <NA> <NA> SPEAKER_00 <NA> <NA>\n";
        assert!(parse_rttm(raw).is_empty());
    }

    #[test]
    fn speaker_bounds_reach_the_command_line() {
        let adapter = PyannoteAdapter::new("/envs/pyannote");
        let mut params = TranscriptionParams::default();
        params.min_speakers = Some(2);
        params.max_speakers = Some(4);
        let spec = adapter.build_command(&params, Path::new("/a.wav"), Path::new("/out"));
        assert!(spec.args.contains(&"--min-speakers".to_string()));
        assert!(spec.args.contains(&"4".to_string()));
    }

    #[test]
    fn empty_rttm_is_engine_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("diarization.rttm"), "").unwrap();
        let err = PyannoteAdapter::new("/unused")
            .parse_output(dir.path())
            .unwrap_err();
        assert_eq!(err.kind(), "engine_failed");
    }
}
