//! Sortformer diarization adapter (NeMo). Writes a JSON turn list rather
//! than RTTM.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use scriberr_domain::{Error, Result, SpeakerTurn, TranscriptionParams};

use crate::progress::NoProgress;
use crate::traits::{CommandSpec, DiarizationAdapter, ProgressDecoder};

pub struct SortformerAdapter {
    env_path: PathBuf,
}

impl SortformerAdapter {
    pub fn new(env_path: impl Into<PathBuf>) -> Self {
        Self {
            env_path: env_path.into(),
        }
    }
}

#[derive(Deserialize)]
struct SortformerTurn {
    start: f64,
    end: f64,
    speaker: String,
}

impl DiarizationAdapter for SortformerAdapter {
    fn name(&self) -> &str {
        "sortformer"
    }

    fn build_command(
        &self,
        params: &TranscriptionParams,
        audio_path: &Path,
        output_dir: &Path,
    ) -> CommandSpec {
        CommandSpec::new(self.env_path.join("bin").join("python3"))
            .arg(self.env_path.join("diarize.py").display().to_string())
            .args(["--audio", &audio_path.display().to_string()])
            .args(["--output-dir", &output_dir.display().to_string()])
            .args(["--device", &params.device])
            .env(
                "NEMO_CACHE_DIR",
                self.env_path.join("cache").display().to_string(),
            )
    }

    fn parse_output(&self, output_dir: &Path) -> Result<Vec<SpeakerTurn>> {
        let artifact = output_dir.join("diarization.json");
        if !artifact.exists() {
            return Err(Error::EngineFailed(format!(
                "sortformer produced no diarization.json in {}",
                output_dir.display()
            )));
        }
        let raw = std::fs::read_to_string(&artifact)?;
        let parsed: Vec<SortformerTurn> = serde_json::from_str(&raw)
            .map_err(|e| Error::EngineFailed(format!("sortformer artifact: {e}")))?;

        let mut turns: Vec<SpeakerTurn> = parsed
            .into_iter()
            .filter(|t| t.end > t.start)
            .map(|t| SpeakerTurn {
                start: t.start,
                end: t.end,
                speaker: t.speaker,
            })
            .collect();
        if turns.is_empty() {
            return Err(Error::EngineFailed(
                "sortformer output contained no speaker turns".into(),
            ));
        }
        turns.sort_by(|a, b| a.start.total_cmp(&b.start));
        Ok(turns)
    }

    fn progress_decoder(&self) -> Box<dyn ProgressDecoder> {
        Box::new(NoProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_turn_list() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("diarization.json"),
            r#"[{"start": 2.0, "end": 4.0, "speaker": "speaker_1"},
                {"start": 0.0, "end": 2.0, "speaker": "speaker_0"}]"#,
        )
        .unwrap();

        let turns = SortformerAdapter::new("/unused")
            .parse_output(dir.path())
            .unwrap();
        assert_eq!(turns.len(), 2);
        // Sorted by start regardless of artifact order.
        assert_eq!(turns[0].speaker, "speaker_0");
    }
}
