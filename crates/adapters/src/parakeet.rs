//! NVIDIA Parakeet adapter (NeMo runtime).

use std::path::{Path, PathBuf};

use serde::Deserialize;

use scriberr_domain::params::ModelCapability;
use scriberr_domain::{Error, Result, Segment, TranscriptResult, TranscriptionParams, Word};

use crate::progress::RegexProgressDecoder;
use crate::traits::{CommandSpec, ProgressDecoder, TranscriptionAdapter};

pub struct ParakeetAdapter {
    env_path: PathBuf,
}

impl ParakeetAdapter {
    pub fn new(env_path: impl Into<PathBuf>) -> Self {
        Self {
            env_path: env_path.into(),
        }
    }
}

/// NeMo-style artifact written by the runner script: a flat word list plus
/// segment boundaries.
#[derive(Deserialize)]
struct NemoOutput {
    #[serde(default)]
    language: Option<String>,
    segments: Vec<NemoSegment>,
}

#[derive(Deserialize)]
struct NemoSegment {
    start: f64,
    end: f64,
    text: String,
    #[serde(default)]
    words: Vec<NemoWord>,
}

#[derive(Deserialize)]
struct NemoWord {
    word: String,
    start: f64,
    end: f64,
    #[serde(default)]
    confidence: Option<f64>,
}

pub(crate) fn parse_nemo_artifact(output_dir: &Path, engine: &str) -> Result<TranscriptResult> {
    let artifact = output_dir.join("transcript.json");
    if !artifact.exists() {
        return Err(Error::EngineFailed(format!(
            "{engine} produced no transcript.json in {}",
            output_dir.display()
        )));
    }
    let raw = std::fs::read_to_string(&artifact)?;
    let parsed: NemoOutput = serde_json::from_str(&raw)
        .map_err(|e| Error::EngineFailed(format!("{engine} artifact: {e}")))?;

    Ok(TranscriptResult {
        language: parsed.language.unwrap_or_else(|| "en".into()),
        segments: parsed
            .segments
            .into_iter()
            .map(|s| Segment {
                start: s.start,
                end: s.end,
                text: s.text,
                speaker: None,
                words: s
                    .words
                    .into_iter()
                    .map(|w| Word {
                        start: w.start,
                        end: w.end,
                        word: w.word,
                        score: w.confidence,
                        speaker: None,
                    })
                    .collect(),
            })
            .collect(),
    })
}

impl TranscriptionAdapter for ParakeetAdapter {
    fn name(&self) -> &str {
        "parakeet"
    }

    fn supported_models(&self) -> Vec<ModelCapability> {
        vec![ModelCapability {
            id: "parakeet-tdt".into(),
            sizes: vec!["0.6b".into(), "1.1b".into()],
            supports_diarization: true,
            // English-only family.
            languages: vec!["en".into()],
        }]
    }

    fn build_command(
        &self,
        params: &TranscriptionParams,
        audio_path: &Path,
        output_dir: &Path,
    ) -> CommandSpec {
        CommandSpec::new(self.env_path.join("bin").join("python3"))
            .arg(self.env_path.join("transcribe.py").display().to_string())
            .args(["--audio", &audio_path.display().to_string()])
            .args(["--output-dir", &output_dir.display().to_string()])
            .args(["--model", &format!("parakeet-tdt-{}", params.model)])
            .args(["--device", &params.device])
            .args(["--batch-size", &params.batch_size.to_string()])
            .env(
                "NEMO_CACHE_DIR",
                self.env_path.join("cache").display().to_string(),
            )
    }

    fn parse_output(&self, output_dir: &Path) -> Result<TranscriptResult> {
        parse_nemo_artifact(output_dir, self.name())
    }

    fn progress_decoder(&self) -> Box<dyn ProgressDecoder> {
        // NeMo runners report batch counts: "Transcribing: 12/48".
        Box::new(BatchProgressDecoder {
            inner: RegexProgressDecoder::new(r"Transcribing:\s*(\d+)/(\d+)"),
        })
    }
}

/// Converts `current/total` batch counts into a percentage.
struct BatchProgressDecoder {
    inner: RegexProgressDecoder,
}

impl ProgressDecoder for BatchProgressDecoder {
    fn decode(&self, line: &str) -> Option<f32> {
        // The shared decoder captures only the first group; recover the
        // total from the raw line.
        let _ = self.inner.decode(line)?;
        let (current, total) = line
            .split_once(':')
            .and_then(|(_, rest)| rest.trim().split_once('/'))?;
        let current: f32 = current.trim().parse().ok()?;
        let total: f32 = total.trim().parse().ok()?;
        if total <= 0.0 {
            return None;
        }
        Some((current / total * 100.0).clamp(0.0, 100.0))
    }
}
