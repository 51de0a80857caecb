//! WhisperX adapter — transcription with word-level alignment.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use scriberr_domain::params::ModelCapability;
use scriberr_domain::{Error, Result, Segment, TranscriptResult, TranscriptionParams, Word};

use crate::progress::RegexProgressDecoder;
use crate::traits::{CommandSpec, ProgressDecoder, TranscriptionAdapter};

pub struct WhisperxAdapter {
    env_path: PathBuf,
}

impl WhisperxAdapter {
    /// `env_path` is the engine environment root
    /// (e.g. `${DATA_DIR}/envs/whisperx`), injected at registration.
    pub fn new(env_path: impl Into<PathBuf>) -> Self {
        Self {
            env_path: env_path.into(),
        }
    }
}

// ── Engine artifact shape ───────────────────────────────────────────

#[derive(Deserialize)]
struct WhisperxOutput {
    #[serde(default)]
    language: Option<String>,
    segments: Vec<WhisperxSegment>,
}

#[derive(Deserialize)]
struct WhisperxSegment {
    start: f64,
    end: f64,
    text: String,
    #[serde(default)]
    words: Vec<WhisperxWord>,
}

#[derive(Deserialize)]
struct WhisperxWord {
    word: String,
    // Alignment occasionally drops timings for numerals; such words
    // inherit the segment span at conversion time.
    #[serde(default)]
    start: Option<f64>,
    #[serde(default)]
    end: Option<f64>,
    #[serde(default)]
    score: Option<f64>,
}

/// Locate the engine's JSON artifact; whisperx names it after the audio
/// stem, so take the first `.json` in the output dir.
fn find_artifact(output_dir: &Path) -> Result<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(output_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    entries.sort();
    entries.into_iter().next().ok_or_else(|| {
        Error::EngineFailed(format!(
            "whisperx produced no JSON artifact in {}",
            output_dir.display()
        ))
    })
}

impl TranscriptionAdapter for WhisperxAdapter {
    fn name(&self) -> &str {
        "whisperx"
    }

    fn supported_models(&self) -> Vec<ModelCapability> {
        vec![ModelCapability {
            id: "whisper".into(),
            sizes: vec![
                "tiny".into(),
                "base".into(),
                "small".into(),
                "medium".into(),
                "large-v2".into(),
                "large-v3".into(),
            ],
            supports_diarization: true,
            languages: Vec::new(),
        }]
    }

    fn build_command(
        &self,
        params: &TranscriptionParams,
        audio_path: &Path,
        output_dir: &Path,
    ) -> CommandSpec {
        let mut spec = CommandSpec::new(self.env_path.join("bin").join("python3"))
            .arg("-m")
            .arg("whisperx")
            .arg(audio_path.display().to_string())
            .args(["--output_dir", &output_dir.display().to_string()])
            .args(["--output_format", "json"])
            .args(["--model", &params.model])
            .args(["--device", &params.device])
            .args(["--batch_size", &params.batch_size.to_string()])
            .args(["--compute_type", &params.compute_type])
            .args(["--chunk_size", &params.chunk_size.to_string()])
            .args(["--temperature", &params.temperature.to_string()])
            .args(["--beam_size", &params.beam_size.to_string()])
            .args(["--length_penalty", &params.length_penalty.to_string()])
            .args(["--vad_onset", &params.vad_onset.to_string()])
            .args(["--vad_offset", &params.vad_offset.to_string()])
            .arg("--print_progress")
            .env("HF_HOME", self.env_path.join("cache").display().to_string());

        if let Some(language) = &params.language {
            spec = spec.args(["--language", language]);
        }
        spec
    }

    fn parse_output(&self, output_dir: &Path) -> Result<TranscriptResult> {
        let artifact = find_artifact(output_dir)?;
        let raw = std::fs::read_to_string(&artifact)?;
        let parsed: WhisperxOutput = serde_json::from_str(&raw)
            .map_err(|e| Error::EngineFailed(format!("whisperx artifact: {e}")))?;

        let segments = parsed
            .segments
            .into_iter()
            .map(|s| {
                let words = s
                    .words
                    .into_iter()
                    .map(|w| Word {
                        start: w.start.unwrap_or(s.start),
                        end: w.end.unwrap_or(s.end),
                        word: w.word,
                        score: w.score,
                        speaker: None,
                    })
                    .collect();
                Segment {
                    start: s.start,
                    end: s.end,
                    text: s.text,
                    speaker: None,
                    words,
                }
            })
            .collect();

        Ok(TranscriptResult {
            language: parsed.language.unwrap_or_else(|| "unknown".into()),
            segments,
        })
    }

    fn progress_decoder(&self) -> Box<dyn ProgressDecoder> {
        Box::new(RegexProgressDecoder::new(r"Progress:\s*([0-9.]+)%"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_embeds_params_and_env_path() {
        let adapter = WhisperxAdapter::new("/data/envs/whisperx");
        let mut params = TranscriptionParams::default();
        params.model = "tiny".into();
        params.language = Some("en".into());

        let spec = adapter.build_command(
            &params,
            Path::new("/data/uploads/j1/audio.wav"),
            Path::new("/data/temp/j1"),
        );

        assert_eq!(
            spec.program,
            PathBuf::from("/data/envs/whisperx/bin/python3")
        );
        assert!(spec.args.contains(&"--model".to_string()));
        assert!(spec.args.contains(&"tiny".to_string()));
        assert!(spec.args.contains(&"--language".to_string()));
        assert!(spec
            .env
            .iter()
            .any(|(k, v)| k == "HF_HOME" && v.contains("envs/whisperx")));
    }

    #[test]
    fn language_flag_omitted_when_detecting() {
        let adapter = WhisperxAdapter::new("/data/envs/whisperx");
        let params = TranscriptionParams::default();
        let spec = adapter.build_command(&params, Path::new("/a.wav"), Path::new("/out"));
        assert!(!spec.args.contains(&"--language".to_string()));
    }

    #[test]
    fn parses_engine_artifact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("audio.json"),
            r#"{
                "language": "en",
                "segments": [
                    {"start": 0.0, "end": 4.2, "text": " Ask not",
                     "words": [
                        {"word": "Ask", "start": 0.1, "end": 0.6, "score": 0.98},
                        {"word": "not", "start": 0.7, "end": 1.0, "score": 0.95}
                     ]}
                ]
            }"#,
        )
        .unwrap();

        let adapter = WhisperxAdapter::new("/unused");
        let result = adapter.parse_output(dir.path()).unwrap();
        assert_eq!(result.language, "en");
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].words.len(), 2);
        assert_eq!(result.segments[0].words[0].word, "Ask");
    }

    #[test]
    fn words_without_timings_inherit_segment_span() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("audio.json"),
            r#"{"segments": [{"start": 1.0, "end": 2.0, "text": "1962",
                 "words": [{"word": "1962"}]}]}"#,
        )
        .unwrap();

        let adapter = WhisperxAdapter::new("/unused");
        let result = adapter.parse_output(dir.path()).unwrap();
        let word = &result.segments[0].words[0];
        assert_eq!(word.start, 1.0);
        assert_eq!(word.end, 2.0);
        assert_eq!(result.language, "unknown");
    }

    #[test]
    fn missing_artifact_is_engine_failure() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = WhisperxAdapter::new("/unused");
        let err = adapter.parse_output(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "engine_failed");
    }
}
