//! Adapter contracts.

use std::path::{Path, PathBuf};

use scriberr_domain::params::ModelCapability;
use scriberr_domain::{Result, SpeakerTurn, TranscriptResult, TranscriptionParams};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Command specification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A prepared subprocess: executable, argv, env additions, working dir.
/// The processor owns spawning; adapters only describe.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Progress decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Extracts a completion percentage from one line of engine stdout.
/// Each adapter supplies its own pattern so the processor stays
/// engine-agnostic.
pub trait ProgressDecoder: Send + Sync {
    fn decode(&self, line: &str) -> Option<f32>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter contracts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One speech-recognition engine.
pub trait TranscriptionAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn supported_models(&self) -> Vec<ModelCapability>;

    /// Describe the subprocess that transcribes `audio_path` into
    /// artifacts under `output_dir`.
    fn build_command(
        &self,
        params: &TranscriptionParams,
        audio_path: &Path,
        output_dir: &Path,
    ) -> CommandSpec;

    /// Read the engine's on-disk artifacts and normalize them into the
    /// canonical transcript shape.
    fn parse_output(&self, output_dir: &Path) -> Result<TranscriptResult>;

    fn progress_decoder(&self) -> Box<dyn ProgressDecoder>;
}

/// One diarization engine. Mirrors the transcription contract but yields
/// a speaker-turn timeline the processor aligns against word timings.
pub trait DiarizationAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn build_command(
        &self,
        params: &TranscriptionParams,
        audio_path: &Path,
        output_dir: &Path,
    ) -> CommandSpec;

    fn parse_output(&self, output_dir: &Path) -> Result<Vec<SpeakerTurn>>;

    fn progress_decoder(&self) -> Box<dyn ProgressDecoder>;
}
