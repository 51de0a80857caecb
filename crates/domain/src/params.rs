//! Engine parameter bundle carried by jobs and profiles.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcription parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Structured engine parameters attached to a job or saved in a profile.
///
/// Every field has a serde default so clients may submit a sparse JSON
/// object; unknown engines are rejected at submit time by the registry,
/// not here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptionParams {
    #[serde(default = "d_engine")]
    pub engine_name: String,
    #[serde(default = "d_model")]
    pub model: String,
    /// `cpu`, `cuda`, or `auto`.
    #[serde(default = "d_device")]
    pub device: String,
    #[serde(default = "d_batch_size")]
    pub batch_size: u32,
    /// Compute precision: `float16`, `float32`, or `int8`.
    #[serde(default = "d_compute_type")]
    pub compute_type: String,
    /// Language hint (ISO 639-1). `None` lets the engine detect.
    #[serde(default)]
    pub language: Option<String>,
    /// VAD tuning.
    #[serde(default = "d_vad_onset")]
    pub vad_onset: f32,
    #[serde(default = "d_vad_offset")]
    pub vad_offset: f32,
    #[serde(default = "d_chunk_size")]
    pub chunk_size: u32,
    /// Decoding family.
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "d_beam_size")]
    pub beam_size: u32,
    #[serde(default = "d_length_penalty")]
    pub length_penalty: f32,
    /// Diarization bounds, used only when the job requests diarization.
    #[serde(default)]
    pub min_speakers: Option<u32>,
    #[serde(default)]
    pub max_speakers: Option<u32>,
    /// Diarization engine to pair with; defaults to pyannote.
    #[serde(default = "d_diarization_engine")]
    pub diarization_engine: String,
}

impl Default for TranscriptionParams {
    fn default() -> Self {
        Self {
            engine_name: d_engine(),
            model: d_model(),
            device: d_device(),
            batch_size: d_batch_size(),
            compute_type: d_compute_type(),
            language: None,
            vad_onset: d_vad_onset(),
            vad_offset: d_vad_offset(),
            chunk_size: d_chunk_size(),
            temperature: 0.0,
            beam_size: d_beam_size(),
            length_penalty: d_length_penalty(),
            min_speakers: None,
            max_speakers: None,
            diarization_engine: d_diarization_engine(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_engine() -> String {
    "whisperx".into()
}
fn d_model() -> String {
    "small".into()
}
fn d_device() -> String {
    "auto".into()
}
fn d_batch_size() -> u32 {
    16
}
fn d_compute_type() -> String {
    "float16".into()
}
fn d_vad_onset() -> f32 {
    0.5
}
fn d_vad_offset() -> f32 {
    0.363
}
fn d_chunk_size() -> u32 {
    30
}
fn d_beam_size() -> u32 {
    5
}
fn d_length_penalty() -> f32 {
    1.0
}
fn d_diarization_engine() -> String {
    "pyannote".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model capabilities
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One model an adapter can run, advertised via `/transcription/models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCapability {
    pub id: String,
    pub sizes: Vec<String>,
    pub supports_diarization: bool,
    /// Empty means "all languages the engine detects".
    pub languages: Vec<String>,
}
