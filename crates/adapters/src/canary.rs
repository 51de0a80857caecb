//! NVIDIA Canary adapter — multilingual NeMo model, same runner contract
//! as parakeet.

use std::path::{Path, PathBuf};

use scriberr_domain::params::ModelCapability;
use scriberr_domain::{Result, TranscriptResult, TranscriptionParams};

use crate::parakeet::parse_nemo_artifact;
use crate::progress::RegexProgressDecoder;
use crate::traits::{CommandSpec, ProgressDecoder, TranscriptionAdapter};

pub struct CanaryAdapter {
    env_path: PathBuf,
}

impl CanaryAdapter {
    pub fn new(env_path: impl Into<PathBuf>) -> Self {
        Self {
            env_path: env_path.into(),
        }
    }
}

impl TranscriptionAdapter for CanaryAdapter {
    fn name(&self) -> &str {
        "canary"
    }

    fn supported_models(&self) -> Vec<ModelCapability> {
        vec![ModelCapability {
            id: "canary".into(),
            sizes: vec!["180m-flash".into(), "1b".into()],
            supports_diarization: false,
            languages: vec!["en".into(), "de".into(), "es".into(), "fr".into()],
        }]
    }

    fn build_command(
        &self,
        params: &TranscriptionParams,
        audio_path: &Path,
        output_dir: &Path,
    ) -> CommandSpec {
        let mut spec = CommandSpec::new(self.env_path.join("bin").join("python3"))
            .arg(self.env_path.join("transcribe.py").display().to_string())
            .args(["--audio", &audio_path.display().to_string()])
            .args(["--output-dir", &output_dir.display().to_string()])
            .args(["--model", &format!("canary-{}", params.model)])
            .args(["--device", &params.device])
            .args(["--batch-size", &params.batch_size.to_string()])
            .env(
                "NEMO_CACHE_DIR",
                self.env_path.join("cache").display().to_string(),
            );
        if let Some(language) = &params.language {
            spec = spec.args(["--source-lang", language]);
        }
        spec
    }

    fn parse_output(&self, output_dir: &Path) -> Result<TranscriptResult> {
        parse_nemo_artifact(output_dir, self.name())
    }

    fn progress_decoder(&self) -> Box<dyn ProgressDecoder> {
        Box::new(RegexProgressDecoder::new(r"Progress:\s*([0-9.]+)%"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_lang_flag_follows_hint() {
        let adapter = CanaryAdapter::new("/envs/canary");
        let mut params = TranscriptionParams::default();
        params.language = Some("de".into());
        let spec = adapter.build_command(&params, Path::new("/a.wav"), Path::new("/out"));
        assert!(spec.args.contains(&"--source-lang".to_string()));
        assert!(spec.args.contains(&"de".to_string()));
    }
}
