//! Process-wide adapter registry.
//!
//! Two disjoint maps — transcription and diarization — populated once
//! during startup and read-only afterwards. Holding values behind `Arc`
//! keeps lookups cheap for the worker pool.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use scriberr_domain::params::ModelCapability;

use crate::traits::{DiarizationAdapter, TranscriptionAdapter};

#[derive(Default)]
pub struct AdapterRegistry {
    transcription: Mutex<HashMap<String, Arc<dyn TranscriptionAdapter>>>,
    diarization: Mutex<HashMap<String, Arc<dyn DiarizationAdapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_transcription(&self, adapter: Arc<dyn TranscriptionAdapter>) {
        let name = adapter.name().to_string();
        tracing::info!(engine = %name, "registered transcription adapter");
        self.transcription.lock().insert(name, adapter);
    }

    pub fn register_diarization(&self, adapter: Arc<dyn DiarizationAdapter>) {
        let name = adapter.name().to_string();
        tracing::info!(engine = %name, "registered diarization adapter");
        self.diarization.lock().insert(name, adapter);
    }

    pub fn transcription(&self, name: &str) -> Option<Arc<dyn TranscriptionAdapter>> {
        self.transcription.lock().get(name).cloned()
    }

    pub fn diarization(&self, name: &str) -> Option<Arc<dyn DiarizationAdapter>> {
        self.diarization.lock().get(name).cloned()
    }

    /// Capability map for `/transcription/models`, keyed by engine name.
    pub fn model_capabilities(&self) -> HashMap<String, Vec<ModelCapability>> {
        self.transcription
            .lock()
            .iter()
            .map(|(name, adapter)| (name.clone(), adapter.supported_models()))
            .collect()
    }

    pub fn transcription_engines(&self) -> Vec<String> {
        let mut names: Vec<String> = self.transcription.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whisperx::WhisperxAdapter;

    #[test]
    fn lookup_by_name() {
        let registry = AdapterRegistry::new();
        registry.register_transcription(Arc::new(WhisperxAdapter::new("/tmp/envs/whisperx")));

        assert!(registry.transcription("whisperx").is_some());
        assert!(registry.transcription("parakeet").is_none());
        assert!(registry.diarization("whisperx").is_none());
        assert_eq!(registry.transcription_engines(), vec!["whisperx"]);
    }

    #[test]
    fn capabilities_keyed_by_engine() {
        let registry = AdapterRegistry::new();
        registry.register_transcription(Arc::new(WhisperxAdapter::new("/tmp/envs/whisperx")));
        let caps = registry.model_capabilities();
        assert!(caps.contains_key("whisperx"));
        assert!(!caps["whisperx"].is_empty());
    }
}
