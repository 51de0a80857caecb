//! Shared types for the Scriberr backend: configuration, the kind-tagged
//! error, job status, engine parameters, and the canonical transcript shape.

pub mod config;
pub mod error;
pub mod job;
pub mod params;
pub mod stream;
pub mod transcript;

pub use error::{Error, Result};
pub use job::JobStatus;
pub use params::TranscriptionParams;
pub use transcript::{Segment, SpeakerTurn, TranscriptResult, Word};
