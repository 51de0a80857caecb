//! SQLite persistence layer.
//!
//! One repository per aggregate root, all sharing a [`sqlx::SqlitePool`].
//! Schema evolves through the ordered migrations embedded from
//! `migrations/`; [`Database::connect`] runs them at startup.
//!
//! Failure semantics: every operation returns `Result<T, StorageError>`
//! where not-found, uniqueness conflicts, and I/O errors are distinct
//! variants.

pub mod api_keys;
pub mod chat;
pub mod db;
pub mod error;
pub mod ids;
pub mod jobs;
pub mod llm_configs;
pub mod models;
pub mod notes;
pub mod profiles;
pub mod refresh_tokens;
pub mod speakers;
pub mod summaries;
pub mod templates;
pub mod users;

pub use db::Database;
pub use error::{StorageError, StorageResult};
pub use models::*;

use sqlx::SqlitePool;

/// All repositories bundled for injection into the server state.
#[derive(Clone)]
pub struct Repositories {
    pub users: users::UserRepo,
    pub api_keys: api_keys::ApiKeyRepo,
    pub refresh_tokens: refresh_tokens::RefreshTokenRepo,
    pub jobs: jobs::JobRepo,
    pub profiles: profiles::ProfileRepo,
    pub notes: notes::NoteRepo,
    pub templates: templates::TemplateRepo,
    pub chat: chat::ChatRepo,
    pub summaries: summaries::SummaryRepo,
    pub llm_configs: llm_configs::LlmConfigRepo,
    pub speakers: speakers::SpeakerMappingRepo,
}

impl Repositories {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            users: users::UserRepo::new(pool.clone()),
            api_keys: api_keys::ApiKeyRepo::new(pool.clone()),
            refresh_tokens: refresh_tokens::RefreshTokenRepo::new(pool.clone()),
            jobs: jobs::JobRepo::new(pool.clone()),
            profiles: profiles::ProfileRepo::new(pool.clone()),
            notes: notes::NoteRepo::new(pool.clone()),
            templates: templates::TemplateRepo::new(pool.clone()),
            chat: chat::ChatRepo::new(pool.clone()),
            summaries: summaries::SummaryRepo::new(pool.clone()),
            llm_configs: llm_configs::LlmConfigRepo::new(pool.clone()),
            speakers: speakers::SpeakerMappingRepo::new(pool),
        }
    }
}
