//! Server configuration.
//!
//! Environment variables win over the optional TOML file, which wins over
//! built-in defaults. `Config::load` applies the three layers in that
//! order; `Config::validate` reports issues without aborting so the caller
//! decides which severities are fatal.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// Maximum multipart body size in bytes.
    #[serde(default = "d_body_limit")]
    pub body_size_limit: usize,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed for CORS. Use `["*"]` for permissive (NOT
    /// recommended). Defaults to localhost-only.
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root under which uploads/, temp/, transcripts/, and envs/ live.
    #[serde(default = "d_data_dir")]
    pub data_dir: PathBuf,
    /// SQLite database file. `:memory:` is accepted for tests.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Explicit overrides for the derived layout.
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    #[serde(default)]
    pub models_dir: Option<PathBuf>,
    /// Keep a failed job's temp dir for diagnostics instead of removing it.
    #[serde(default)]
    pub keep_temp_on_failure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret. `None` generates a random per-start secret
    /// (dev only — every restart invalidates outstanding tokens).
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "d_true")]
    pub registration_enabled: bool,
    /// Seed admin account, created at boot if no users exist.
    #[serde(default)]
    pub admin_username: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "d_queue_capacity")]
    pub capacity: usize,
    /// Worker count. `None` = logical CPU count capped at 8.
    #[serde(default)]
    pub workers: Option<usize>,
}

/// Environment-level LLM fallback, used to seed the database config when no
/// row is active yet.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub ollama_base_url: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
}

// ── Defaults ────────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            body_size_limit: d_body_limit(),
            cors: CorsConfig::default(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: d_data_dir(),
            database_path: None,
            upload_dir: None,
            work_dir: None,
            models_dir: None,
            keep_temp_on_failure: false,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            registration_enabled: true,
            admin_username: None,
            admin_password: None,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: d_queue_capacity(),
            workers: None,
        }
    }
}

fn d_host() -> String {
    "0.0.0.0".into()
}
fn d_port() -> u16 {
    8080
}
fn d_body_limit() -> usize {
    1024 * 1024 * 1024
}
fn d_cors_origins() -> Vec<String> {
    vec!["http://localhost:*".into(), "http://127.0.0.1:*".into()]
}
fn d_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn d_queue_capacity() -> usize {
    200
}
fn d_true() -> bool {
    true
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Loading
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Config {
    /// Load from the optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)?;
                toml::from_str(&raw)
                    .map_err(|e| crate::Error::Validation(format!("config file: {e}")))?
            }
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Overlay process environment variables onto the file/default values.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_str("HOST") {
            self.server.host = v;
        }
        if let Some(v) = env_parse::<u16>("PORT") {
            self.server.port = v;
        }
        if let Some(v) = env_parse::<usize>("BODY_SIZE_LIMIT") {
            self.server.body_size_limit = v;
        }
        if let Some(v) = env_str("DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }
        if let Some(v) = env_str("DATABASE_PATH").or_else(|| env_str("DATABASE_URL")) {
            self.storage.database_path = Some(PathBuf::from(
                v.strip_prefix("sqlite://").unwrap_or(&v).to_string(),
            ));
        }
        if let Some(v) = env_str("UPLOAD_DIR") {
            self.storage.upload_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = env_str("WORK_DIR") {
            self.storage.work_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = env_str("MODELS_DIR") {
            self.storage.models_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = env_parse::<bool>("KEEP_TEMP_ON_FAILURE") {
            self.storage.keep_temp_on_failure = v;
        }
        if let Some(v) = env_str("JWT_SECRET") {
            self.auth.jwt_secret = Some(v);
        }
        if let Some(v) = env_parse::<bool>("REGISTRATION_ENABLED") {
            self.auth.registration_enabled = v;
        }
        if let Some(v) = env_str("ADMIN_USERNAME") {
            self.auth.admin_username = Some(v);
        }
        if let Some(v) = env_str("ADMIN_PASSWORD") {
            self.auth.admin_password = Some(v);
        }
        if let Some(v) = env_parse::<usize>("QUEUE_CAPACITY") {
            self.queue.capacity = v;
        }
        if let Some(v) = env_parse::<usize>("WORKER_COUNT") {
            self.queue.workers = Some(v);
        }
        if let Some(v) = env_str("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(v);
        }
        if let Some(v) = env_str("OLLAMA_BASE_URL") {
            self.llm.ollama_base_url = Some(v);
        }
        if let Some(v) = env_str("AI_MODEL") {
            self.llm.default_model = Some(v);
        }
    }

    // ── Derived filesystem layout ──────────────────────────────────

    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join("scriberr.db"))
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.storage
            .upload_dir
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join("uploads"))
    }

    pub fn work_dir(&self) -> PathBuf {
        self.storage
            .work_dir
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join("temp"))
    }

    pub fn transcripts_dir(&self) -> PathBuf {
        self.storage.data_dir.join("transcripts")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.storage
            .models_dir
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join("models"))
    }

    /// Engine environment root for a named engine, e.g. `envs/whisperx`.
    pub fn engine_env(&self, engine: &str) -> PathBuf {
        self.storage.data_dir.join("envs").join(engine)
    }

    // ── Validation ─────────────────────────────────────────────────

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.queue.capacity == 0 {
            issues.push(ConfigIssue::error("queue.capacity must be at least 1"));
        }
        if self.queue.workers == Some(0) {
            issues.push(ConfigIssue::error("queue.workers must be at least 1"));
        }
        if self.auth.jwt_secret.is_none() {
            let msg = "no JWT_SECRET set — using a random per-start secret, \
                       sessions will not survive restarts";
            if std::env::var("ENVIRONMENT").as_deref() == Ok("production") {
                issues.push(ConfigIssue::error("JWT_SECRET is required in production"));
            } else {
                issues.push(ConfigIssue::warning(msg));
            }
        }
        if self.auth.admin_username.is_some() != self.auth.admin_password.is_some() {
            issues.push(ConfigIssue::warning(
                "ADMIN_USERNAME and ADMIN_PASSWORD must both be set to seed an admin",
            ));
        }
        if self.server.body_size_limit < 1024 * 1024 {
            issues.push(ConfigIssue::warning(
                "body_size_limit below 1 MiB will reject most audio uploads",
            ));
        }

        issues
    }
}

fn env_str(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_str(name).and_then(|v| v.parse().ok())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Issues
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl ConfigIssue {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
