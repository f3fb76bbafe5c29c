use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::BilisumError;

#[derive(Debug, Deserialize, Clone)]
pub struct BilisumConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub bilibili: BilibiliConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BilibiliConfig {
    pub api_base: String,
    pub timeout_seconds: u64,
    pub include_comments: bool,
    pub comment_page_size: u32,
}

impl Default for BilibiliConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.bilibili.com".to_string(),
            timeout_seconds: 15,
            include_comments: true,
            comment_page_size: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
    /// Maximum transcript characters embedded in the prompt
    pub transcript_char_limit: usize,
    /// Maximum characters of joined comments embedded in the prompt
    pub comment_char_limit: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-3-pro-preview".to_string(),
            timeout_seconds: 120,
            transcript_char_limit: 30_000,
            comment_char_limit: 10_000,
        }
    }
}

/// Whether stored analyses are shared by every caller or partitioned by a
/// per-caller key.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    #[default]
    Global,
    Session,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScopeConfig {
    pub mode: ScopeMode,
    /// Request/response header carrying the scope key in session mode
    pub header: String,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            mode: ScopeMode::Global,
            header: "x-session-id".to_string(),
        }
    }
}

impl BilisumConfig {
    /// Load from a TOML file, then overlay `BILISUM__SECTION__KEY` env vars.
    pub fn load(path: &str) -> Result<Self, BilisumError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("BILISUM").separator("__"))
            .build()?;
        Ok(s.try_deserialize()?)
    }
}
