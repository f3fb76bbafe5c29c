pub mod bilibili;
pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod models;
pub mod store;

pub use bilibili::{BilibiliClient, FetchError, VideoContent};
pub use config::{BilisumConfig, ScopeMode};
pub use error::BilisumError;
pub use generator::{
    GeminiClient, GenerationError, PromptLimits, SummaryBackend, SummaryGenerator, FAILED_SUMMARY,
};
pub use models::{Analysis, NewAnalysis};
pub use store::{AnalysisStore, MemoryAnalysisStore, PgAnalysisStore, StoreError};
