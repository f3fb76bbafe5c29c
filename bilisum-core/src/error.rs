use thiserror::Error;

use crate::bilibili::FetchError;
use crate::generator::GenerationError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum BilisumError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
