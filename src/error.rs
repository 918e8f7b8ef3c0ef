use crate::feed::FeedError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),
}
