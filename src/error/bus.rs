use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum BusError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The subscriber fell behind and `0` messages were discarded.
    #[error("subscriber lagged, {0} messages skipped")]
    Lagged(u64),
}
