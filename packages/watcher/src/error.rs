use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("splitter error: {0}")]
    Splitter(#[from] onix_splitter::SplitterError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, WatcherError>;
