pub mod config;
pub mod error;
pub mod worker;

pub use config::WatcherConfig;
pub use error::WatcherError;
pub use worker::{poll_once, run_watch_worker, CycleSummary};
