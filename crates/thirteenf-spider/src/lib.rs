pub mod client;
pub mod config;
pub mod error;
pub mod fs;
pub mod sec;
pub(crate) mod tui;

pub use config::Config;
pub use error::{Error, Result};

/// Shortcut for required API elements.
pub(crate) mod http {
    pub(crate) use reqwest::Client as HttpClient;
    pub(crate) use tokio_postgres::Client as PgClient;
}

/// Format the time passed since `time`, for the end of a log line.
pub(crate) fn time_elapsed(time: std::time::Instant) -> String {
    format!("time elapsed: {:.2?}", time.elapsed())
}
