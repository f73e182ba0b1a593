pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::MergeConfig;
pub use self::core::{CloudRecord, FileDataHandler, PullReport};
pub use error::{ErrorKind, MergeError};
