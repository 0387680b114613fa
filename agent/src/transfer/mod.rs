pub mod download;
pub mod throttle;

pub use download::{download_file, DownloadOutcome, DownloadRequest};
