//! Task status reporting

pub mod reporter;

pub use reporter::{ReporterOptions, StatusReporter, TaskStatusApi};
