//! Fleet Agent Library
//!
//! Task scheduling and execution pipeline for the fleet endpoint agent.

pub mod app;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod installer;
pub mod integrity;
pub mod logs;
pub mod pipeline;
pub mod queue;
pub mod report;
pub mod server;
pub mod storage;
pub mod telemetry;
pub mod transfer;
pub mod utils;
pub mod workers;
