//! Task queue: scheduling, retry and execution windows

pub mod retry;
pub mod scheduler;
pub mod window;
