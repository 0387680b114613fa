//! Control server API client

pub mod agent;
pub mod client;
