//! Background workers

pub mod dispatcher;
pub mod poller;
