//! Wire models for the fleet control server agent API

pub mod models;
