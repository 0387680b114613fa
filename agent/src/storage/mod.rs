//! On-disk layout, settings and credentials

pub mod identity;
pub mod layout;
pub mod settings;
