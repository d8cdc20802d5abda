//! CLI command implementations.

pub mod constant;
pub mod event;
pub mod profile;
pub mod resolve;
pub mod tables;
