//! CLI command implementations

pub mod operate;
pub mod status;
pub mod verify;
