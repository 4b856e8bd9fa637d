//! Infrastructure layer - Store adapters and process setup

pub mod cache;
pub mod logging;
