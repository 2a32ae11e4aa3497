//! Shared model, configuration and local persistence for RadioWave.

pub mod config;
pub mod error;
pub mod favorites;
pub mod logging;
pub mod platform;
pub mod protocol;
pub mod storage;
pub mod theme;
