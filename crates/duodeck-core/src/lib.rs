//! Duodeck Core - dual-deck real-time audio mixing engine

pub mod effects;
pub mod engine;
pub mod error;
pub mod loader;
pub mod track;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use types::*;
