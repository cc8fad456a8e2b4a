//! spool-llm
//!
//! `TaskExecutor` backed by the Gemini `generateContent` REST API.

pub mod config;
pub mod executor;
pub mod types;

pub use config::GeminiConfig;
pub use executor::GeminiExecutor;
