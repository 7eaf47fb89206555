//! textdigest - text analysis through a local LLM.
//!
//! Reads a text file from a storage root, asks an Ollama-compatible backend
//! for a summary and key points, classifies the sentiment of each, and saves
//! a plain-text report alongside returning the structured result.

pub mod analysis;
pub mod config;
pub mod llm;
pub mod server;
pub mod source;

pub use analysis::{AnalysisError, AnalysisResult, Analyzer, ExecutionStrategy, PersistMode};
pub use config::{Config, Settings};
