//! AcuKG Common Library
//!
//! Shared code for the AcuKG QA service including:
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability
//! - Chat model and graph store clients
//! - Vocabulary cache
//! - The question-answering pipeline

pub mod cache;
pub mod config;
pub mod errors;
pub mod graph;
pub mod llm;
pub mod metrics;
pub mod qa;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export commonly used types
pub use cache::{VocabularyCache, VocabularySource};
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use graph::GraphStore;
pub use llm::ChatModel;
pub use qa::QaService;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
