//! Query orchestration, configuration and wiring for the lectern RAG system.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod rag;
pub mod session;

pub use config::Config;
pub use error::{OrchestratorError, RagError};
pub use orchestrator::{Orchestrator, OrchestratorSettings, TurnOutcome};
pub use rag::{QueryAnswer, RagSystem};
pub use session::SessionStore;
