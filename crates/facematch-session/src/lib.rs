//! facematch-session — Recognition orchestration.
//!
//! Bridges an external embedding model to the registry and matcher,
//! runs the quality-gated registration flow, and serializes all access
//! through a single engine thread.

pub mod config;
pub mod engine;
pub mod session;
pub mod source;

pub use config::Config;
pub use engine::{run_recognition_loop, spawn_engine, EngineError, EngineHandle, EngineStatus, LoopSummary};
pub use session::{RecognitionSession, SessionError, SessionSettings, SessionState};
pub use source::{EmbeddingSource, FaceDetection, FrameFeed, SourceError};
