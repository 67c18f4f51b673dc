//! Flowscope - Natural-language security query router
//!
//! Classifies a security question, routes it to a network-flow graph store,
//! a vector index of flow and log text, or both, races the candidate
//! strategies under per-strategy deadlines, and assembles a single response.
//! A tiered cache with in-flight deduplication sits in front of all backend
//! work.

pub mod analyzer;
pub mod assembler;
pub mod backends;
pub mod cache;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod patterns;
pub mod retrieval;
pub mod router;

pub use analyzer::{AnalysisRequest, AnalysisType, Analyzer, Backends};
pub use assembler::AnalysisResponse;
pub use error::{FlowscopeError, Result};
