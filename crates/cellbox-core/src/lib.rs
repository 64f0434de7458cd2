//! Core library for caching and invoking sandboxed code modules.
//!
//! This crate lets a caller submit an arbitrary, untrusted code module together
//! with a textual input, run that module inside an isolated execution context
//! with no outbound network access, and read back the raw response. Execution
//! contexts are content-addressed: identical module source reuses the same
//! isolate instead of building a new one per request. A small bounded prompt
//! log rides alongside for history display.
//!
//! # Architecture Overview
//!
//! The crate is organized around a few small subsystems:
//!
//! - **Content addressing**: deterministic, namespaced SHA-256 keys over module source
//! - **Isolate registry**: concurrent key -> handle cache with an at-most-one-build guarantee
//! - **Sandbox executor**: orchestrates key derivation, isolate builds, and request dispatch
//! - **Runtime abstraction**: an injected capability that builds and invokes isolates,
//!   with a Docker-backed implementation
//! - **Prompt log**: a bounded, optionally persistent history of submitted prompts
//! - **Service facade**: the public execute/record/list/clear contract

pub mod config;
pub mod content_hash;
pub mod errors;
pub mod executor;
pub mod prompt_log;
pub mod registry;
pub mod runtime;
pub mod service;

pub use config::SandboxConfig;
pub use content_hash::{module_key, IsolateKey, Namespace};
pub use errors::SandboxError;
pub use executor::{ExecutionOutcome, SandboxExecutor};
pub use prompt_log::PromptLog;
pub use registry::IsolateRegistry;
pub use runtime::{ExecutionRequest, IsolateConfig, IsolateHandle, IsolateRuntime};
pub use service::SandboxService;
