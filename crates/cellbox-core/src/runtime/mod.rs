//! Isolate runtime abstraction for sandboxed module execution.
//!
//! The executor never talks to a concrete sandbox directly; it goes through
//! the [`IsolateRuntime`] capability, which builds an execution context for a
//! set of module sources and hands back a re-invokable [`IsolateHandle`].
//! This keeps the orchestration testable with in-process doubles and keeps
//! the isolation contract (no outbound network access) visible at the seam.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod docker;

pub use docker::DockerIsolateRuntime;

/// Declared configuration for one execution context.
#[derive(Debug, Clone)]
pub struct IsolateConfig {
    /// Name of the entry module within `modules`.
    pub main_module: String,
    /// Module name -> source text. The executor supplies exactly one module.
    pub modules: HashMap<String, String>,
    /// Environment baseline visible to the module.
    pub environment: HashMap<String, String>,
    /// Always false for sandboxed execution. The field exists so the
    /// isolation invariant is explicit and assertable at this seam.
    pub allow_network: bool,
}

impl IsolateConfig {
    /// Single-module config with network egress disabled.
    pub fn single_module(
        name: impl Into<String>,
        source: impl Into<String>,
        environment: HashMap<String, String>,
    ) -> Self {
        let name = name.into();
        let mut modules = HashMap::new();
        modules.insert(name.clone(), source.into());
        Self {
            main_module: name,
            modules,
            environment,
            allow_network: false,
        }
    }
}

/// Synthetic HTTP-shaped request dispatched into an isolate.
///
/// Built freshly per invocation and never persisted. Carries the caller's
/// input as a single URL-encoded query parameter.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    url: String,
}

// The host is a reserved name; the isolate has no egress, so the URL only
// serves as an addressable shape for the module's fetch handler.
const REQUEST_BASE_URL: &str = "https://cellbox.invalid/run";

impl ExecutionRequest {
    pub fn with_input(input: &str) -> Self {
        Self {
            url: format!("{}?input={}", REQUEST_BASE_URL, urlencoding::encode(input)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Response read back from an isolate invocation.
#[derive(Debug, Clone)]
pub struct IsolateResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// Failure modes at the runtime boundary.
#[derive(Error, Debug, Clone)]
pub enum IsolateError {
    #[error("build rejected: {0}")]
    Build(String),
    #[error("invocation failed: {0}")]
    Invocation(String),
    #[error("isolate expired: {0}")]
    Expired(String),
    #[error("invocation timed out after {0}s")]
    Timeout(u64),
    #[error("runtime unavailable: {0}")]
    Unavailable(String),
}

/// Capability that constructs execution contexts.
#[async_trait]
pub trait IsolateRuntime: Send + Sync {
    async fn build(&self, config: IsolateConfig) -> Result<Arc<dyn IsolateHandle>, IsolateError>;
}

/// A constructed execution context bound to one module's content.
///
/// Shared read-only across callers presenting the same key; re-invokable
/// across time. The underlying runtime may invalidate a handle at its
/// discretion, surfacing [`IsolateError::Expired`] on the next invocation.
#[async_trait]
pub trait IsolateHandle: Send + Sync {
    async fn invoke(&self, request: &ExecutionRequest) -> Result<IsolateResponse, IsolateError>;
}
