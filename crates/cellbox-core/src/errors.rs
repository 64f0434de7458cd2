//! Error types for failure handling across the sandbox cache
//!
//! The public boundary exposes a small tagged taxonomy rather than leaking
//! runtime-specific error types: callers need to distinguish "the module was
//! bad", "the module ran and failed", and "the sandboxing capability is not
//! provisioned here", because each calls for a different presentation. History
//! store failures get their own tag so call sites can treat them as
//! best-effort and move on.

use thiserror::Error;

use crate::runtime::IsolateError;

#[derive(Error, Debug, Clone)]
pub enum SandboxError {
    #[error("Module build failed: {0}")]
    BuildFailed(String),
    #[error("Module invocation failed: {0}")]
    InvocationFailed(String),
    #[error("Sandbox runtime unavailable: {0}")]
    RuntimeUnavailable(String),
    #[error("Prompt history unavailable: {0}")]
    LogUnavailable(String),
}

impl From<IsolateError> for SandboxError {
    fn from(err: IsolateError) -> Self {
        match err {
            IsolateError::Build(msg) => SandboxError::BuildFailed(msg),
            IsolateError::Invocation(msg) => SandboxError::InvocationFailed(msg),
            // An isolate that expired after the executor's single silent
            // rebuild counts as an invocation failure, not a fresh build error.
            IsolateError::Expired(msg) => {
                SandboxError::InvocationFailed(format!("isolate expired: {}", msg))
            }
            IsolateError::Timeout(secs) => {
                SandboxError::InvocationFailed(format!("execution timed out after {}s", secs))
            }
            IsolateError::Unavailable(msg) => SandboxError::RuntimeUnavailable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_keeps_unavailable_distinct_from_build() {
        let err: SandboxError = IsolateError::Unavailable("no docker socket".to_string()).into();
        assert!(matches!(err, SandboxError::RuntimeUnavailable(_)));

        let err: SandboxError = IsolateError::Build("syntax error".to_string()).into();
        assert!(matches!(err, SandboxError::BuildFailed(_)));
    }

    #[test]
    fn timeout_maps_to_invocation_failure() {
        let err: SandboxError = IsolateError::Timeout(30).into();
        match err {
            SandboxError::InvocationFailed(msg) => assert!(msg.contains("30")),
            other => panic!("expected InvocationFailed, got {:?}", other),
        }
    }
}
