//! Orchestration of sandboxed module execution.
//!
//! The executor turns a (code, input) pair into a normalized outcome: it
//! derives the module's content key, resolves or builds the isolate through
//! the registry, dispatches a synthetic request carrying the input, and maps
//! runtime failures onto the public error taxonomy. Untrusted code is never
//! retried after an execution failure; the only silent retry is a single
//! rebuild when the runtime reports the isolate expired underneath us.

use std::collections::HashMap;
use std::sync::Arc;

use crate::content_hash::{module_key, Namespace};
use crate::errors::SandboxError;
use crate::registry::{IsolateRegistry, SharedHandle};
use crate::runtime::{
    ExecutionRequest, IsolateConfig, IsolateError, IsolateResponse, IsolateRuntime,
};

const MAIN_MODULE_NAME: &str = "main.mjs";
const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Fallback module used when the caller submits no code: echoes the input
/// back uppercased.
pub const DEFAULT_MODULE: &str = r#"export default {
  async fetch(request) {
    const input = new URL(request.url).searchParams.get("input") ?? "";
    return new Response(input.toUpperCase(), {
      headers: { "content-type": "text/plain; charset=utf-8" },
    });
  },
};
"#;

/// Normalized result of one sandboxed execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl From<IsolateResponse> for ExecutionOutcome {
    fn from(response: IsolateResponse) -> Self {
        Self {
            status: response.status,
            content_type: response
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            body: response.body,
        }
    }
}

pub struct SandboxExecutor {
    runtime: Arc<dyn IsolateRuntime>,
    registry: IsolateRegistry,
    environment: HashMap<String, String>,
}

impl SandboxExecutor {
    pub fn new(runtime: Arc<dyn IsolateRuntime>, environment: HashMap<String, String>) -> Self {
        Self {
            runtime,
            registry: IsolateRegistry::new(),
            environment,
        }
    }

    /// Execute `code` against `input` inside the module's isolate.
    ///
    /// Blank code falls back to [`DEFAULT_MODULE`]; blank input falls back to
    /// `prompt_fallback`. Each distinct code string gets its own execution
    /// context, and that context never has outbound network access.
    pub async fn execute(
        &self,
        code: &str,
        input: &str,
        prompt_fallback: &str,
    ) -> Result<ExecutionOutcome, SandboxError> {
        let (source, namespace) = if code.trim().is_empty() {
            (DEFAULT_MODULE, Namespace::Sandbox)
        } else {
            (code, Namespace::Tool)
        };
        let input = if input.trim().is_empty() {
            prompt_fallback
        } else {
            input
        };

        let key = module_key(source, namespace);
        let handle = self
            .registry
            .get_or_build(&key, || self.build_isolate(source))
            .await?;

        let request = ExecutionRequest::with_input(input);
        match handle.invoke(&request).await {
            Ok(response) => Ok(response.into()),
            Err(IsolateError::Expired(reason)) => {
                // The runtime invalidated the isolate underneath us (for
                // example after inactivity). Rebuild once, transparently.
                log::debug!("Rebuilding expired isolate {}: {}", key, reason);
                self.registry.invalidate(&key, &handle).await;
                let fresh = self
                    .registry
                    .get_or_build(&key, || self.build_isolate(source))
                    .await?;
                let response = fresh.invoke(&request).await?;
                Ok(response.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Number of isolates currently cached.
    pub async fn cached_isolates(&self) -> usize {
        self.registry.len().await
    }

    async fn build_isolate(&self, source: &str) -> Result<SharedHandle, IsolateError> {
        let config =
            IsolateConfig::single_module(MAIN_MODULE_NAME, source, self.environment.clone());
        self.runtime.build(config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::IsolateHandle;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn input_of(request: &ExecutionRequest) -> String {
        let raw = request.url().split("input=").nth(1).unwrap_or("");
        urlencoding::decode(raw).map(|s| s.into_owned()).unwrap_or_default()
    }

    /// In-process runtime double: interprets the default module's uppercase
    /// semantics and otherwise echoes the input, with switchable failure
    /// modes for the error-path tests.
    struct FakeRuntime {
        builds: AtomicUsize,
        last_config: Mutex<Option<IsolateConfig>>,
        mode: FakeMode,
    }

    #[derive(Clone, Copy)]
    enum FakeMode {
        Normal,
        Unprovisioned,
        ThrowOnInvoke,
        ExpireFirstInvoke,
    }

    impl FakeRuntime {
        fn new(mode: FakeMode) -> Arc<Self> {
            Arc::new(Self {
                builds: AtomicUsize::new(0),
                last_config: Mutex::new(None),
                mode,
            })
        }
    }

    #[async_trait]
    impl IsolateRuntime for FakeRuntime {
        async fn build(
            &self,
            config: IsolateConfig,
        ) -> Result<Arc<dyn IsolateHandle>, IsolateError> {
            if matches!(self.mode, FakeMode::Unprovisioned) {
                return Err(IsolateError::Unavailable(
                    "sandbox capability not provisioned".to_string(),
                ));
            }
            let nth_build = self.builds.fetch_add(1, Ordering::SeqCst);
            let uppercase = config.modules[&config.main_module] == DEFAULT_MODULE;
            *self.last_config.lock().unwrap() = Some(config);
            Ok(Arc::new(FakeHandle {
                uppercase,
                throws: matches!(self.mode, FakeMode::ThrowOnInvoke),
                // Only the first-built handle expires, so the silent rebuild
                // gets a healthy replacement.
                expires: matches!(self.mode, FakeMode::ExpireFirstInvoke) && nth_build == 0,
            }))
        }
    }

    struct FakeHandle {
        uppercase: bool,
        throws: bool,
        expires: bool,
    }

    #[async_trait]
    impl IsolateHandle for FakeHandle {
        async fn invoke(
            &self,
            request: &ExecutionRequest,
        ) -> Result<IsolateResponse, IsolateError> {
            if self.throws {
                return Err(IsolateError::Invocation(
                    "TypeError: boom at handler".to_string(),
                ));
            }
            if self.expires {
                return Err(IsolateError::Expired("idle eviction".to_string()));
            }
            let input = input_of(request);
            let body = if self.uppercase {
                input.to_uppercase()
            } else {
                input
            };
            Ok(IsolateResponse {
                status: 200,
                content_type: Some("text/plain; charset=utf-8".to_string()),
                body,
            })
        }
    }

    fn executor(runtime: Arc<FakeRuntime>) -> SandboxExecutor {
        SandboxExecutor::new(runtime, HashMap::new())
    }

    #[tokio::test]
    async fn empty_code_runs_the_default_uppercase_module() {
        let runtime = FakeRuntime::new(FakeMode::Normal);
        let executor = executor(runtime.clone());

        let outcome = executor.execute("", "hello", "hello").await.unwrap();
        assert_eq!(outcome.body, "HELLO");
        assert_eq!(outcome.status, 200);
    }

    #[tokio::test]
    async fn empty_input_falls_back_to_the_prompt() {
        let runtime = FakeRuntime::new(FakeMode::Normal);
        let executor = executor(runtime.clone());

        let outcome = executor.execute("", "  ", "fallback").await.unwrap();
        assert_eq!(outcome.body, "FALLBACK");
    }

    #[tokio::test]
    async fn isolates_never_get_network_egress() {
        let runtime = FakeRuntime::new(FakeMode::Normal);
        let executor = executor(runtime.clone());

        executor
            .execute("export default { fetch() {} }", "x", "x")
            .await
            .unwrap();
        let config = runtime.last_config.lock().unwrap().clone().unwrap();
        assert!(!config.allow_network);
    }

    #[tokio::test]
    async fn identical_code_reuses_the_isolate() {
        let runtime = FakeRuntime::new(FakeMode::Normal);
        let executor = executor(runtime.clone());

        let code = "export default { fetch() {} }";
        executor.execute(code, "a", "a").await.unwrap();
        executor.execute(code, "b", "b").await.unwrap();

        assert_eq!(runtime.builds.load(Ordering::SeqCst), 1);
        assert_eq!(executor.cached_isolates().await, 1);
    }

    #[tokio::test]
    async fn distinct_code_builds_distinct_isolates() {
        let runtime = FakeRuntime::new(FakeMode::Normal);
        let executor = executor(runtime.clone());

        executor.execute("export default 1", "a", "a").await.unwrap();
        executor.execute("export default 2", "a", "a").await.unwrap();

        assert_eq!(runtime.builds.load(Ordering::SeqCst), 2);
        assert_eq!(executor.cached_isolates().await, 2);
    }

    #[tokio::test]
    async fn unprovisioned_runtime_surfaces_as_unavailable_not_build_failed() {
        let runtime = FakeRuntime::new(FakeMode::Unprovisioned);
        let executor = executor(runtime);

        let err = executor.execute("export default 1", "a", "a").await.unwrap_err();
        assert!(matches!(err, SandboxError::RuntimeUnavailable(_)));
    }

    #[tokio::test]
    async fn throwing_module_yields_invocation_failed_without_retry() {
        let runtime = FakeRuntime::new(FakeMode::ThrowOnInvoke);
        let executor = executor(runtime.clone());

        let err = executor.execute("export default 1", "a", "a").await.unwrap_err();
        assert!(matches!(err, SandboxError::InvocationFailed(_)));
        // A plain execution failure is never retried.
        assert_eq!(runtime.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_isolate_is_rebuilt_once_transparently() {
        let runtime = FakeRuntime::new(FakeMode::ExpireFirstInvoke);
        let executor = executor(runtime.clone());

        let outcome = executor.execute("", "hi", "hi").await.unwrap();
        assert_eq!(outcome.body, "HI");
        assert_eq!(runtime.builds.load(Ordering::SeqCst), 2);
    }
}
