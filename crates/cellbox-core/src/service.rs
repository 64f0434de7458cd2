//! Public facade wiring the executor and the prompt log together.
//!
//! This is the contract the front door consumes: execute a module, record a
//! prompt (best-effort), list and clear the history. History failures never
//! affect an execution result.

use std::sync::Arc;

use crate::config::SandboxConfig;
use crate::errors::SandboxError;
use crate::executor::{ExecutionOutcome, SandboxExecutor};
use crate::prompt_log::PromptLog;
use crate::runtime::IsolateRuntime;

pub struct SandboxService {
    executor: SandboxExecutor,
    prompt_log: PromptLog,
}

impl SandboxService {
    pub fn new(executor: SandboxExecutor, prompt_log: PromptLog) -> Self {
        Self {
            executor,
            prompt_log,
        }
    }

    /// Assemble a service from configuration around an injected runtime.
    pub async fn with_runtime(
        runtime: Arc<dyn IsolateRuntime>,
        config: &SandboxConfig,
    ) -> Result<Self, SandboxError> {
        let prompt_log = match &config.history.path {
            Some(path) => PromptLog::open(path, config.history.max_entries).await?,
            None => PromptLog::in_memory(config.history.max_entries),
        };
        let executor = SandboxExecutor::new(runtime, config.execution.environment.clone());
        Ok(Self::new(executor, prompt_log))
    }

    pub async fn execute(
        &self,
        code: &str,
        input: &str,
        prompt_fallback: &str,
    ) -> Result<ExecutionOutcome, SandboxError> {
        self.executor.execute(code, input, prompt_fallback).await
    }

    /// Record a prompt in the history. Best-effort: a failing history store
    /// is logged and ignored so it can never fail the primary request.
    pub async fn record_prompt(&self, text: &str) {
        if let Err(err) = self.prompt_log.append(text).await {
            log::warn!("Dropping prompt history entry: {}", err);
        }
    }

    pub async fn list_prompts(&self) -> Vec<String> {
        self.prompt_log.list().await
    }

    pub async fn clear_prompts(&self) -> Result<(), SandboxError> {
        self.prompt_log.clear().await
    }
}
