// src/runtime/docker.rs
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::models::ContainerCreateBody;
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    StopContainerOptions as BollardStopContainerOptionsQuery,
    WaitContainerOptions as BollardWaitContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use serde::Deserialize;
use std::default::Default;
use std::sync::Arc;
use tempfile::Builder;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{ExecutionRequest, IsolateConfig, IsolateError, IsolateHandle, IsolateResponse, IsolateRuntime};

const DEFAULT_IMAGE: &str = "node:18-slim";
const CONTAINER_WORK_DIR: &str = "/work";
const HARNESS_FILENAME: &str = "__cellbox_harness.mjs";

// The harness drives the module's fetch-shaped default export and prints a
// single marker-prefixed JSON line so module stdout can't be confused with
// the result.
const RESULT_MARKER: &str = "__cellbox_result__";

const HARNESS_SOURCE: &str = r#"const [url, modulePath] = process.argv.slice(2);
const mod = await import(modulePath);
const response = await mod.default.fetch(new Request(url));
const body = await response.text();
console.log("__cellbox_result__" + JSON.stringify({
  status: response.status,
  content_type: response.headers.get("content-type"),
  body,
}));
"#;

#[derive(Debug, Deserialize)]
struct HarnessResult {
    status: u16,
    content_type: Option<String>,
    body: String,
}

/// Docker-backed isolate runtime.
///
/// Each invocation runs the module in a fresh container with
/// `network_mode: "none"`, so the module never receives egress capability.
pub struct DockerIsolateRuntime {
    docker: Docker,
    image: String,
    timeout_seconds: u64,
}

impl DockerIsolateRuntime {
    /// Connect to the local Docker daemon. A missing daemon is reported as
    /// `Unavailable` so callers can present "feature not available" rather
    /// than a build error.
    pub fn connect(timeout_seconds: u64) -> Result<Self, IsolateError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| IsolateError::Unavailable(e.to_string()))?;
        Ok(Self {
            docker,
            image: DEFAULT_IMAGE.to_string(),
            timeout_seconds,
        })
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }
}

#[async_trait]
impl IsolateRuntime for DockerIsolateRuntime {
    async fn build(&self, config: IsolateConfig) -> Result<Arc<dyn IsolateHandle>, IsolateError> {
        let main_source = config
            .modules
            .get(&config.main_module)
            .ok_or_else(|| {
                IsolateError::Build(format!("main module '{}' missing", config.main_module))
            })?;
        if main_source.trim().is_empty() {
            return Err(IsolateError::Build("main module source is empty".to_string()));
        }
        if config.allow_network {
            return Err(IsolateError::Build(
                "network egress cannot be enabled for sandboxed modules".to_string(),
            ));
        }

        Ok(Arc::new(DockerIsolateHandle {
            docker: self.docker.clone(),
            image: self.image.clone(),
            timeout_seconds: self.timeout_seconds,
            config,
        }))
    }
}

pub struct DockerIsolateHandle {
    docker: Docker,
    image: String,
    timeout_seconds: u64,
    config: IsolateConfig,
}

impl DockerIsolateHandle {
    async fn materialize_sources(&self, dir: &std::path::Path) -> Result<(), IsolateError> {
        for (name, source) in &self.config.modules {
            let mut file = fs::File::create(dir.join(name))
                .await
                .map_err(|e| IsolateError::Invocation(e.to_string()))?;
            file.write_all(source.as_bytes())
                .await
                .map_err(|e| IsolateError::Invocation(e.to_string()))?;
            file.flush()
                .await
                .map_err(|e| IsolateError::Invocation(e.to_string()))?;
        }
        fs::write(dir.join(HARNESS_FILENAME), HARNESS_SOURCE)
            .await
            .map_err(|e| IsolateError::Invocation(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl IsolateHandle for DockerIsolateHandle {
    async fn invoke(&self, request: &ExecutionRequest) -> Result<IsolateResponse, IsolateError> {
        let temp_dir = Builder::new()
            .prefix("cellbox-")
            .tempdir()
            .map_err(|e| IsolateError::Invocation(e.to_string()))?;
        let host_dir = temp_dir
            .path()
            .to_str()
            .ok_or_else(|| IsolateError::Invocation("invalid temp path".to_string()))?
            .to_string();

        self.materialize_sources(temp_dir.path()).await?;

        let main_in_container = format!("{}/{}", CONTAINER_WORK_DIR, self.config.main_module);
        let harness_in_container = format!("{}/{}", CONTAINER_WORK_DIR, HARNESS_FILENAME);

        let env: Vec<String> = self
            .config
            .environment
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(format!("cellbox-{}", Uuid::new_v4())),
            ..Default::default()
        });

        let container_config = ContainerCreateBody {
            image: Some(self.image.clone()),
            cmd: Some(vec![
                "node".to_string(),
                harness_in_container,
                request.url().to_string(),
                main_in_container,
            ]),
            env: Some(env),
            working_dir: Some(CONTAINER_WORK_DIR.to_string()),
            host_config: Some(bollard::models::HostConfig {
                binds: Some(vec![format!("{}:{}", host_dir, CONTAINER_WORK_DIR)]),
                auto_remove: Some(true),
                // Hard isolation invariant: no outbound network access.
                network_mode: Some("none".to_string()),
                ..Default::default()
            }),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container(options, container_config)
            .await
            .map_err(|e| IsolateError::Invocation(e.to_string()))?;
        self.docker
            .start_container(&container.id, None::<BollardStartContainerOptionsQuery>)
            .await
            .map_err(|e| IsolateError::Invocation(e.to_string()))?;

        let mut wait_stream = self
            .docker
            .wait_container(&container.id, None::<BollardWaitContainerOptionsQuery>);
        let timeout_future =
            tokio::time::sleep(tokio::time::Duration::from_secs(self.timeout_seconds));

        let wait_outcome = tokio::select! {
            res = wait_stream.next() => res,
            _ = timeout_future => {
                log::warn!("Execution timed out for container {}", container.id);
                let _ = self.docker.stop_container(&container.id, None::<BollardStopContainerOptionsQuery>).await;
                return Err(IsolateError::Timeout(self.timeout_seconds));
            }
        };

        let wait_response = match wait_outcome {
            Some(Ok(response)) => response,
            Some(Err(e)) => return Err(IsolateError::Invocation(e.to_string())),
            None => {
                return Err(IsolateError::Invocation(
                    "container wait stream ended unexpectedly".to_string(),
                ))
            }
        };

        let mut output_stream = self.docker.logs(
            &container.id,
            Some(BollardLogsOptionsQuery {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut stdout = String::new();
        let mut stderr = String::new();
        while let Some(log_result) = output_stream.next().await {
            match log_result {
                Ok(LogOutput::StdOut { message }) => {
                    stdout.push_str(&String::from_utf8_lossy(&message))
                }
                Ok(LogOutput::StdErr { message }) => {
                    stderr.push_str(&String::from_utf8_lossy(&message))
                }
                Ok(_) => {}
                Err(e) => return Err(IsolateError::Invocation(e.to_string())),
            }
        }

        if wait_response.status_code != 0 {
            return Err(IsolateError::Invocation(format!(
                "module exited with code {}: {}",
                wait_response.status_code,
                stderr.trim()
            )));
        }

        parse_harness_result(&stdout)
    }
}

fn parse_harness_result(stdout: &str) -> Result<IsolateResponse, IsolateError> {
    let result_line = stdout
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(RESULT_MARKER))
        .ok_or_else(|| {
            IsolateError::Invocation("module produced no response".to_string())
        })?;
    let result: HarnessResult = serde_json::from_str(result_line)
        .map_err(|e| IsolateError::Invocation(format!("malformed response: {}", e)))?;
    Ok(IsolateResponse {
        status: result.status,
        content_type: result.content_type,
        body: result.body,
    })
}
