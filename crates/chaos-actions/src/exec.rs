//! Remote command execution inside target pods
//!
//! Commands run through the pods/exec subresource. Output is captured in full
//! and the session's final status decides success. Every call races against
//! a deadline and the worker's cancellation token, so a hung command cannot
//! pin a worker past shutdown.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::AttachParams;
use kube::{Api, Client};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::error::ActionError;
use crate::target::ResolvedTarget;

/// Captured output of a finished command
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output, trimmed
    pub stdout: String,
    /// Standard error, trimmed
    pub stderr: String,
}

/// Streams a command into a pod and waits for it to finish
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` in `target`
    ///
    /// Returns [`ActionError::Exec`] with captured stderr when the command
    /// exits unsuccessfully, [`ActionError::TimedOut`] after `timeout`, and
    /// [`ActionError::Cancelled`] once `cancel` fires.
    async fn exec(
        &self,
        target: &ResolvedTarget,
        command: &[String],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput, ActionError>;
}

/// Wrap a shell snippet as an argv for `sh -c`
pub fn shell(script: impl Into<String>) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.into()]
}

/// [`RemoteExecutor`] backed by the pods/exec subresource
pub struct KubeExecutor {
    client: Client,
}

impl KubeExecutor {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn run(&self, target: &ResolvedTarget, command: &[String]) -> Result<ExecOutput, ActionError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &target.namespace);
        let mut params = AttachParams::default().stdin(false).stdout(true).stderr(true);
        if let Some(container) = &target.container {
            params = params.container(container.clone());
        }

        let mut attached = pods.exec(&target.name, command.to_vec(), &params).await?;

        let stdout = attached.stdout();
        let stderr = attached.stderr();
        let status = attached.take_status();

        let (stdout, stderr) = tokio::join!(read_all(stdout), read_all(stderr));
        let status = match status {
            Some(status) => status.await,
            None => None,
        };

        let output = ExecOutput { stdout, stderr };
        match status {
            Some(s) if s.status.as_deref() == Some("Success") => Ok(output),
            Some(s) => Err(ActionError::Exec {
                message: s
                    .message
                    .or(s.reason)
                    .unwrap_or_else(|| "command exited with failure".to_string()),
                stderr: output.stderr,
            }),
            None => Err(ActionError::Exec {
                message: "exec session ended without a status".to_string(),
                stderr: output.stderr,
            }),
        }
    }
}

#[async_trait]
impl RemoteExecutor for KubeExecutor {
    async fn exec(
        &self,
        target: &ResolvedTarget,
        command: &[String],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput, ActionError> {
        debug!(
            pod = %target.name,
            namespace = %target.namespace,
            command = ?command,
            "Executing remote command"
        );

        tokio::select! {
            _ = cancel.cancelled() => Err(ActionError::Cancelled),
            result = tokio::time::timeout(timeout, self.run(target, command)) => {
                result.unwrap_or(Err(ActionError::TimedOut(timeout)))
            }
        }
    }
}

async fn read_all(reader: Option<impl AsyncRead + Unpin>) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut buf = Vec::new();
    // A broken stream still leaves whatever was read before the error
    let _ = reader.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).trim().to_string()
}
