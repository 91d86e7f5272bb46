// SPDX-License-Identifier: MIT

//! The task registry collaborator (§6): given a service/script task's node
//! id and the current variables in scope, run the task and return the
//! variables it produced. BPMN user/receive tasks never reach this registry
//! — they are asynchronous wait states completed externally.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use wfe_core::{TaskExecutionError, TaskTimeoutError, VariableValue};

#[async_trait]
pub trait TaskRegistry: Send + Sync {
    /// Invoke the handler registered for `node_id`, or fail with
    /// [`TaskExecutionError`] if none is registered. `timeout` bounds
    /// execution per `process.script_timeout` (§5); a handler that overruns
    /// it fails with [`TaskTimeoutError`] instead.
    async fn invoke(
        &self,
        node_id: &str,
        variables: &HashMap<String, VariableValue>,
        timeout: Duration,
    ) -> Result<HashMap<String, VariableValue>, TaskRegistryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TaskRegistryError {
    #[error(transparent)]
    Timeout(#[from] TaskTimeoutError),
    #[error(transparent)]
    Execution(#[from] TaskExecutionError),
}

/// Loads task handlers from a plugin directory: each entry is an executable
/// script named after the node id it implements (`<plugin_dir>/<node_id>`),
/// invoked with the current variables as a JSON object on stdin and expected
/// to print the output variables as a JSON object on stdout. This mirrors
/// the registry-as-external-process shape described in §6 without requiring
/// an in-process plugin ABI.
pub struct PluginTaskRegistry {
    plugin_dir: PathBuf,
}

impl PluginTaskRegistry {
    pub fn new(plugin_dir: impl Into<PathBuf>) -> Self {
        Self { plugin_dir: plugin_dir.into() }
    }

    fn handler_path(&self, node_id: &str) -> PathBuf {
        self.plugin_dir.join(node_id)
    }

    async fn run(
        &self,
        path: &Path,
        node_id: &str,
        variables: &HashMap<String, VariableValue>,
        timeout: Duration,
    ) -> Result<HashMap<String, VariableValue>, TaskRegistryError> {
        use std::process::Stdio;
        use tokio::io::AsyncWriteExt;

        let input: HashMap<String, serde_json::Value> =
            variables.iter().map(|(k, v)| (k.clone(), v.to_native_json())).collect();
        let payload = serde_json::to_vec(&input).unwrap_or_default();

        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TaskExecutionError { node_id: node_id.to_string(), message: e.to_string() })?;

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(&payload).await;
        }

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| TaskTimeoutError { node_id: node_id.to_string(), timeout_ms: timeout.as_millis() as u64 })?
            .map_err(|e| TaskExecutionError { node_id: node_id.to_string(), message: e.to_string() })?;

        if !output.status.success() {
            return Err(TaskExecutionError {
                node_id: node_id.to_string(),
                message: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                ),
            }
            .into());
        }

        let raw: HashMap<String, wfe_core::RawVariable> =
            serde_json::from_slice(&output.stdout).map_err(|e| TaskExecutionError {
                node_id: node_id.to_string(),
                message: format!("malformed output variables: {e}"),
            })?;
        wfe_core::decode_variables(raw)
            .map_err(|e| TaskExecutionError { node_id: node_id.to_string(), message: e.to_string() }.into())
    }
}

#[async_trait]
impl TaskRegistry for PluginTaskRegistry {
    async fn invoke(
        &self,
        node_id: &str,
        variables: &HashMap<String, VariableValue>,
        timeout: Duration,
    ) -> Result<HashMap<String, VariableValue>, TaskRegistryError> {
        let path = self.handler_path(node_id);
        if !path.exists() {
            return Err(TaskExecutionError {
                node_id: node_id.to_string(),
                message: format!("no plugin registered at {}", path.display()),
            }
            .into());
        }
        self.run(&path, node_id, variables, timeout).await
    }
}

/// An in-memory registry of closures, used in tests and by the CLI's
/// offline scenarios in place of a plugin directory.
#[derive(Default)]
pub struct FnTaskRegistry {
    handlers: HashMap<
        String,
        Box<
            dyn Fn(&HashMap<String, VariableValue>) -> Result<HashMap<String, VariableValue>, String>
                + Send
                + Sync,
        >,
    >,
}

impl FnTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(
        mut self,
        node_id: impl Into<String>,
        handler: impl Fn(&HashMap<String, VariableValue>) -> Result<HashMap<String, VariableValue>, String>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.handlers.insert(node_id.into(), Box::new(handler));
        self
    }
}

#[async_trait]
impl TaskRegistry for FnTaskRegistry {
    async fn invoke(
        &self,
        node_id: &str,
        variables: &HashMap<String, VariableValue>,
        _timeout: Duration,
    ) -> Result<HashMap<String, VariableValue>, TaskRegistryError> {
        let handler = self.handlers.get(node_id).ok_or_else(|| TaskExecutionError {
            node_id: node_id.to_string(),
            message: "no handler registered".to_string(),
        })?;
        handler(variables).map_err(|message| TaskExecutionError { node_id: node_id.to_string(), message }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_registry_invokes_registered_handler() {
        let registry = FnTaskRegistry::new().with_handler("Task_1", |vars| {
            let n = match vars.get("n") {
                Some(VariableValue::Integer(n)) => *n,
                _ => 0,
            };
            let mut out = HashMap::new();
            out.insert("doubled".to_string(), VariableValue::Integer(n * 2));
            Ok(out)
        });

        let mut vars = HashMap::new();
        vars.insert("n".to_string(), VariableValue::Integer(21));
        let out = registry.invoke("Task_1", &vars, Duration::from_secs(1)).await.unwrap();
        assert_eq!(out.get("doubled"), Some(&VariableValue::Integer(42)));
    }

    #[tokio::test]
    async fn fn_registry_reports_unregistered_node() {
        let registry = FnTaskRegistry::new();
        let err = registry.invoke("Task_missing", &HashMap::new(), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, TaskRegistryError::Execution(_)));
    }
}
