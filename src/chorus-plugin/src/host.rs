//! Exec-based plugin host speaking the JSON line protocol over stdio.

use crate::host_services::HostServices;
use crate::protocol::{
    HostCall, HostCallReply, HostReply, PluginError, PluginInfo, PluginMessage, PluginMethod,
    PluginRequest, PluginResult, PROTOCOL_VERSION,
};
use crate::sandbox::{self, SandboxError, SandboxPolicy};
use chorus_core::config::HostCapability;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum PluginHostError {
    #[error("failed to spawn plugin process: {0}")]
    SpawnFailed(std::io::Error),
    #[error("failed to confine plugin process: {0}")]
    Sandbox(#[from] SandboxError),
    #[error("plugin process has no stdin")]
    NoStdin,
    #[error("plugin process has no stdout")]
    NoStdout,
    #[error("failed to write to plugin: {0}")]
    WriteError(std::io::Error),
    #[error("failed to read from plugin: {0}")]
    ReadError(std::io::Error),
    #[error("failed to parse plugin message: {0}")]
    ParseError(serde_json::Error),
    #[error("{}", .0.message)]
    PluginError(PluginError),
    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    ProtocolMismatch { expected: u32, actual: u32 },
    #[error("unexpected response to {method}")]
    UnexpectedResponse { method: &'static str },
    #[error("request/response ID mismatch: sent {sent}, received {received}")]
    IdMismatch { sent: u64, received: u64 },
    #[error("plugin request task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("plugin process terminated unexpectedly")]
    ProcessTerminated,
}

/// How to launch one plugin process.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// Id used to tag log output; the registry id, not the plugin's own.
    pub plugin_id: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Private working directory.
    pub working_dir: PathBuf,
    /// The complete environment; nothing is inherited from the host.
    pub env: Vec<(String, String)>,
    /// OS-level confinement; `None` runs the plugin unconfined.
    pub sandbox: Option<SandboxPolicy>,
}

struct Channel {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

struct Shared {
    plugin_id: String,
    channel: Mutex<Channel>,
    services: Arc<HostServices>,
    /// Set once the handshake has told us what the plugin asked for.
    granted: OnceLock<HashSet<HostCapability>>,
}

/// A running plugin process.
///
/// Requests are serialized: the channel lock is held from writing a request
/// until its final response is read, host calls included. Each exchange
/// runs on its own task, so a caller that gives up early never leaves a
/// half-read reply behind for the next request.
pub struct ExecPluginHost {
    shared: Arc<Shared>,
}

impl ExecPluginHost {
    /// Spawn the process and perform the `Initialize` handshake.
    pub async fn start(
        config: PluginConfig,
        services: Arc<HostServices>,
    ) -> Result<(Self, PluginInfo), PluginHostError> {
        let mut cmd = Command::new(&config.program);
        cmd.args(&config.args)
            .current_dir(&config.working_dir)
            .env_clear()
            .envs(config.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let confined = match &config.sandbox {
            Some(policy) => sandbox::confine(&mut cmd, policy)?,
            None => false,
        };
        if config.sandbox.is_some() && !confined {
            tracing::warn!(
                plugin_id = %config.plugin_id,
                "Plugin sandboxing is unavailable on this platform; running unconfined"
            );
        }

        let mut child = cmd.spawn().map_err(PluginHostError::SpawnFailed)?;
        let stdin = child.stdin.take().ok_or(PluginHostError::NoStdin)?;
        let stdout = child.stdout.take().ok_or(PluginHostError::NoStdout)?;

        if let Some(stderr) = child.stderr.take() {
            let plugin_id = config.plugin_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(plugin_id = %plugin_id, "{line}");
                }
            });
        }

        let shared = Arc::new(Shared {
            plugin_id: config.plugin_id,
            channel: Mutex::new(Channel {
                child,
                stdin,
                stdout: BufReader::new(stdout).lines(),
                next_id: 1,
            }),
            services: services.clone(),
            granted: OnceLock::new(),
        });

        // Run inline: if the caller times the handshake out, dropping this
        // future drops the only handle and the child is killed.
        let info = match shared.exchange(PluginMethod::Initialize).await? {
            PluginResult::Initialized(info) => info,
            _ => {
                return Err(PluginHostError::UnexpectedResponse {
                    method: "Initialize",
                })
            }
        };
        if info.protocol_version != PROTOCOL_VERSION {
            return Err(PluginHostError::ProtocolMismatch {
                expected: PROTOCOL_VERSION,
                actual: info.protocol_version,
            });
        }

        let granted = services.grant(&info.host_capabilities);
        tracing::info!(
            plugin_id = %shared.plugin_id,
            plugin_name = %info.name,
            plugin_version = %info.version,
            capabilities = ?info.capabilities,
            granted = ?granted,
            confined,
            "Plugin initialized"
        );
        let _ = shared.granted.set(granted);
        Ok((Self { shared }, info))
    }

    pub fn plugin_id(&self) -> &str {
        &self.shared.plugin_id
    }

    pub fn granted(&self) -> HashSet<HostCapability> {
        self.shared.granted.get().cloned().unwrap_or_default()
    }

    /// Send one request, servicing host calls until the response arrives.
    pub async fn send_request(&self, method: PluginMethod) -> Result<PluginResult, PluginHostError> {
        let shared = self.shared.clone();
        tokio::spawn(async move { shared.exchange(method).await }).await?
    }

    /// Ask the plugin to exit, then make sure it has.
    pub async fn shutdown(&self) {
        if let Err(err) = self.send_request(PluginMethod::Shutdown).await {
            tracing::debug!(plugin_id = %self.plugin_id(), error = %err, "Shutdown request failed");
        }
        let mut channel = self.shared.channel.lock().await;
        if let Err(err) = channel.child.kill().await {
            tracing::debug!(plugin_id = %self.plugin_id(), error = %err, "Plugin already exited");
        }
    }
}

impl Shared {
    async fn exchange(&self, method: PluginMethod) -> Result<PluginResult, PluginHostError> {
        let mut channel = self.channel.lock().await;
        let id = channel.next_id;
        channel.next_id += 1;
        write_line(&mut channel.stdin, &PluginRequest { id, method }).await?;

        let no_grants = HashSet::new();
        let granted = self.granted.get().unwrap_or(&no_grants);
        loop {
            let line = channel
                .stdout
                .next_line()
                .await
                .map_err(PluginHostError::ReadError)?
                .ok_or(PluginHostError::ProcessTerminated)?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<PluginMessage>(&line).map_err(PluginHostError::ParseError)? {
                PluginMessage::HostCall(request) => {
                    let reply = match serde_json::from_value::<HostCall>(request.call) {
                        Ok(call) => self.services.handle(call, granted).await,
                        Err(err) => HostReply::Failed {
                            message: format!("malformed host call: {err}"),
                        },
                    };
                    if let HostReply::Denied { message } = &reply {
                        tracing::warn!(plugin_id = %self.plugin_id, %message, "Denied host call");
                    }
                    let reply = HostCallReply {
                        host_call: request.host_call,
                        reply,
                    };
                    write_line(&mut channel.stdin, &reply).await?;
                }
                PluginMessage::Response(response) if response.id < id => {
                    tracing::debug!(
                        plugin_id = %self.plugin_id,
                        stale_id = response.id,
                        expected_id = id,
                        "Discarding stale plugin response"
                    );
                }
                PluginMessage::Response(response) => {
                    if response.id != id {
                        return Err(PluginHostError::IdMismatch {
                            sent: id,
                            received: response.id,
                        });
                    }
                    return match response.result {
                        PluginResult::Error(err) => Err(PluginHostError::PluginError(err)),
                        result => Ok(result),
                    };
                }
            }
        }
    }
}

async fn write_line<T: Serialize>(stdin: &mut ChildStdin, message: &T) -> Result<(), PluginHostError> {
    let mut json = serde_json::to_string(message).map_err(PluginHostError::ParseError)?;
    json.push('\n');
    stdin
        .write_all(json.as_bytes())
        .await
        .map_err(PluginHostError::WriteError)?;
    stdin.flush().await.map_err(PluginHostError::WriteError)
}
