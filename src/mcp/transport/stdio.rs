use super::{ConnectionSetupError, McpTransport, TransportError};
use crate::core::config::data::ToolServerConfig;
use crate::mcp::protocol::{client_details, parse_initialize_result};
use async_trait::async_trait;
use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
    ServerMessage,
};
use rust_mcp_schema::{InitializeResult, RequestId, RpcError};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{oneshot, Mutex, Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Variable the GitHub MCP server reads its token from.
pub const CHILD_TOKEN_ENV: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";
/// Variable the GitHub MCP server reads its enterprise host from.
pub const CHILD_HOST_ENV: &str = "GH_HOST";

const STDIN_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const STDIN_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_GRACE: Duration = Duration::from_secs(5);

type PendingMap = Arc<Mutex<HashMap<RequestId, oneshot::Sender<ServerMessage>>>>;

/// Everything needed to start one tool-server child.
///
/// Environment values are only ever handed to the child; `Debug` prints the
/// variable names and hides the values.
#[derive(Clone)]
pub struct ServerLaunch {
    pub(crate) command: String,
    pub(crate) args: Vec<String>,
    pub(crate) env: HashMap<String, String>,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) protocol_version: Option<String>,
}

impl ServerLaunch {
    /// Resolves the launch from config, failing before anything is spawned
    /// when the access token is missing.
    pub fn resolve<F>(config: &ToolServerConfig, lookup: F) -> Result<Self, ConnectionSetupError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup(&config.token_env)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ConnectionSetupError::MissingEnvironment(config.token_env.clone()))?;

        let host = config.host.trim();
        if host.is_empty() {
            return Err(ConnectionSetupError::MissingHost);
        }

        let command = config.command.trim();
        if command.is_empty() {
            return Err(ConnectionSetupError::MissingCommand);
        }

        let mut env = config.env.clone();
        env.insert(CHILD_TOKEN_ENV.to_string(), token);
        env.insert(CHILD_HOST_ENV.to_string(), host.to_string());

        Ok(Self {
            command: command.to_string(),
            args: config.args.clone(),
            env,
            request_timeout: (config.request_timeout_secs > 0)
                .then(|| Duration::from_secs(config.request_timeout_secs)),
            protocol_version: config.protocol_version.clone(),
        })
    }
}

impl fmt::Debug for ServerLaunch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut env_keys: Vec<&str> = self.env.keys().map(String::as_str).collect();
        env_keys.sort_unstable();
        f.debug_struct("ServerLaunch")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env_keys", &env_keys)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Newline-delimited JSON-RPC client over a child process's stdio.
pub struct StdioClient {
    stdin: Arc<Mutex<ChildStdin>>,
    pending: PendingMap,
    next_request_id: AtomicI64,
    request_timeout: Option<Duration>,
    protocol_version: Option<String>,
    activity_notify: Arc<Notify>,
    shutdown: CancellationToken,
    exited: CancellationToken,
    server_details: RwLock<Option<InitializeResult>>,
}

impl StdioClient {
    pub async fn spawn(launch: &ServerLaunch) -> Result<Arc<Self>, ConnectionSetupError> {
        debug!(command = %launch.command, args = ?launch.args, "Starting MCP stdio server");
        let mut cmd = Command::new(&launch.command);
        cmd.args(&launch.args)
            .envs(&launch.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let spawn_error = |source: std::io::Error| ConnectionSetupError::Spawn {
            command: launch.command.clone(),
            source,
        };
        let missing_pipe = |name: &str| {
            spawn_error(std::io::Error::other(format!("Unable to retrieve {name}.")))
        };

        let mut child = cmd.spawn().map_err(spawn_error)?;
        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let client = Arc::new(Self {
            stdin: Arc::new(Mutex::new(stdin)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_request_id: AtomicI64::new(0),
            request_timeout: launch.request_timeout,
            protocol_version: launch.protocol_version.clone(),
            activity_notify: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
            exited: CancellationToken::new(),
            server_details: RwLock::new(None),
        });

        client.spawn_stdout_reader(stdout);
        Self::spawn_stderr_drain(stderr, client.shutdown.clone());

        let pending = client.pending.clone();
        let shutdown = client.shutdown.clone();
        let exited = client.exited.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    debug!(status = ?status.ok(), "MCP stdio server exited");
                }
                _ = shutdown.cancelled() => {
                    let _ = child.kill().await;
                    debug!("MCP stdio server stopped");
                }
            }
            exited.cancel();
            pending.lock().await.clear();
        });

        Ok(client)
    }

    /// Runs the MCP `initialize` exchange and announces readiness.
    pub async fn initialize(&self) -> Result<InitializeResult, ConnectionSetupError> {
        let details = client_details(self.protocol_version.as_deref());
        let response = self
            .send_request(RequestFromClient::InitializeRequest(details))
            .await
            .map_err(ConnectionSetupError::Handshake)?;
        let result = parse_initialize_result(response).map_err(ConnectionSetupError::Handshake)?;
        debug!(
            server = %result.server_info.name,
            protocol_version = %result.protocol_version,
            "MCP server initialized"
        );
        *self.server_details.write().await = Some(result.clone());
        self.send_notification(NotificationFromClient::InitializedNotification(None))
            .await
            .map_err(ConnectionSetupError::Handshake)?;
        Ok(result)
    }

    pub async fn server_details(&self) -> Option<InitializeResult> {
        self.server_details.read().await.clone()
    }

    fn spawn_stdout_reader(self: &Arc<Self>, stdout: tokio::process::ChildStdout) {
        let pending = self.pending.clone();
        let stdin = self.stdin.clone();
        let activity_notify = self.activity_notify.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            loop {
                let line = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    line = reader.next_line() => line,
                };
                let Ok(Some(line)) = line else {
                    break;
                };
                let value = match serde_json::from_str::<serde_json::Value>(&line) {
                    Ok(value) => value,
                    Err(_) => continue,
                };
                let items = match value {
                    serde_json::Value::Array(items) => items,
                    other => vec![other],
                };
                for item in items {
                    if let Ok(message) = serde_json::from_value::<ServerMessage>(item) {
                        Self::dispatch_message(&pending, &stdin, &activity_notify, message).await;
                    }
                }
            }
            debug!("MCP stdio reader finished");
        });
    }

    fn spawn_stderr_drain(stderr: tokio::process::ChildStderr, shutdown: CancellationToken) {
        // stderr may echo credentials; it is read and discarded.
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    line = reader.next_line() => {
                        if !matches!(line, Ok(Some(_))) {
                            break;
                        }
                    }
                }
            }
        });
    }

    async fn dispatch_message(
        pending: &PendingMap,
        stdin: &Mutex<ChildStdin>,
        activity_notify: &Notify,
        message: ServerMessage,
    ) {
        match &message {
            ServerMessage::Response(response) => {
                debug!(response_id = ?response.id, "Received MCP stdio response");
                if let Some(tx) = pending.lock().await.remove(&response.id) {
                    let _ = tx.send(message);
                }
            }
            ServerMessage::Error(error) => {
                debug!(
                    error_id = ?error.id,
                    error_code = error.error.code,
                    "Received MCP stdio error"
                );
                if let Some(id) = error.id.as_ref() {
                    if let Some(tx) = pending.lock().await.remove(id) {
                        let _ = tx.send(message);
                    }
                }
            }
            ServerMessage::Request(request) => {
                debug!(method = %request.method(), "Declining MCP server request");
                activity_notify.notify_waiters();
                let reply = ClientMessage::from_message(
                    MessageFromClient::Error(
                        RpcError::method_not_found()
                            .with_message("This client does not handle server requests."),
                    ),
                    Some(request.request_id().clone()),
                );
                if let Ok(reply) = reply {
                    if let Err(err) = write_line(stdin, &reply).await {
                        debug!(error = %err, "Failed to decline MCP server request");
                    }
                }
            }
            ServerMessage::Notification(_) => {
                debug!("Received MCP stdio notification");
                activity_notify.notify_waiters();
            }
        }
    }

    fn next_request_id(&self) -> RequestId {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        RequestId::Integer(id)
    }

    async fn send_notification(
        &self,
        notification: NotificationFromClient,
    ) -> Result<(), TransportError> {
        if self.exited.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let message = ClientMessage::from_message(
            MessageFromClient::NotificationFromClient(notification),
            None,
        )
        .map_err(|err| TransportError::Protocol(err.to_string()))?;
        write_line(&self.stdin, &message).await
    }

    async fn await_response(
        &self,
        request_id: &RequestId,
        mut rx: oneshot::Receiver<ServerMessage>,
    ) -> Result<ServerMessage, TransportError> {
        let mut deadline = self
            .request_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);
        loop {
            let expiry = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                biased;
                result = &mut rx => {
                    return result.map_err(|_| {
                        debug!(request_id = ?request_id, "MCP stdio response channel closed");
                        if self.exited.is_cancelled() {
                            TransportError::Closed
                        } else {
                            TransportError::ChannelClosed
                        }
                    });
                }
                _ = self.exited.cancelled() => {
                    debug!(request_id = ?request_id, "MCP stdio server exited while awaiting response");
                    return Err(TransportError::Closed);
                }
                _ = self.activity_notify.notified() => {
                    deadline = self
                        .request_timeout
                        .map(|timeout| tokio::time::Instant::now() + timeout);
                    debug!(request_id = ?request_id, "MCP stdio timeout reset after server activity");
                }
                _ = expiry => {
                    self.pending.lock().await.remove(request_id);
                    let timeout = self.request_timeout.unwrap_or_default();
                    debug!(
                        request_id = ?request_id,
                        timeout_secs = timeout.as_secs(),
                        "MCP stdio request timed out"
                    );
                    return Err(TransportError::Timeout(timeout));
                }
            }
        }
    }
}

#[async_trait]
impl McpTransport for StdioClient {
    async fn send_request(&self, request: RequestFromClient) -> Result<ServerMessage, TransportError> {
        if self.exited.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let request_id = self.next_request_id();
        debug!(request_id = ?request_id, "Sending MCP stdio request");
        let message = ClientMessage::from_message(
            MessageFromClient::RequestFromClient(request),
            Some(request_id.clone()),
        )
        .map_err(|err| TransportError::Protocol(err.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), tx);

        if let Err(err) = write_line(&self.stdin, &message).await {
            self.pending.lock().await.remove(&request_id);
            return Err(if self.exited.is_cancelled() {
                TransportError::Closed
            } else {
                err
            });
        }

        self.await_response(&request_id, rx).await
    }

    async fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        debug!("Closing MCP stdio connection");
        self.shutdown.cancel();
        let _ = tokio::time::timeout(CLOSE_GRACE, self.exited.cancelled()).await;
    }
}

impl Drop for StdioClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn write_line(stdin: &Mutex<ChildStdin>, message: &ClientMessage) -> Result<(), TransportError> {
    let payload =
        serde_json::to_string(message).map_err(|err| TransportError::Protocol(err.to_string()))?;
    let mut stdin = tokio::time::timeout(STDIN_LOCK_TIMEOUT, stdin.lock())
        .await
        .map_err(|_| TransportError::Io("Timed out waiting for MCP stdio stdin lock.".to_string()))?;
    let timed_out = |_| TransportError::Io("Timed out writing MCP stdio message.".to_string());
    let io_error = |err: std::io::Error| TransportError::Io(err.to_string());

    tokio::time::timeout(STDIN_WRITE_TIMEOUT, stdin.write_all(payload.as_bytes()))
        .await
        .map_err(timed_out)?
        .map_err(io_error)?;
    tokio::time::timeout(STDIN_WRITE_TIMEOUT, stdin.write_all(b"\n"))
        .await
        .map_err(timed_out)?
        .map_err(io_error)?;
    tokio::time::timeout(STDIN_WRITE_TIMEOUT, stdin.flush())
        .await
        .map_err(timed_out)?
        .map_err(io_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::parse_list_tools;

    fn sample_config() -> ToolServerConfig {
        ToolServerConfig {
            command: "npx".to_string(),
            args: vec!["-y".to_string(), "@modelcontextprotocol/server-github".to_string()],
            host: "github.example.com".to_string(),
            token_env: "GITHUB_ACCESS_TOKEN".to_string(),
            env: HashMap::new(),
            request_timeout_secs: 60,
            protocol_version: None,
        }
    }

    fn shell_launch(script: &str) -> ServerLaunch {
        ServerLaunch {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: HashMap::new(),
            request_timeout: Some(Duration::from_secs(10)),
            protocol_version: None,
        }
    }

    #[test]
    fn resolve_requires_token_before_spawning() {
        let err = ServerLaunch::resolve(&sample_config(), |_| None).expect_err("missing token");
        match err {
            ConnectionSetupError::MissingEnvironment(name) => {
                assert_eq!(name, "GITHUB_ACCESS_TOKEN")
            }
            other => panic!("unexpected error: {other}"),
        }

        let blank = ServerLaunch::resolve(&sample_config(), |_| Some("  ".to_string()));
        assert!(matches!(
            blank,
            Err(ConnectionSetupError::MissingEnvironment(_))
        ));
    }

    #[test]
    fn resolve_injects_token_and_host_for_child_only() {
        let launch = ServerLaunch::resolve(&sample_config(), |name| {
            (name == "GITHUB_ACCESS_TOKEN").then(|| "ghp_secret".to_string())
        })
        .expect("launch");

        assert_eq!(launch.env.get(CHILD_TOKEN_ENV).map(String::as_str), Some("ghp_secret"));
        assert_eq!(
            launch.env.get(CHILD_HOST_ENV).map(String::as_str),
            Some("github.example.com")
        );
        assert_eq!(launch.request_timeout, Some(Duration::from_secs(60)));

        let debug = format!("{launch:?}");
        assert!(!debug.contains("ghp_secret"));
        assert!(debug.contains(CHILD_TOKEN_ENV));
    }

    #[test]
    fn resolve_rejects_blank_host() {
        let mut config = sample_config();
        config.host = "   ".to_string();

        let err = ServerLaunch::resolve(&config, |_| Some("token".to_string()))
            .expect_err("blank host");

        assert!(matches!(err, ConnectionSetupError::MissingHost));
        assert!(err.to_string().contains("tool_server.host"));
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let mut config = sample_config();
        config.request_timeout_secs = 0;
        let launch =
            ServerLaunch::resolve(&config, |_| Some("token".to_string())).expect("launch");
        assert_eq!(launch.request_timeout, None);
    }

    #[tokio::test]
    async fn spawn_reports_missing_command() {
        let mut launch = shell_launch("");
        launch.command = "/definitely-missing-command".to_string();
        let err = StdioClient::spawn(&launch).await.err().expect("spawn should fail");
        assert!(matches!(err, ConnectionSetupError::Spawn { .. }));
    }

    #[tokio::test]
    async fn responses_are_correlated_by_request_id() {
        let script = r#"read line; echo '{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info","data":"hi"}}'; echo '{"jsonrpc":"2.0","id":0,"result":{"tools":[{"name":"get_me","inputSchema":{"type":"object","properties":{},"required":[]},"icons":[]}]}}'; read line"#;
        let client = StdioClient::spawn(&shell_launch(script))
            .await
            .expect("spawn");

        let response = client
            .send_request(RequestFromClient::ListToolsRequest(None))
            .await
            .expect("response");
        let list = parse_list_tools(response).expect("tool list");
        assert_eq!(list.tools.len(), 1);
        assert_eq!(list.tools[0].name, "get_me");

        client.close().await;
        let after_close = client
            .send_request(RequestFromClient::ListToolsRequest(None))
            .await;
        assert_eq!(after_close.err(), Some(TransportError::Closed));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let mut launch = shell_launch("read line; read line");
        launch.request_timeout = Some(Duration::from_secs(1));
        let client = StdioClient::spawn(&launch).await.expect("spawn");

        let result = client
            .send_request(RequestFromClient::ListToolsRequest(None))
            .await;

        assert_eq!(result.err(), Some(TransportError::Timeout(Duration::from_secs(1))));
        client.close().await;
    }

    #[tokio::test]
    async fn initialize_records_server_details() {
        let script = r#"read line; echo '{"jsonrpc":"2.0","id":0,"result":{"protocolVersion":"2025-06-18","capabilities":{},"serverInfo":{"name":"github-mcp-server","version":"1.2.0"}}}'; read line; read line"#;
        let client = StdioClient::spawn(&shell_launch(script)).await.expect("spawn");
        assert!(client.server_details().await.is_none());

        let result = client.initialize().await.expect("initialize");
        assert_eq!(result.server_info.name, "github-mcp-server");

        let details = client.server_details().await.expect("details");
        assert_eq!(details.server_info.version, "1.2.0");
        client.close().await;
    }

    #[tokio::test]
    async fn exited_server_fails_requests() {
        let client = StdioClient::spawn(&shell_launch("exit 0"))
            .await
            .expect("spawn");
        let result = client
            .send_request(RequestFromClient::ListToolsRequest(None))
            .await;
        assert!(result.is_err());
        client.close().await;
    }
}
