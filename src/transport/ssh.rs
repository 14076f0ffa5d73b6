//! SSH transport built on russh.
//!
//! One [`SshTransport`] serves one host. The session is opened lazily on the
//! first dispatched command and reused for every command after it, so a run
//! over N commands costs one TCP handshake and one SSH key exchange per host.
//!
//! Authentication tries, in order: explicit client keys from the inventory,
//! password, and finally the default `~/.ssh` identities when the inventory
//! configured neither. Host keys are accepted without verification; the
//! fingerprint is logged at `warn` so unexpected peers remain visible.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::Handle;
use russh::ChannelMsg;
use russh_keys::key::PublicKey;
use russh_keys::load_secret_key;
use tracing::{debug, warn};

use crate::command::{Command, CommandKind, Elevation};
use crate::inventory::{Authentication, ConnectionParams, InventoryItem, SessionOptions};
use crate::response::Response;
use crate::transport::{
    group_filtered, sftp, Transport, TransportError, TransportFactory, TransportResult,
};

// ============================================================================
// Client Handler
// ============================================================================

/// russh event handler for the client side of the session.
pub(crate) struct ClientHandler {
    host: String,
}

#[async_trait]
impl russh::client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        warn!(
            host = %self.host,
            fingerprint = %server_public_key.fingerprint(),
            "host key not verified, accepting"
        );
        Ok(true)
    }
}

// ============================================================================
// Command Assembly
// ============================================================================

/// Wraps a string in single quotes for the remote shell.
fn escape_shell_arg(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Builds the string actually handed to the remote shell: environment
/// exports first, then the command wrapped in its elevation prefix.
fn effective_command(
    command: &str,
    elevation: Elevation,
    auth: &Authentication,
    session: &SessionOptions,
) -> TransportResult<String> {
    let mut parts: Vec<String> = Vec::new();

    for (key, value) in &session.env {
        let escaped = value.replace('\'', "'\\''");
        parts.push(format!("export {}='{}'; ", key, escaped));
    }

    match elevation {
        Elevation::None => parts.push(command.to_string()),
        Elevation::Sudo => {
            let user_flag = auth
                .sudo_user
                .as_deref()
                .map(|user| format!("-u {} ", user))
                .unwrap_or_default();
            match auth.sudo_password.as_deref() {
                Some(password) => parts.push(format!(
                    "echo {} | sudo -S {}{}",
                    escape_shell_arg(password),
                    user_flag,
                    command
                )),
                None => parts.push(format!("sudo {}{}", user_flag, command)),
            }
        }
        Elevation::Su => {
            let user = auth.su_user.as_deref().ok_or_else(|| {
                TransportError::Unsupported("su elevation requires su_user".to_string())
            })?;
            parts.push(format!("su {} -c {}", user, escape_shell_arg(command)));
        }
    }

    Ok(parts.concat())
}

// ============================================================================
// SSH Transport
// ============================================================================

/// Output captured from one remote execution.
struct ExecOutcome {
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
}

/// SSH/SFTP transport for a single host.
pub struct SshTransport {
    host: String,
    connect_timeout: Duration,
    command_timeout: Option<Duration>,
    session: Option<Handle<ClientHandler>>,
}

impl SshTransport {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            connect_timeout: Duration::from_secs(30),
            command_timeout: None,
            session: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Opens the session if no command has needed it yet.
    async fn ensure_connected(&mut self, params: &ConnectionParams) -> TransportResult<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let address = format!("{}:{}", params.host, params.port);
        debug!(host = %self.host, address = %address, "opening ssh session");

        let socket = tokio::time::timeout(
            self.connect_timeout,
            tokio::net::TcpStream::connect(&address),
        )
        .await
        .map_err(|_| TransportError::Timeout {
            seconds: self.connect_timeout.as_secs(),
        })?
        .map_err(|e| {
            TransportError::connection_failed(&params.host, format!("connect {}: {}", address, e))
        })?;

        socket.set_nodelay(true).map_err(|e| {
            TransportError::connection_failed(&params.host, format!("set nodelay: {}", e))
        })?;

        let config = Arc::new(russh::client::Config::default());
        let handler = ClientHandler {
            host: params.host.clone(),
        };
        let mut session = russh::client::connect_stream(config, socket, handler)
            .await
            .map_err(|e| {
                TransportError::connection_failed(&params.host, format!("handshake: {}", e))
            })?;

        self.authenticate(&mut session, params).await?;
        self.session = Some(session);
        Ok(())
    }

    /// Runs the authentication chain until one method succeeds.
    async fn authenticate(
        &self,
        session: &mut Handle<ClientHandler>,
        params: &ConnectionParams,
    ) -> TransportResult<()> {
        let user = params
            .username
            .clone()
            .unwrap_or_else(|| std::env::var("USER").unwrap_or_else(|_| "root".to_string()));

        for key_path in &params.client_keys {
            match Self::try_key(session, &user, key_path, params.passphrase.as_deref()).await {
                Ok(()) => {
                    debug!(host = %self.host, user = %user, key = %key_path.display(),
                           "authenticated with client key");
                    return Ok(());
                }
                Err(e) => {
                    debug!(host = %self.host, key = %key_path.display(), error = %e,
                           "client key rejected");
                }
            }
        }

        if let Some(password) = &params.password {
            match session.authenticate_password(&user, password).await {
                Ok(true) => {
                    debug!(host = %self.host, user = %user, "authenticated with password");
                    return Ok(());
                }
                Ok(false) => {
                    debug!(host = %self.host, user = %user, "password rejected");
                }
                Err(e) => {
                    debug!(host = %self.host, error = %e, "password authentication failed");
                }
            }
        }

        // Fall back to the usual identity files only when the inventory
        // configured no credentials at all.
        if params.client_keys.is_empty() && params.password.is_none() {
            for key_path in default_identity_files() {
                if Self::try_key(session, &user, &key_path, None).await.is_ok() {
                    debug!(host = %self.host, user = %user, key = %key_path.display(),
                           "authenticated with default identity");
                    return Ok(());
                }
            }
        }

        Err(TransportError::AuthenticationFailed {
            user,
            host: params.host.clone(),
        })
    }

    async fn try_key(
        session: &mut Handle<ClientHandler>,
        user: &str,
        key_path: &Path,
        passphrase: Option<&str>,
    ) -> TransportResult<()> {
        if !key_path.exists() {
            return Err(TransportError::AuthenticationFailed {
                user: user.to_string(),
                host: format!("key file not found: {}", key_path.display()),
            });
        }

        let key_pair = load_secret_key(key_path, passphrase).map_err(|e| {
            TransportError::execution(format!("load key {}: {}", key_path.display(), e))
        })?;

        let authenticated = session
            .authenticate_publickey(user, Arc::new(key_pair))
            .await
            .map_err(|e| TransportError::execution(format!("key authentication: {}", e)))?;

        if authenticated {
            Ok(())
        } else {
            Err(TransportError::AuthenticationFailed {
                user: user.to_string(),
                host: key_path.display().to_string(),
            })
        }
    }

    /// Executes a command on a fresh channel of the established session.
    async fn exec(
        handle: &Handle<ClientHandler>,
        command: &str,
        use_pty: bool,
        term_type: &str,
        password: Option<&str>,
    ) -> TransportResult<ExecOutcome> {
        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| TransportError::execution(format!("open channel: {}", e)))?;

        if use_pty {
            channel
                .request_pty(true, term_type, 80, 24, 0, 0, &[])
                .await
                .map_err(|e| TransportError::execution(format!("request pty: {}", e)))?;
        }

        channel
            .exec(true, command)
            .await
            .map_err(|e| TransportError::execution(format!("exec: {}", e)))?;

        let mut stdout: Vec<u8> = Vec::new();
        let mut stderr: Vec<u8> = Vec::new();
        let mut exit_code = None;
        let mut password_sent = password.is_none();

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => {
                    stdout.extend_from_slice(data);
                    // Elevation prompts arrive on the PTY stream. Answer the
                    // first one and leave everything else to the command.
                    if !password_sent && String::from_utf8_lossy(&stdout).contains("Password:") {
                        let line = format!("{}\n", password.unwrap_or_default());
                        let mut reader = tokio::io::BufReader::new(line.as_bytes());
                        channel.data(&mut reader).await.map_err(|e| {
                            TransportError::execution(format!("write password: {}", e))
                        })?;
                        password_sent = true;
                    }
                }
                ChannelMsg::ExtendedData { ref data, ext } => {
                    if ext == 1 {
                        stderr.extend_from_slice(data);
                    }
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    exit_code = Some(exit_status as i32);
                }
                ChannelMsg::Eof => {}
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        let _ = channel.eof().await;

        Ok(ExecOutcome {
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            exit_code,
        })
    }

    /// Dispatch body with fallible plumbing; errors fold into the response.
    async fn try_dispatch(&mut self, command: &Command) -> TransportResult<Response> {
        let params = command
            .host_info
            .as_ref()
            .ok_or(TransportError::NotEnriched)?;
        let context = command
            .global_info
            .as_ref()
            .ok_or(TransportError::NotEnriched)?;

        match &command.kind {
            CommandKind::Passthrough => Ok(Response::new(&self.host)),
            CommandKind::Remote {
                command: remote,
                elevation,
                get_pty,
            } => {
                let effective = effective_command(
                    remote,
                    *elevation,
                    &context.authentication,
                    &context.session,
                )?;
                let prompt_password = match elevation {
                    Elevation::Su => context.authentication.su_password.clone(),
                    _ => None,
                };
                let use_pty = *get_pty || prompt_password.is_some();

                self.ensure_connected(params).await?;
                let handle = self.session.as_ref().ok_or(TransportError::SessionClosed)?;

                debug!(host = %self.host, command = %effective, pty = use_pty, "executing");
                let fut = Self::exec(
                    handle,
                    &effective,
                    use_pty,
                    &context.session.term_type,
                    prompt_password.as_deref(),
                );
                let outcome = match self.command_timeout {
                    Some(timeout) => tokio::time::timeout(timeout, fut).await.map_err(|_| {
                        TransportError::Timeout {
                            seconds: timeout.as_secs(),
                        }
                    })??,
                    None => fut.await?,
                };

                let mut response = Response::new(&self.host)
                    .with_output(outcome.stdout, outcome.stderr)
                    .with_changed(true);
                response.return_code = outcome.exit_code;
                Ok(response)
            }
            CommandKind::Local { action } => {
                self.ensure_connected(params).await?;
                let handle = self.session.as_ref().ok_or(TransportError::SessionClosed)?;

                debug!(host = %self.host, action = %action.describe(), "running sftp action");
                let fut = sftp::run_action(handle, action);
                let value = match self.command_timeout {
                    Some(timeout) => tokio::time::timeout(timeout, fut).await.map_err(|_| {
                        TransportError::Timeout {
                            seconds: timeout.as_secs(),
                        }
                    })??,
                    None => fut.await?,
                };

                Ok(Response::new(&self.host)
                    .with_return_code(0)
                    .with_changed(true)
                    .with_value(value))
            }
        }
    }

    /// Copies the identifying fields of the command onto its response.
    fn stamp(command: &Command, mut response: Response) -> Response {
        response.name = command.name.clone();
        response.command = command.describe();
        response
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn dispatch(&mut self, command: &Command) -> Response {
        if let Some(skipped) = group_filtered(command) {
            return skipped;
        }

        match self.try_dispatch(command).await {
            Ok(response) => Self::stamp(command, response),
            Err(e) => {
                debug!(host = %self.host, error = %e, "dispatch failed");
                Self::stamp(command, Response::failure(&self.host, e.to_string()))
            }
        }
    }

    async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(host = %self.host, "closing ssh session");
            let _ = session
                .disconnect(russh::Disconnect::ByApplication, "run finished", "en")
                .await;
        }
    }
}

fn default_identity_files() -> Vec<PathBuf> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };
    ["id_ed25519", "id_rsa", "id_ecdsa"]
        .iter()
        .map(|name| home.join(".ssh").join(name))
        .filter(|path| path.exists())
        .collect()
}

// ============================================================================
// Transport Factory
// ============================================================================

/// Builds one [`SshTransport`] per host driver.
#[derive(Debug, Clone)]
pub struct SshTransportFactory {
    connect_timeout: Duration,
    command_timeout: Option<Duration>,
}

impl SshTransportFactory {
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            command_timeout: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }
}

impl Default for SshTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportFactory for SshTransportFactory {
    fn create(&self, item: &InventoryItem) -> Box<dyn Transport> {
        let mut transport = SshTransport::new(item.host()).with_connect_timeout(self.connect_timeout);
        if let Some(timeout) = self.command_timeout {
            transport = transport.with_command_timeout(timeout);
        }
        Box::new(transport)
    }
}

// ============================================================================
// Tests
// ============================================================================
