//! SFTP action execution.
//!
//! Each action runs on a fresh SFTP subchannel of the established SSH
//! session. Opening a subsystem channel is cheap next to the session
//! handshake, and a short-lived channel cannot leak state between actions.

use russh::client::Handle;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::ssh::ClientHandler;
use crate::command::SftpAction;
use crate::transport::{TransportError, TransportResult};

/// Opens an SFTP subchannel on the session.
async fn open_session(handle: &Handle<ClientHandler>) -> TransportResult<SftpSession> {
    let channel = handle
        .channel_open_session()
        .await
        .map_err(|e| TransportError::transfer(format!("open channel: {}", e)))?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(|e| TransportError::transfer(format!("request sftp subsystem: {}", e)))?;
    SftpSession::new(channel.into_stream())
        .await
        .map_err(|e| TransportError::transfer(format!("start sftp session: {}", e)))
}

/// Runs one action over a fresh subchannel, closing it before returning.
///
/// The returned value lands in the response's `value` field: transfer sizes
/// for file movement, file content for reads, attribute maps for stat.
pub(crate) async fn run_action(
    handle: &Handle<ClientHandler>,
    action: &SftpAction,
) -> TransportResult<Value> {
    let sftp = open_session(handle).await?;
    let result = apply(&sftp, action).await;
    let _ = sftp.close().await;
    result
}

async fn apply(sftp: &SftpSession, action: &SftpAction) -> TransportResult<Value> {
    match action {
        SftpAction::CreateDir { path } => {
            sftp.create_dir(path)
                .await
                .map_err(|e| TransportError::transfer(format!("create dir {}: {}", path, e)))?;
            Ok(Value::Null)
        }
        SftpAction::RemoveDir { path } => {
            sftp.remove_dir(path)
                .await
                .map_err(|e| TransportError::transfer(format!("remove dir {}: {}", path, e)))?;
            Ok(Value::Null)
        }
        SftpAction::RemoveFile { path } => {
            sftp.remove_file(path)
                .await
                .map_err(|e| TransportError::transfer(format!("remove file {}: {}", path, e)))?;
            Ok(Value::Null)
        }
        SftpAction::Upload { local, remote } => {
            let content = tokio::fs::read(local).await.map_err(|e| {
                TransportError::transfer(format!("read local {}: {}", local.display(), e))
            })?;
            let mut file = sftp
                .create(remote)
                .await
                .map_err(|e| TransportError::transfer(format!("create {}: {}", remote, e)))?;
            file.write_all(&content)
                .await
                .map_err(|e| TransportError::transfer(format!("write {}: {}", remote, e)))?;
            file.shutdown()
                .await
                .map_err(|e| TransportError::transfer(format!("flush {}: {}", remote, e)))?;
            Ok(json!({ "bytes": content.len() }))
        }
        SftpAction::Download { remote, local } => {
            let mut file = sftp
                .open(remote)
                .await
                .map_err(|e| TransportError::transfer(format!("open {}: {}", remote, e)))?;
            let mut content = Vec::new();
            file.read_to_end(&mut content)
                .await
                .map_err(|e| TransportError::transfer(format!("read {}: {}", remote, e)))?;
            if let Some(parent) = local.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    TransportError::transfer(format!(
                        "create local dir {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
            tokio::fs::write(local, &content).await.map_err(|e| {
                TransportError::transfer(format!("write local {}: {}", local.display(), e))
            })?;
            Ok(json!({ "bytes": content.len() }))
        }
        SftpAction::WriteFile { path, contents } => {
            let mut file = sftp
                .create(path)
                .await
                .map_err(|e| TransportError::transfer(format!("create {}: {}", path, e)))?;
            file.write_all(contents.as_bytes())
                .await
                .map_err(|e| TransportError::transfer(format!("write {}: {}", path, e)))?;
            file.shutdown()
                .await
                .map_err(|e| TransportError::transfer(format!("flush {}: {}", path, e)))?;
            Ok(json!({ "bytes": contents.len() }))
        }
        SftpAction::ReadFile { path } => {
            let mut file = sftp
                .open(path)
                .await
                .map_err(|e| TransportError::transfer(format!("open {}: {}", path, e)))?;
            let mut content = Vec::new();
            file.read_to_end(&mut content)
                .await
                .map_err(|e| TransportError::transfer(format!("read {}: {}", path, e)))?;
            Ok(Value::String(String::from_utf8_lossy(&content).to_string()))
        }
        SftpAction::SetPermissions { path, mode } => {
            let mut attrs = FileAttributes::default();
            attrs.permissions = Some(*mode);
            sftp.set_metadata(path, attrs)
                .await
                .map_err(|e| TransportError::transfer(format!("chmod {}: {}", path, e)))?;
            Ok(Value::Null)
        }
        SftpAction::Rename { from, to } => {
            sftp.rename(from, to)
                .await
                .map_err(|e| {
                    TransportError::transfer(format!("rename {} to {}: {}", from, to, e))
                })?;
            Ok(Value::Null)
        }
        SftpAction::Stat { path } => {
            let attrs = sftp
                .metadata(path)
                .await
                .map_err(|e| TransportError::transfer(format!("stat {}: {}", path, e)))?;
            Ok(json!({
                "size": attrs.size,
                "mode": attrs.permissions,
                "uid": attrs.uid,
                "gid": attrs.gid,
                "mtime": attrs.mtime,
                "is_dir": attrs.is_dir(),
                "is_file": attrs.is_regular(),
            }))
        }
        SftpAction::ListDir { path } => {
            let entries = sftp
                .read_dir(path)
                .await
                .map_err(|e| TransportError::transfer(format!("list dir {}: {}", path, e)))?;
            let mut names: Vec<String> = entries
                .map(|entry| entry.file_name())
                .filter(|name| name != "." && name != "..")
                .collect();
            names.sort();
            Ok(json!(names))
        }
    }
}
