//! File management over the SFTP channel.

use std::collections::VecDeque;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::command::{Command, SftpAction};
use crate::ops::{OpResult, Operation, Step};
use crate::response::Response;

/// Runs one or more SFTP actions against each host.
///
/// Built from typed constructors; `with_mode` appends a permission change on
/// the last touched remote path, so `FileOp::upload(..).with_mode(0o600)`
/// uploads then chmods in two steps.
pub struct FileOp {
    name: String,
    group: String,
    target: Option<String>,
    queue: VecDeque<SftpAction>,
}

impl FileOp {
    fn new(name: impl Into<String>, action: SftpAction, target: Option<String>) -> Self {
        let mut queue = VecDeque::new();
        queue.push_back(action);
        Self {
            name: name.into(),
            group: crate::inventory::ALL_GROUP.to_string(),
            target,
            queue,
        }
    }

    /// Creates a directory on the target.
    pub fn create_dir(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            "create_dir",
            SftpAction::CreateDir { path: path.clone() },
            Some(path),
        )
    }

    /// Removes a file on the target.
    pub fn remove_file(path: impl Into<String>) -> Self {
        Self::new(
            "remove_file",
            SftpAction::RemoveFile { path: path.into() },
            None,
        )
    }

    /// Removes an empty directory on the target.
    pub fn remove_dir(path: impl Into<String>) -> Self {
        Self::new(
            "remove_dir",
            SftpAction::RemoveDir { path: path.into() },
            None,
        )
    }

    /// Uploads a controller-side file to the target.
    pub fn upload(local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        let remote = remote.into();
        Self::new(
            "upload",
            SftpAction::Upload {
                local: local.into(),
                remote: remote.clone(),
            },
            Some(remote),
        )
    }

    /// Downloads a target file to the controller.
    pub fn download(remote: impl Into<String>, local: impl Into<PathBuf>) -> Self {
        Self::new(
            "download",
            SftpAction::Download {
                remote: remote.into(),
                local: local.into(),
            },
            None,
        )
    }

    /// Writes literal contents to a target file.
    pub fn write(path: impl Into<String>, contents: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            "write_file",
            SftpAction::WriteFile {
                path: path.clone(),
                contents: contents.into(),
            },
            Some(path),
        )
    }

    /// Sets permission bits on the last touched remote path.
    pub fn with_mode(mut self, mode: u32) -> Self {
        if let Some(path) = &self.target {
            self.queue.push_back(SftpAction::SetPermissions {
                path: path.clone(),
                mode,
            });
        }
        self
    }

    /// Restricts execution to members of `group`.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Overrides the operation name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Operation for FileOp {
    fn name(&self) -> &str {
        &self.name
    }

    async fn advance(&mut self, _prev: Option<Response>) -> OpResult<Step> {
        match self.queue.pop_front() {
            Some(action) => Ok(Step::Command(
                Command::local(action)
                    .with_group(&self.group)
                    .with_name(&self.name),
            )),
            None => Ok(Step::done()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_dir_yields_one_local_command() {
        let mut op = FileOp::create_dir("/tmp/release").with_group("web");

        let Step::Command(cmd) = op.advance(None).await.unwrap() else {
            panic!("expected a command step");
        };
        assert_eq!(cmd.group, "web");
        assert_eq!(cmd.describe().as_deref(), Some("sftp mkdir /tmp/release"));

        let step = op.advance(Some(Response::new("h1"))).await.unwrap();
        assert!(matches!(step, Step::Done(_)));
    }

    #[tokio::test]
    async fn upload_with_mode_chmods_the_remote_path() {
        let mut op = FileOp::upload("app.conf", "/etc/app.conf").with_mode(0o600);

        let Step::Command(first) = op.advance(None).await.unwrap() else {
            panic!("expected the upload");
        };
        assert_eq!(
            first.describe().as_deref(),
            Some("sftp put app.conf /etc/app.conf")
        );

        let Step::Command(second) = op.advance(Some(Response::new("h1"))).await.unwrap() else {
            panic!("expected the chmod");
        };
        assert_eq!(
            second.describe().as_deref(),
            Some("sftp chmod 600 /etc/app.conf")
        );
    }

    #[tokio::test]
    async fn download_has_no_mode_target() {
        let op = FileOp::download("/var/log/app.log", "app.log").with_mode(0o644);
        assert_eq!(op.queue.len(), 1);
    }
}
