use crate::error::{Error, Result};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;

pub const SCRIPT_FILE: &str = "script.py";
pub const LAUNCHER_FILE: &str = "run.sh";
pub const LOG_FILE: &str = "log.txt";
pub const ARCHIVE_FILE: &str = "output.zip";

/// Creates one private directory per job and stages the script and launcher into it.
#[derive(Clone, Debug)]
pub struct WorkspaceManager {
    root: Option<PathBuf>,
    launcher: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: Option<PathBuf>, launcher: PathBuf) -> Self {
        Self { root, launcher }
    }

    pub async fn stage(&self, script: &[u8]) -> Result<Workspace> {
        let workspace = self.create_dir().map_err(Error::Stage)?;

        fs::write(workspace.script_path(), script)
            .await
            .map_err(Error::Stage)?;

        let launcher = workspace.launcher_path();
        fs::copy(&self.launcher, &launcher)
            .await
            .map_err(Error::Stage)?;
        fs::set_permissions(&launcher, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(Error::Stage)?;

        tracing::debug!(path = %workspace.path().display(), "staged workspace");
        Ok(workspace)
    }

    fn create_dir(&self) -> io::Result<Workspace> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("job-");
        let dir = match &self.root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(Workspace { dir })
    }
}

/// A job's staging directory. Dropping it deletes the directory and everything in it.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn script_path(&self) -> PathBuf {
        self.path().join(SCRIPT_FILE)
    }

    pub fn launcher_path(&self) -> PathBuf {
        self.path().join(LAUNCHER_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.path().join(LOG_FILE)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.path().join(ARCHIVE_FILE)
    }

    /// Move a file out of the workspace so it survives the workspace being dropped.
    pub async fn retain(&self, file: &Path, dest: &Path) -> Result<PathBuf> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        // rename fails across filesystems, e.g. a tmpfs workspace root
        if fs::rename(file, dest).await.is_err() {
            fs::copy(file, dest).await?;
            fs::remove_file(file).await?;
        }
        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launcher_in(dir: &Path) -> PathBuf {
        let launcher = dir.join("launcher.sh");
        std::fs::write(&launcher, "#!/bin/sh\npython3 script.py\n").unwrap();
        launcher
    }

    #[tokio::test]
    async fn stage_writes_script_and_launcher() {
        let scratch = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(
            Some(scratch.path().join("ws")),
            launcher_in(scratch.path()),
        );

        let workspace = manager.stage(b"#REPO_A x\nprint(1)\n").await.unwrap();

        assert!(workspace.path().starts_with(scratch.path().join("ws")));
        assert_eq!(
            std::fs::read(workspace.script_path()).unwrap(),
            b"#REPO_A x\nprint(1)\n"
        );
        assert_eq!(
            std::fs::read_to_string(workspace.launcher_path()).unwrap(),
            "#!/bin/sh\npython3 script.py\n"
        );
        let mode = std::fs::metadata(workspace.launcher_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[tokio::test]
    async fn workspaces_are_distinct_and_removed_on_drop() {
        let scratch = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(None, launcher_in(scratch.path()));

        let first = manager.stage(b"a").await.unwrap();
        let second = manager.stage(b"b").await.unwrap();
        assert_ne!(first.path(), second.path());

        let path = first.path().to_path_buf();
        drop(first);
        assert!(!path.exists());
        assert!(second.path().exists());
    }

    #[tokio::test]
    async fn missing_launcher_is_a_stage_error() {
        let manager = WorkspaceManager::new(None, PathBuf::from("/nonexistent/run.sh"));
        let err = manager.stage(b"print(1)").await.unwrap_err();
        assert!(matches!(err, Error::Stage(_)));
    }

    #[tokio::test]
    async fn retained_file_outlives_workspace() {
        let scratch = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(None, launcher_in(scratch.path()));
        let workspace = manager.stage(b"x").await.unwrap();
        std::fs::write(workspace.archive_path(), b"zip bytes").unwrap();

        let dest = scratch.path().join("archives").join("job.zip");
        let kept = workspace
            .retain(&workspace.archive_path(), &dest)
            .await
            .unwrap();
        drop(workspace);

        assert_eq!(kept, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), b"zip bytes");
    }
}
