use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ============================================================================
// Script Staging
// ============================================================================

/// File name of the single artifact a staging area may hold.
const ARTIFACT_NAME: &str = "script.sh";

/// Process-scoped temporary directory that holds at most one staged script.
///
/// The directory and anything left inside it are removed when the area is
/// dropped, which covers normal returns, early returns and cancelled futures.
#[derive(Debug)]
pub(crate) struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    pub(crate) fn new() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("lgtmit-").tempdir()?;
        Ok(Self { dir })
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `text` to the staging area's artifact file.
    ///
    /// The file is created with `create_new`, so staging a second script while
    /// the first handle is still alive fails with `AlreadyExists`.
    pub(crate) fn stage(&self, text: &str) -> io::Result<StagedScript> {
        let path = self.path().join(ARTIFACT_NAME);

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&path)?;
        // Own the path before writing so a failed write still removes the file
        let staged = StagedScript { path };
        file.write_all(text.as_bytes())?;
        file.flush()?;

        Ok(staged)
    }
}

/// Handle to a staged script file; deletes the file on drop.
#[derive(Debug)]
pub(crate) struct StagedScript {
    path: PathBuf,
}

impl StagedScript {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedScript {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
