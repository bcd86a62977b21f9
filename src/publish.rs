use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use tempfile::NamedTempFile;

use crate::error::{DashboardError, Result};

const LOCK_FILE: &str = ".dashboard.lock";

/// Contents written next to their destination but not yet visible there.
///
/// Dropping a staged file without committing removes the temp file and
/// leaves whatever was published before untouched.
pub struct StagedFile {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    pub fn write(target: &Path, contents: &[u8]) -> Result<Self> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        // Same directory as the target so the final rename stays on one filesystem
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(contents)?;
        temp.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            temp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o644))?;
        }

        Ok(Self {
            temp,
            target: target.to_path_buf(),
        })
    }

    pub fn commit(self) -> Result<()> {
        self.temp
            .persist(&self.target)
            .map_err(|e| DashboardError::Io(e.error))?;
        info!("Wrote {}", self.target.display());
        Ok(())
    }
}

pub fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    StagedFile::write(target, contents)?.commit()
}

/// Advisory lock on a marker file guarding a site directory against
/// overlapping runs.
///
/// The OS releases the lock when the holding process exits, however it
/// exits, so a marker left behind by a killed run never blocks the next one.
/// The marker file itself stays in place between runs.
#[derive(Debug)]
pub struct RunLock {
    file: File,
}

impl RunLock {
    pub fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        if !try_lock_exclusive(&file)? {
            return Err(DashboardError::Locked(path));
        }

        let mut previous = String::new();
        file.read_to_string(&mut previous)?;
        let previous = previous.trim();
        if !previous.is_empty() {
            warn!(
                "Taking over lock {} left by process {previous}",
                path.display()
            );
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{}", std::process::id())?;
        file.sync_all()?;

        Ok(Self { file })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // Empty marker means no run was interrupted; closing the file releases the lock
        if let Err(e) = self.file.set_len(0) {
            warn!("Failed to clear lock file: {e}");
        }
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor belongs to `file`, which outlives the call
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }

    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    match file.try_lock() {
        Ok(()) => Ok(true),
        Err(fs::TryLockError::WouldBlock) => Ok(false),
        Err(fs::TryLockError::Error(e)) => Err(e),
    }
}
