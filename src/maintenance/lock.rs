use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Name of the lock file maintenance steps share inside the object cache.
pub const DEFAULT_LOCK_FILE_NAME: &str = "git-maintenance-step.lock";

/// Advisory, file-backed lock scoped to the shared object cache
///
/// Held for as long as the guard lives; dropping it closes the descriptor,
/// which releases the lock for every other process on the machine.
#[derive(Debug)]
pub struct ObjectCacheLock {
    _file: File,
    path: PathBuf,
}

impl ObjectCacheLock {
    /// Try once to take the lock without blocking
    ///
    /// Returns `Ok(None)` when another holder already owns it.
    pub fn try_acquire(object_cache_root: &Path, lock_file_name: &str) -> io::Result<Option<Self>> {
        fs::create_dir_all(object_cache_root)?;
        let path = object_cache_root.join(lock_file_name);

        let mut opts = OpenOptions::new();
        opts.create(true).truncate(false).read(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let file = opts.open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { _file: file, path })),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
