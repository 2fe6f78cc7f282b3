//! Machine-wide single instance guard
//!
//! Only one process may drive the named capture session. A front end acquires an
//! [`InstanceLock`] before creating its controller and exits right away if that fails. The lock
//! is released when the guard is dropped, and by the OS if the process dies.
use std::fmt;

/// Instance module errors
#[derive(Debug)]
pub enum InstanceError {
    /// Another process (or another guard in this process) already holds the lock
    AlreadyRunning(String),
    /// Represents an standard IO Error
    IoError(std::io::Error),
}

impl From<std::io::Error> for InstanceError {
    fn from(err: std::io::Error) -> Self {
        InstanceError::IoError(err)
    }
}

impl fmt::Display for InstanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceError::AlreadyRunning(name) => write!(f, "another instance already holds {}", name),
            InstanceError::IoError(err) => write!(f, "unable to acquire the instance lock: {}", err),
        }
    }
}

impl std::error::Error for InstanceError {}

pub type InstanceResult<T> = Result<T, InstanceError>;

/// Held for as long as this process is the only instance
pub struct InstanceLock {
    name: String,
    #[cfg(windows)]
    _mutex: crate::native::instance_mutex::NamedMutex,
    #[cfg(unix)]
    _file: nix::fcntl::Flock<std::fs::File>,
}

impl InstanceLock {
    /// Acquires the lock called `name`, without waiting
    #[cfg(windows)]
    pub fn acquire(name: &str) -> InstanceResult<Self> {
        let mutex = crate::native::instance_mutex::NamedMutex::try_acquire(name)?
            .ok_or_else(|| InstanceError::AlreadyRunning(name.to_string()))?;

        log::debug!("Acquired instance lock {}", name);
        Ok(Self {
            name: name.to_string(),
            _mutex: mutex,
        })
    }

    /// Acquires the lock called `name`, without waiting
    ///
    /// Backed by an exclusive `flock` on `<temp dir>/<name>.lock`
    #[cfg(unix)]
    pub fn acquire(name: &str) -> InstanceResult<Self> {
        use nix::errno::Errno;
        use nix::fcntl::{Flock, FlockArg};

        let path = std::env::temp_dir().join(format!("{}.lock", name));
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(locked) => {
                log::debug!("Acquired instance lock {}", path.display());
                Ok(Self {
                    name: name.to_string(),
                    _file: locked,
                })
            }
            Err((_, Errno::EWOULDBLOCK)) => Err(InstanceError::AlreadyRunning(name.to_string())),
            Err((_, errno)) => Err(InstanceError::IoError(std::io::Error::from(errno))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for InstanceLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceLock").field("name", &self.name).finish()
    }
}
