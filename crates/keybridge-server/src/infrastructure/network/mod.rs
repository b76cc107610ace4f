//! Unix-domain socket servers.
//!
//! # Sub-modules
//!
//! - **`event_hub`** – Accepts any number of observers (up to the table size)
//!   and pushes every [`keybridge_core::Event`] to all of them.  A subscriber
//!   that cannot keep up is dropped, never waited for.
//!
//! - **`command_server`** – Holds at most one client connection and turns the
//!   key events it sends into matrix callbacks.
//!
//! Both servers run their accept loop on a dedicated OS thread and are
//! stopped through a shared `running` flag.  Shutdown wakes the accept call
//! through the listening descriptor itself, so it still completes when the
//! socket file has been removed underneath the server.

use std::io;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, warn};

pub mod command_server;
pub mod event_hub;

pub use command_server::CommandServer;
pub use event_hub::EventHub;

/// Pause after an accept error before trying again.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How long `stop` waits for a server thread before detaching it.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Error type for bringing a server up.
#[derive(Debug, Error)]
pub enum ListenError {
    /// A leftover socket file could not be removed.
    #[error("failed to remove stale socket {}: {source}", path.display())]
    StaleSocket {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The listening socket could not be bound.
    #[error("failed to bind {}: {source}", path.display())]
    BindFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The listening socket could not be duplicated for shutdown.
    #[error("failed to clone listener for {}: {source}", path.display())]
    CloneFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The accept thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    SpawnFailed {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Binds a listening socket at `path`, removing whatever file a previous run
/// left there.
///
/// # Errors
///
/// [`ListenError::StaleSocket`] if the old file exists but cannot be removed,
/// [`ListenError::BindFailed`] if the bind itself fails.
pub fn bind_listener(path: &Path) -> Result<UnixListener, ListenError> {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("removed stale socket {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(ListenError::StaleSocket {
                path: path.to_path_buf(),
                source,
            })
        }
    }
    UnixListener::bind(path).map_err(|source| ListenError::BindFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// Blocks until a connection arrives or `running` is cleared.
///
/// Interrupted accepts are retried at once; other errors are logged and
/// retried after [`ACCEPT_BACKOFF`].  Returns `None` once shutdown was
/// requested, dropping any connection that raced with it.
pub(crate) fn accept_until_stopped(
    listener: &UnixListener,
    running: &AtomicBool,
    server: &'static str,
) -> Option<UnixStream> {
    while running.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, _)) => {
                if !running.load(Ordering::Acquire) {
                    return None;
                }
                return Some(stream);
            }
            Err(e) if !running.load(Ordering::Acquire) => {
                debug!("{server}: accept ended by shutdown: {e}");
                return None;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("{server}: accept failed: {e}");
                std::thread::sleep(ACCEPT_BACKOFF);
            }
        }
    }
    None
}

/// Second handle on a listening socket, kept by the server to unblock its
/// accept thread.
pub(crate) struct ListenerWaker {
    listener: UnixListener,
    path: PathBuf,
}

impl ListenerWaker {
    pub(crate) fn new(listener: &UnixListener, path: &Path) -> Result<Self, ListenError> {
        let listener = listener
            .try_clone()
            .map_err(|source| ListenError::CloneFailed {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Makes a pending `accept` return.
    ///
    /// Shutting down the listening socket fails a blocked `accept` on Linux
    /// without touching the filesystem.  The connect to the socket path
    /// covers platforms where shutdown of a listener is a no-op.
    pub(crate) fn wake(&self) {
        // SAFETY: the descriptor is owned by `self.listener` and stays open
        // for the duration of the call.
        let rc = unsafe { libc::shutdown(self.listener.as_raw_fd(), libc::SHUT_RDWR) };
        if rc != 0 {
            debug!(
                "shutdown of listener {} failed: {}",
                self.path.display(),
                io::Error::last_os_error()
            );
        }
        if let Err(e) = UnixStream::connect(&self.path) {
            debug!("wake-up connect to {} failed: {e}", self.path.display());
        }
    }
}

/// Joins a server thread, giving up after [`STOP_TIMEOUT`].
///
/// Returns `false` when the thread was left running detached.
pub(crate) fn join_worker(handle: JoinHandle<()>, name: &'static str) -> bool {
    let deadline = Instant::now() + STOP_TIMEOUT;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("{name} thread did not stop within {STOP_TIMEOUT:?}; detaching it");
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    if handle.join().is_err() {
        error!("{name} thread panicked");
    }
    true
}

/// Removes the socket file on shutdown.
pub(crate) fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("failed to remove socket {}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_socket() -> PathBuf {
        std::env::temp_dir().join(format!("keybridge-{}.sock", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_bind_listener_replaces_stale_file() {
        // Arrange: a plain file where the socket should go.
        let path = temp_socket();
        std::fs::write(&path, b"stale").unwrap();

        // Act
        let listener = bind_listener(&path);

        // Assert
        assert!(listener.is_ok());
        remove_socket_file(&path);
    }

    #[test]
    fn test_bind_listener_in_missing_directory_fails() {
        let path = temp_socket().join("nested.sock");
        assert!(matches!(
            bind_listener(&path),
            Err(ListenError::BindFailed { .. })
        ));
    }

    #[test]
    fn test_accept_until_stopped_returns_none_when_not_running() {
        let path = temp_socket();
        let listener = bind_listener(&path).unwrap();
        let running = AtomicBool::new(false);
        assert!(accept_until_stopped(&listener, &running, "test").is_none());
        remove_socket_file(&path);
    }

    #[test]
    fn test_waker_unblocks_accept_after_socket_file_is_gone() {
        // Arrange: a thread parked in accept, and no file left to connect to.
        let path = temp_socket();
        let listener = bind_listener(&path).unwrap();
        let waker = ListenerWaker::new(&listener, &path).unwrap();
        let running = std::sync::Arc::new(AtomicBool::new(true));
        let worker = {
            let running = std::sync::Arc::clone(&running);
            std::thread::spawn(move || accept_until_stopped(&listener, &running, "test").is_none())
        };
        std::fs::remove_file(&path).unwrap();

        // Act
        running.store(false, Ordering::Release);
        waker.wake();

        // Assert
        assert!(join_worker_result(worker));
    }

    #[test]
    fn test_join_worker_detaches_a_stuck_thread() {
        let (_release, stuck) = std::sync::mpsc::channel::<()>();
        let handle = std::thread::spawn(move || {
            let _ = stuck.recv();
        });
        let started = Instant::now();
        assert!(!join_worker(handle, "stuck"));
        assert!(started.elapsed() < STOP_TIMEOUT + Duration::from_secs(1));
    }

    fn join_worker_result(handle: JoinHandle<bool>) -> bool {
        let deadline = Instant::now() + STOP_TIMEOUT;
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        handle.is_finished() && handle.join().unwrap()
    }
}
