use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::HubError;

/// A child's end of a Hub-to-UI connection, type-erased so the real
/// `socketpair`-backed implementation and an in-memory test double can
/// share one call site.
pub type ChildStream = Box<dyn AsyncRead + AsyncWrite + Unpin + Send>;

/// Creates the Hub's side of a new per-conversation child process. Kept as a
/// trait so integration tests can substitute an in-memory duplex pair
/// instead of actually forking.
///
/// Spawning is deliberately synchronous: the socketpair and fork+exec are
/// plain syscalls, and the only async step (writing the Link handshake) is
/// done by the caller via `Link::dial` once it has the returned stream.
pub trait ChildSpawner: Send + Sync {
    fn spawn(&self, conv_id: &str, self_nick: &str) -> Result<ChildStream, HubError>;
}

/// Forks and execs the configured UI binary with the peer end of an
/// anonymous `AF_UNIX` socketpair on file descriptor 3.
pub struct ProcessSpawner {
    pub ui_bin: PathBuf,
}

impl ProcessSpawner {
    pub fn new(ui_bin: PathBuf) -> Self {
        ProcessSpawner { ui_bin }
    }
}

#[cfg(unix)]
impl ChildSpawner for ProcessSpawner {
    fn spawn(&self, conv_id: &str, self_nick: &str) -> Result<ChildStream, HubError> {
        use std::os::fd::FromRawFd;
        use std::os::unix::process::CommandExt;
        use std::process::Command;

        let mut fds = [0i32; 2];
        let rc = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
        if rc != 0 {
            return Err(HubError::Spawn(format!(
                "socketpair failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        let [hub_fd, child_fd] = fds;

        let mut cmd = Command::new(&self.ui_bin);
        cmd.args([
            "--fd",
            "3",
            "--mode",
            "msgpack",
            "--to",
            conv_id,
            "--user",
            self_nick,
        ]);

        // SAFETY: runs in the forked child before exec, only touching its
        // own fd table. `dup2` then `close` give the child exactly fd 3
        // for the peer socket and drop the now-redundant original fd.
        unsafe {
            cmd.pre_exec(move || {
                if libc::dup2(child_fd, 3) < 0 {
                    return Err(std::io::Error::last_os_error());
                }
                if child_fd != 3 {
                    libc::close(child_fd);
                }
                Ok(())
            });
        }

        let spawn_result = cmd.spawn();
        // The parent no longer needs its copy of the peer fd either way.
        unsafe {
            libc::close(child_fd);
        }
        let proc = spawn_result.map_err(|e| HubError::Spawn(e.to_string()))?;
        tracing::info!(pid = proc.id(), conv_id, "spawned child UI process");

        // SAFETY: `hub_fd` is a freshly created, open, connection-mode
        // AF_UNIX socket owned by nothing else yet.
        let std_stream = unsafe { std::os::unix::net::UnixStream::from_raw_fd(hub_fd) };
        std_stream
            .set_nonblocking(true)
            .map_err(|e| HubError::Spawn(e.to_string()))?;
        let stream = tokio::net::UnixStream::from_std(std_stream).map_err(|e| HubError::Spawn(e.to_string()))?;
        Ok(Box::new(stream))
    }
}
