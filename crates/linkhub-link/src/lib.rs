//! The dual-mode (binary/text) framed socket protocol described in this
//! workspace's design notes as "Link": a handshake that selects an initial
//! encoding, typed datum dispatch, and an in-band mode switch, delivered to
//! callers as a single ordered stream of events rather than per-kind
//! callbacks.

mod conn;
mod datum;
mod error;
mod event;
mod link;

pub use datum::{Auth, AuthResponse, Command, DatumType, Message, Roster, RoomEvent, Status, User};
pub use error::LinkError;
pub use event::Event;
pub use link::{EventStream, Link, Mode};

#[cfg(unix)]
pub mod fd {
    //! Helpers for wrapping a raw Unix file descriptor — the Hub's end of
    //! an anonymous socketpair, or the child's inherited fd 3 — into the
    //! `tokio::net::UnixStream` that `Link::dial`/`Link::accept` expect.

    use std::os::fd::{FromRawFd, RawFd};

    /// # Safety
    /// `fd` must be an open, valid, connection-mode Unix domain socket not
    /// owned by anything else; ownership transfers to the returned stream.
    pub unsafe fn unix_stream_from_raw_fd(fd: RawFd) -> std::io::Result<tokio::net::UnixStream> {
        let std_stream = unsafe { std::os::unix::net::UnixStream::from_raw_fd(fd) };
        std_stream.set_nonblocking(true)?;
        tokio::net::UnixStream::from_std(std_stream)
    }
}
