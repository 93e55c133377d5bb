//! The Hub: owns the upstream IRC connection, tracks conversation state,
//! and routes between it and per-conversation child UI processes over
//! Links.

mod backoff;
mod child;
mod config;
mod error;
mod hub;
mod listener;
mod notify;
mod upstream;

pub use backoff::BackoffPolicy;
pub use child::{ChildSpawner, ChildStream, ProcessSpawner};
pub use config::Config;
pub use error::HubError;
pub use hub::{default_listener_path, Hub};
pub use listener::{serve_tcp, serve_unix, unlink};
pub use notify::{should_notify, DesktopNotifier, Notifier};
pub use upstream::{dial, login_lines, UpstreamStream};
