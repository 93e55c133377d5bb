//! `linkhubd`: the long-running conversation router.
//!
//! Connects to a single upstream IRC server, logs in, opens a local listener
//! for per-conversation UI clients, and routes between them until `SIGINT`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use linkhub_hub::{default_listener_path, serve_tcp, serve_unix, unlink, Config, DesktopNotifier, Hub, ProcessSpawner};
use tracing_subscriber::EnvFilter;

/// CLI surface: `--server`, `--user`, `--tcplisten`, `--listen`,
/// `--chatlimit`, `-c <config-file>`.
#[derive(Parser, Debug)]
#[command(name = "linkhubd")]
#[command(about = "Conversation router owning the upstream IRC connection")]
struct Args {
    /// Path to the YAML config file. Defaults to
    /// `$XDG_CONFIG_HOME/linkhub/irc.yaml`.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Upstream address, overriding the config file's `address`.
    #[arg(long)]
    server: Option<String>,

    /// Nickname, overriding the config file's `nickname`.
    #[arg(long)]
    user: Option<String>,

    /// Optional additional TCP listener address for local UI clients, e.g.
    /// `127.0.0.1:4000`.
    #[arg(long)]
    tcplisten: Option<String>,

    /// Override the Unix-socket listener path (defaults to a stable
    /// transform of the upstream address under the runtime directory).
    #[arg(long)]
    listen: Option<PathBuf>,

    /// Maximum number of simultaneously open conversations (default 30).
    #[arg(long, default_value_t = 30)]
    chatlimit: usize,

    /// Path to the `linkhub-ui` child binary. Only the argv/fd contract is
    /// fixed; this flag controls how the Hub locates the binary itself.
    /// Defaults to a sibling of the current executable.
    #[arg(long)]
    ui_bin: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    let code = rt.block_on(run(args));
    std::process::exit(code);
}

async fn run(args: Args) -> i32 {
    let mut config = match args.config.clone().or_else(Config::default_path) {
        Some(path) if path.exists() => Config::load(&path),
        _ => Config::default(),
    };
    if let Some(server) = args.server {
        config.address = server;
    }
    if let Some(user) = args.user {
        config.nickname = user;
    }

    if config.address.is_empty() || config.nickname.is_empty() {
        tracing::error!("config must specify a non-empty address and nickname (via -c, --server, --user)");
        return 1;
    }

    let listener_path = args.listen.unwrap_or_else(|| default_listener_path(&config.address));
    let ui_bin = args.ui_bin.unwrap_or_else(default_ui_bin_path);

    let spawner = Arc::new(ProcessSpawner::new(ui_bin));
    let notifier = Arc::new(DesktopNotifier);
    let hub = Hub::new(config, spawner, notifier, args.chatlimit);

    let unix_hub = Arc::clone(&hub);
    let unix_path = listener_path.clone();
    tokio::spawn(async move {
        if let Err(e) = serve_unix(unix_hub, &unix_path).await {
            tracing::error!(error = %e, "local unix listener failed");
        }
    });
    if let Some(addr) = args.tcplisten {
        let tcp_hub = Arc::clone(&hub);
        tokio::spawn(async move {
            if let Err(e) = serve_tcp(tcp_hub, &addr).await {
                tracing::error!(error = %e, "local tcp listener failed");
            }
        });
    }

    let hub_for_run = Arc::clone(&hub);
    let run_task = tokio::spawn(async move { hub_for_run.run().await });

    let mut sigint = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            return 1;
        }
    };

    tokio::select! {
        _ = sigint.recv() => {
            tracing::info!("received SIGINT, shutting down");
            hub.shutdown().await;
            unlink(&listener_path);
            0
        }
        result = run_task => {
            match result {
                Ok(Ok(())) => 0,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "hub exited with a fatal error");
                    unlink(&listener_path);
                    1
                }
                Err(e) => {
                    tracing::error!(error = %e, "hub task panicked");
                    unlink(&listener_path);
                    1
                }
            }
        }
    }
}

fn default_ui_bin_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.join("linkhub-ui")))
        .unwrap_or_else(|| PathBuf::from("linkhub-ui"))
}
