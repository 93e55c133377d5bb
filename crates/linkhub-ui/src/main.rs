//! `linkhub-ui`: a minimal per-conversation child process. The graphical
//! text widget and entry box are out of scope here; this binary speaks the
//! Link half of the contract and is a headless stand-in for that window —
//! it prints incoming events to stdout and reads lines of input from stdin,
//! splitting each into a literal message or a `/`-prefixed meta-command.
//! Incoming message bodies are run through `linkhub_inline::translate`
//! before printing, since the markup string it produces is what the real
//! widget would consume.

use std::path::PathBuf;

use clap::Parser;
use linkhub_link::{Command, Event, Link, Message, Mode};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// The child process contract's argv: `--fd`, `--mode`, `--to`,
/// `--user`. `--unix` is supplemental — a manual-dialing path for running
/// this binary standalone against a Hub's local listener instead of being
/// forked with an inherited socketpair fd.
#[derive(Parser, Debug)]
#[command(name = "linkhub-ui")]
#[command(about = "Headless per-conversation chat client")]
struct Args {
    /// Inherited file descriptor of the Hub-established socketpair end.
    #[arg(long)]
    fd: Option<i32>,

    /// Connect by dialing a Unix socket path instead of inheriting `--fd`
    /// (for manual testing against a Hub's local listener).
    #[arg(long)]
    unix: Option<PathBuf>,

    /// Protocol mode: "msgpack" (binary) or "text".
    #[arg(long, default_value = "msgpack")]
    mode: String,

    /// Conversation id (channel name or nickname) this window represents.
    #[arg(long, default_value = "")]
    to: String,

    /// Our own nickname, used as `from` on outgoing messages.
    #[arg(long, default_value = "")]
    user: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    let code = rt.block_on(run(args));
    std::process::exit(code);
}

fn parse_mode(s: &str) -> Mode {
    match s {
        "text" => Mode::Text,
        _ => Mode::Binary,
    }
}

async fn run(args: Args) -> i32 {
    let (link, mut events) = match connect(&args).await {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!(error = %e, "failed to establish link");
            return 1;
        }
    };

    println!("-- connected to {} as {} --", args.to, args.user);

    let to = args.to.clone();
    let user = args.user.clone();
    let link_for_input = link.clone();
    let input_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.is_empty() {
                continue;
            }
            if let Err(e) = handle_input_line(&link_for_input, &to, &user, &line).await {
                println!("-- send failed: {e} --");
            }
        }
    });

    while let Some(ev) = events.recv().await {
        print_event(ev);
    }

    input_task.abort();
    0
}

async fn connect(args: &Args) -> Result<(Link, linkhub_link::EventStream), linkhub_link::LinkError> {
    let mode = parse_mode(&args.mode);

    if let Some(fd) = args.fd {
        #[cfg(unix)]
        {
            // SAFETY: fd 3 is handed to us by the Hub's fork+exec as a freshly dup2'd, otherwise
            // unowned socket fd.
            let stream = unsafe { linkhub_link::fd::unix_stream_from_raw_fd(fd) }
                .map_err(linkhub_link::LinkError::from)?;
            return Link::accept(stream).await;
        }
        #[cfg(not(unix))]
        {
            let _ = fd;
            panic!("--fd is only supported on unix");
        }
    }

    if let Some(path) = &args.unix {
        let stream = tokio::net::UnixStream::connect(path).await.map_err(linkhub_link::LinkError::from)?;
        return Link::dial(stream, mode).await;
    }

    Err(linkhub_link::LinkError::Closed)
}

async fn handle_input_line(link: &Link, to: &str, user: &str, line: &str) -> Result<(), linkhub_link::LinkError> {
    if let Some(rest) = line.strip_prefix('/') {
        let mut parts = rest.splitn(2, ' ');
        let verb = parts.next().unwrap_or("").to_lowercase();
        let arg = parts.next().unwrap_or("").to_string();

        return match verb.as_str() {
            "bye" => link.send_command(&Command { cmd: Command::BYE.to_string(), payload: Vec::new() }).await,
            "msgpack" => link.set_send_mode(Mode::Binary).await,
            "text" => link.set_send_mode(Mode::Text).await,
            "roster" => link.send_command(&Command { cmd: "ROST".to_string(), payload: Vec::new() }).await,
            "query" => link.send_command(&Command { cmd: "QUER".to_string(), payload: vec![arg] }).await,
            "whois" => link.send_command(&Command { cmd: "WHOI".to_string(), payload: vec![arg] }).await,
            "ping" => link.send_command(&Command { cmd: "PING".to_string(), payload: vec![arg] }).await,
            "join" => link.send_command(&Command { cmd: "JOIN".to_string(), payload: vec![arg] }).await,
            "part" => {
                let mut payload = arg.splitn(2, ' ').map(str::to_string).collect::<Vec<_>>();
                if payload.is_empty() {
                    payload.push(String::new());
                }
                link.send_command(&Command { cmd: "PART".to_string(), payload }).await
            }
            "quit" => link.send_command(&Command { cmd: "QUIT".to_string(), payload: vec![arg] }).await,
            "raw" => link.send_command(&Command { cmd: "RAW ".to_string(), payload: vec![arg] }).await,
            other => {
                println!("-- unknown local command: /{other} --");
                Ok(())
            }
        };
    }

    let msg = Message {
        to: to.to_string(),
        from: user.to_string(),
        flags: Vec::new(),
        date: chrono::Utc::now().timestamp(),
        msg: line.to_string(),
    };
    link.send_message(&msg).await
}

fn print_event(event: Event) {
    match event {
        Event::Message(msg) => {
            let who = if msg.from.is_empty() { "*" } else { &msg.from };
            let markup = linkhub_inline::translate(&msg.msg);
            println!("[{}] {}: {}", timestamp(msg.date), who, markup);
        }
        Event::Command(cmd) => {
            println!("-- command: {} {} --", cmd.cmd.trim(), cmd.payload.join(" "));
        }
        Event::Status(status) => {
            println!("-- status {}: {} --", status.status, status.payload);
        }
        Event::Roster(roster) => {
            for user in roster {
                println!("-- user: {} {} --", user.aliases.join(","), hex(&user.key));
            }
        }
        Event::Auth(auth) => {
            println!("-- auth challenge ({} bytes) --", auth.challenge.len());
        }
        Event::AuthResponse(resp) => {
            println!("-- auth response ({} bytes) --", resp.challenge.len());
        }
        Event::User(user) => {
            println!("-- user datum: {} --", user.aliases.join(","));
        }
        Event::Text(text) => println!("-- {text} --"),
        Event::Disconnect => println!("-- disconnected --"),
        Event::RoomMemberJoin(mask) => println!("-- {mask} joined --"),
        Event::RoomMemberPart { member, msg, has_quit } => {
            let verb = if has_quit { "quit" } else { "left" };
            if msg.is_empty() {
                println!("-- {member} {verb} --");
            } else {
                println!("-- {member} {verb} ({msg}) --");
            }
        }
        Event::RoomMemberList { room, members } => {
            println!("-- {room} members: {} --", members.join(", "));
        }
    }
}

fn timestamp(date: i64) -> String {
    use chrono::TimeZone;
    let dt = if date == 0 {
        chrono::Utc::now()
    } else {
        chrono::Utc.timestamp_opt(date, 0).single().unwrap_or_else(chrono::Utc::now)
    };
    dt.format("%H:%M:%S").to_string()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
