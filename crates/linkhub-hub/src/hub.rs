use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use linkhub_ircline::{
    classify, command_budget, format_names_summary, format_privmsg_lines, format_topic_set_by,
    mask_len, nick_from_mask, pong_reply, DispatchEvent, IrcLine, ParserState,
};
use linkhub_link::{Command, Event, EventStream, Link, Message, Mode, RoomEvent};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, trace, warn};

use crate::backoff::BackoffPolicy;
use crate::child::{ChildSpawner, ChildStream};
use crate::config::Config;
use crate::error::HubError;
use crate::notify::{should_notify, Notifier};
use crate::upstream::{self, login_lines, UpstreamStream};

type UpstreamWrite = tokio::io::WriteHalf<UpstreamStream>;
type UpstreamRead = BufReader<tokio::io::ReadHalf<UpstreamStream>>;

/// What happened when the Hub tried to locate or create the child for a
/// conversation key.
enum SpawnOutcome {
    Existing,
    Spawned,
    Dropped,
}

/// The conversation table, `last_client`, and IRC membership tracking: the
/// single piece of mutable state that needs one coarse lock. Held behind
/// `parking_lot::Mutex` with short-lived critical sections (lookup/insert/
/// remove only, never spanning an `.await`).
struct HubState {
    conversations: HashMap<String, Link>,
    /// Children accepted on the local listener before their first outbound
    /// Message declares a conversation key.
    pending: HashMap<u64, Link>,
    next_pending_id: u64,
    last_client: Option<String>,
    parser: ParserState,
}

impl HubState {
    fn new() -> Self {
        HubState {
            conversations: HashMap::new(),
            pending: HashMap::new(),
            next_pending_id: 0,
            last_client: None,
            parser: ParserState::new(),
        }
    }
}

/// The router process: owns the upstream IRC connection and fans out to
/// per-conversation child UI processes over Links. One `Hub` is shared (via
/// `Arc`) between the upstream reader task,
/// every child reader task, the local listener task, and the signal task;
/// all of them reach mutable state only through `state`'s lock or
/// `upstream_write`'s lock, each held for the duration of one operation and
/// never across an `.await` on unrelated I/O.
pub struct Hub {
    config: Config,
    spawner: Arc<dyn ChildSpawner>,
    notifier: Arc<dyn Notifier>,
    chat_limit: usize,
    state: Mutex<HubState>,
    upstream_write: AsyncMutex<Option<UpstreamWrite>>,
}

impl Hub {
    pub fn new(config: Config, spawner: Arc<dyn ChildSpawner>, notifier: Arc<dyn Notifier>, chat_limit: usize) -> Arc<Hub> {
        Arc::new(Hub {
            config,
            spawner,
            notifier,
            chat_limit,
            state: Mutex::new(HubState::new()),
            upstream_write: AsyncMutex::new(None),
        })
    }

    pub fn self_nick(&self) -> &str {
        &self.config.nickname
    }

    /// Dial upstream, run the login sequence, and return a buffered line
    /// reader for the new connection. The initial
    /// call (from `run`) propagates failure to the caller as fatal; calls
    /// from the reconnect loop are retried by the caller instead.
    async fn connect_and_login(&self) -> Result<UpstreamRead, HubError> {
        let stream = upstream::dial(&self.config).await?;
        let (read_half, mut write_half) = tokio::io::split(stream);

        for line in login_lines(&self.config) {
            write_half
                .write_all(format!("{line}\r\n").as_bytes())
                .await
                .map_err(|e| HubError::Connect(e.to_string()))?;
        }
        write_half.flush().await.map_err(|e| HubError::Connect(e.to_string()))?;

        *self.upstream_write.lock().await = Some(write_half);
        info!(address = %self.config.address, "connected to upstream");
        Ok(BufReader::new(read_half))
    }

    async fn send_upstream_raw(&self, line: &str) -> Result<(), HubError> {
        let mut guard = self.upstream_write.lock().await;
        match guard.as_mut() {
            Some(w) => {
                w.write_all(format!("{line}\r\n").as_bytes())
                    .await
                    .map_err(|e| HubError::Connect(e.to_string()))?;
                w.flush().await.map_err(|e| HubError::Connect(e.to_string()))?;
                Ok(())
            }
            None => Err(HubError::Connect("upstream not connected".to_string())),
        }
    }

    /// Run forever: connect, read upstream lines until disconnect,
    /// reconnect with additive backoff, repeat.
    /// Returns only if the *initial* connect fails.
    pub async fn run(self: &Arc<Self>) -> Result<(), HubError> {
        let mut reader = self.connect_and_login().await?;
        loop {
            self.read_until_disconnect(&mut reader).await;
            warn!("upstream disconnected, entering reconnect loop");
            reader = self.reconnect_with_backoff().await;
        }
    }

    async fn reconnect_with_backoff(self: &Arc<Self>) -> UpstreamRead {
        let mut backoff = BackoffPolicy::default();
        loop {
            tokio::time::sleep(backoff.next_delay()).await;
            match self.connect_and_login().await {
                Ok(reader) => return reader,
                Err(e) => {
                    warn!(error = %e, delay = ?backoff.next_delay(), "reconnect attempt failed");
                    backoff.record_failure();
                }
            }
        }
    }

    async fn read_until_disconnect(self: &Arc<Self>, reader: &mut UpstreamRead) {
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => return,
                Ok(_) => {
                    let trimmed = line.trim_end_matches(['\r', '\n']);
                    if trimmed.is_empty() {
                        continue;
                    }
                    trace!(line = %trimmed, "upstream line");
                    self.handle_upstream_line(trimmed).await;
                }
                Err(e) => {
                    warn!(error = %e, "upstream read error");
                    return;
                }
            }
        }
    }

    async fn handle_upstream_line(self: &Arc<Self>, raw: &str) {
        let parsed = IrcLine::parse(raw);
        let event = {
            let mut state = self.state.lock();
            classify(&parsed, &mut state.parser)
        };
        self.dispatch_upstream_event(event).await;
    }

    async fn dispatch_upstream_event(self: &Arc<Self>, event: DispatchEvent) {
        match event {
            DispatchEvent::Ping { token } => {
                if let Err(e) = self.send_upstream_raw(&pong_reply(&token)).await {
                    warn!(error = %e, "failed to reply to PING");
                }
            }
            DispatchEvent::Privmsg { from, to, text } => {
                let key = if to.starts_with('#') || to.starts_with('&') {
                    to.to_lowercase()
                } else {
                    nick_from_mask(&from).to_lowercase()
                };
                self.route_to_conversation(&key, Message {
                    to: to.clone(),
                    from: from.clone(),
                    flags: Vec::new(),
                    date: 0,
                    msg: text.clone(),
                })
                .await;

                let from_nick = nick_from_mask(&from);
                if should_notify(&to, from_nick, &text, self.self_nick()) {
                    self.notifier.notify(&format!("{from_nick} ({to})"), &text);
                }
            }
            DispatchEvent::Join { from, channel } => {
                let key = channel.to_lowercase();
                self.ensure_conversation(&key).await;
                self.send_room_event(&key, RoomEvent::MemberJoin(from)).await;
            }
            DispatchEvent::Part { from, channel, reason } => {
                let key = channel.to_lowercase();
                self.send_room_event(
                    &key,
                    RoomEvent::MemberPart {
                        member: from,
                        msg: reason.unwrap_or_default(),
                        has_quit: false,
                    },
                )
                .await;
            }
            DispatchEvent::Quit { from, reason, channels } => {
                let nick = nick_from_mask(&from).to_string();
                let msg = reason.clone().unwrap_or_default();
                for channel in &channels {
                    self.send_room_event(
                        channel,
                        RoomEvent::MemberPart {
                            member: from.clone(),
                            msg: msg.clone(),
                            has_quit: true,
                        },
                    )
                    .await;
                }
                let private_key = nick.to_lowercase();
                if !channels.contains(&private_key) && self.has_conversation(&private_key) {
                    self.route_to_conversation(
                        &private_key,
                        Message {
                            to: private_key.clone(),
                            from: from.clone(),
                            flags: Vec::new(),
                            date: 0,
                            msg: format!("{from} has quit ({msg})"),
                        },
                    )
                    .await;
                }
            }
            DispatchEvent::NickChange { old, new, channels } => {
                for channel in &channels {
                    self.route_to_conversation(
                        channel,
                        Message {
                            to: channel.clone(),
                            from: channel.clone(),
                            flags: Vec::new(),
                            date: 0,
                            msg: format!("{old} is now known as {new}"),
                        },
                    )
                    .await;
                }
            }
            DispatchEvent::Mode {
                from,
                target,
                modestring,
                params,
            } => {
                let text = format!("MODE {target} {modestring} {}", params.join(" "));
                self.route_to_last_client(Message {
                    to: "*".to_string(),
                    from,
                    flags: Vec::new(),
                    date: 0,
                    msg: text,
                })
                .await;
            }
            DispatchEvent::Topic { channel, topic } => {
                let key = channel.to_lowercase();
                self.ensure_conversation(&key).await;
                self.route_to_conversation(
                    &key,
                    Message {
                        to: channel.clone(),
                        from: channel.clone(),
                        flags: Vec::new(),
                        date: 0,
                        msg: format!("Topic: {topic}"),
                    },
                )
                .await;
            }
            DispatchEvent::TopicSetBy { channel, setter, when } => {
                let key = channel.to_lowercase();
                self.ensure_conversation(&key).await;
                self.route_to_conversation(
                    &key,
                    Message {
                        to: channel.clone(),
                        from: channel.clone(),
                        flags: Vec::new(),
                        date: 0,
                        msg: format_topic_set_by(&setter, when),
                    },
                )
                .await;
            }
            DispatchEvent::NamesEnd { channel, members } => {
                let key = channel.to_lowercase();
                if self.has_conversation(&key) {
                    self.route_to_conversation(
                        &key,
                        Message {
                            to: channel.clone(),
                            from: channel.clone(),
                            flags: Vec::new(),
                            date: 0,
                            msg: format_names_summary(&members),
                        },
                    )
                    .await;
                    self.send_room_event(
                        &key,
                        RoomEvent::MemberList {
                            room: channel,
                            members,
                        },
                    )
                    .await;
                }
            }
            DispatchEvent::WhoisLine(line) => {
                self.route_to_last_client(Message {
                    to: "*".to_string(),
                    from: line.numeric_or_verb,
                    flags: Vec::new(),
                    date: 0,
                    msg: line.text,
                })
                .await;
            }
            DispatchEvent::HelpLine(line) => {
                self.route_to_last_client(Message {
                    to: "*".to_string(),
                    from: line.numeric_or_verb,
                    flags: Vec::new(),
                    date: 0,
                    msg: line.text,
                })
                .await;
            }
            DispatchEvent::Ambient { text } => {
                self.route_to_last_client(Message {
                    to: "*".to_string(),
                    from: String::new(),
                    flags: Vec::new(),
                    date: 0,
                    msg: text,
                })
                .await;
            }
            DispatchEvent::HostnameDiscovered(host) => {
                debug!(hostname = %host, "discovered self hostname");
            }
            DispatchEvent::Ignored => {}
        }
    }

    fn has_conversation(&self, key: &str) -> bool {
        self.state.lock().conversations.contains_key(key)
    }

    async fn ensure_conversation(self: &Arc<Self>, key: &str) {
        match self.spawn_outcome(key) {
            SpawnOutcome::Existing => {}
            SpawnOutcome::Dropped => {
                warn!(key, limit = self.chat_limit, "chat_limit exceeded, dropping conversation");
            }
            SpawnOutcome::Spawned => {
                self.spawn_child(key).await;
            }
        }
    }

    /// Returns which branch applies without holding the lock across the
    /// (async) spawn itself. No placeholder reservation is made; `spawn_child`
    /// re-checks membership right before insertion, so a lost race just means
    /// the later spawn overwrites an identical entry — acceptable since
    /// children are idempotent to spawn for the same key outside of
    /// process-count side effects, and `chat_limit` is a soft flood guard
    /// rather than a hard invariant.
    fn spawn_outcome(&self, key: &str) -> SpawnOutcome {
        let state = self.state.lock();
        if state.conversations.contains_key(key) {
            SpawnOutcome::Existing
        } else if state.conversations.len() >= self.chat_limit {
            SpawnOutcome::Dropped
        } else {
            SpawnOutcome::Spawned
        }
    }

    async fn spawn_child(self: &Arc<Self>, key: &str) {
        let stream = match self.spawner.spawn(key, self.self_nick()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, key, "failed to spawn child process");
                return;
            }
        };
        match Link::dial(stream, Mode::Binary).await {
            Ok((link, events)) => {
                self.state.lock().conversations.insert(key.to_string(), link);
                let hub = Arc::clone(self);
                let key = key.to_string();
                tokio::spawn(async move { hub.run_child_reader(key, events).await });
            }
            Err(e) => warn!(error = %e, key, "failed to establish link to spawned child"),
        }
    }

    /// Accept a local UI connection on the listener: the
    /// Hub is the handshake *acceptor* here, unlike the dial side used for
    /// Hub-spawned children. The conversation key is unknown until the
    /// child's first outbound Message declares `to`.
    pub async fn accept_local<S>(self: &Arc<Self>, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        match Link::accept(stream).await {
            Ok((link, events)) => {
                let id = {
                    let mut state = self.state.lock();
                    let id = state.next_pending_id;
                    state.next_pending_id += 1;
                    state.pending.insert(id, link);
                    id
                };
                let hub = Arc::clone(self);
                tokio::spawn(async move { hub.run_pending_reader(id, events).await });
            }
            Err(e) => warn!(error = %e, "rejected local client handshake"),
        }
    }

    async fn run_pending_reader(self: Arc<Self>, id: u64, mut events: EventStream) {
        while let Some(event) = events.recv().await {
            match event {
                Event::Message(msg) => {
                    let key = msg.to.to_lowercase();
                    if key.is_empty() {
                        continue;
                    }
                    let link = match self.state.lock().pending.remove(&id) {
                        Some(link) => link,
                        None => return,
                    };
                    let promoted = {
                        let mut state = self.state.lock();
                        if state.conversations.len() >= self.chat_limit && !state.conversations.contains_key(&key) {
                            false
                        } else {
                            state.conversations.insert(key.clone(), link);
                            state.last_client = Some(key.clone());
                            true
                        }
                    };
                    if !promoted {
                        warn!(key, "chat_limit exceeded, dropping newly opened local client");
                        return;
                    }
                    if key.starts_with('#') {
                        let _ = self.send_upstream_raw(&format!("JOIN {key}")).await;
                    }
                    self.send_outbound_privmsg(&msg.to, &msg.msg).await;
                    // Hand off to the ordinary per-conversation reader from
                    // here on; this task's job (bootstrapping the key) is
                    // done.
                    self.run_child_reader(key, events).await;
                    return;
                }
                Event::Disconnect => {
                    self.state.lock().pending.remove(&id);
                    return;
                }
                Event::Text(text) => trace!(%text, "pending client text event"),
                _ => {}
            }
        }
        self.state.lock().pending.remove(&id);
    }

    async fn run_child_reader(self: Arc<Self>, key: String, mut events: EventStream) {
        while let Some(event) = events.recv().await {
            self.state.lock().last_client = Some(key.clone());
            match event {
                Event::Message(msg) => {
                    self.send_outbound_privmsg(&msg.to, &msg.msg).await;
                }
                Event::Command(cmd) => self.handle_child_command(&key, cmd).await,
                Event::Status(status) => info!(?status, key = %key, "status from child"),
                Event::Roster(roster) => info!(count = roster.len(), key = %key, "roster from child"),
                Event::Auth(auth) => info!(?auth, key = %key, "auth from child"),
                Event::AuthResponse(resp) => info!(?resp, key = %key, "auth response from child"),
                Event::User(user) => info!(?user, key = %key, "user datum from child"),
                Event::Text(text) => trace!(%text, key = %key, "child text event"),
                Event::Disconnect => {
                    self.state.lock().conversations.remove(&key);
                    return;
                }
                Event::RoomMemberJoin(_) | Event::RoomMemberPart { .. } | Event::RoomMemberList { .. } => {
                    trace!(key = %key, "ignoring room event sent by a child (hub-to-child only)");
                }
            }
        }
        self.state.lock().conversations.remove(&key);
    }

    async fn handle_child_command(self: &Arc<Self>, key: &str, cmd: Command) {
        let mut parts = cmd.payload.iter();
        match cmd.cmd.as_str() {
            "QUER" => {
                if let Some(target) = parts.next() {
                    self.ensure_conversation(&target.to_lowercase()).await;
                }
            }
            "PRIV" => {
                if let Some(target) = parts.next() {
                    let text = cmd.payload.get(1..).map(|p| p.join(" ")).unwrap_or_default();
                    self.send_outbound_privmsg(target, &text).await;
                }
            }
            "WHOI" => {
                if let Some(nick) = parts.next() {
                    let _ = self.send_upstream_raw(&format!("WHOIS {nick}")).await;
                }
            }
            "PING" => {
                if let Some(token) = parts.next() {
                    let _ = self.send_upstream_raw(&format!("PING :{token}")).await;
                }
            }
            "JOIN" => {
                if let Some(channel) = parts.next() {
                    let _ = self.send_upstream_raw(&format!("JOIN {channel}")).await;
                    self.ensure_conversation(&channel.to_lowercase()).await;
                }
            }
            "PART" => {
                if let Some(channel) = parts.next() {
                    let reason = cmd.payload.get(1).cloned();
                    let line = match reason {
                        Some(r) => format!("PART {channel} :{r}"),
                        None => format!("PART {channel}"),
                    };
                    let _ = self.send_upstream_raw(&line).await;
                }
            }
            "QUIT" => {
                let reason = cmd.payload.first().cloned().unwrap_or_default();
                let _ = self.send_upstream_raw(&format!("QUIT :{reason}")).await;
            }
            "RAW " | "RAW" => {
                if let Some(line) = parts.next() {
                    let _ = self.send_upstream_raw(line).await;
                }
            }
            "ROST" => {
                let link = self.state.lock().conversations.get(key).cloned();
                if let Some(link) = link {
                    let _ = link.send_roster(&Vec::new()).await;
                }
            }
            _ => {
                let link = self.state.lock().conversations.get(key).cloned();
                if let Some(link) = link {
                    let _ = link
                        .send_message(&Message {
                            to: String::new(),
                            from: String::new(),
                            flags: Vec::new(),
                            date: 0,
                            msg: "Unknown Command".to_string(),
                        })
                        .await;
                }
            }
        }
    }

    /// Send a `PRIVMSG <target> :<text>`, split across multiple wire lines
    /// if it would exceed the 510-byte budget.
    async fn send_outbound_privmsg(self: &Arc<Self>, target: &str, text: &str) {
        let hostname = self.state.lock().parser.self_hostname.clone();
        let budget = command_budget(mask_len(self.self_nick(), &self.config.username, hostname.as_deref()));
        for line in format_privmsg_lines(target, text, budget) {
            if let Err(e) = self.send_upstream_raw(&line).await {
                warn!(error = %e, "failed to send outbound PRIVMSG chunk");
                return;
            }
        }
    }

    async fn route_to_conversation(&self, key: &str, msg: Message) {
        let link = self.state.lock().conversations.get(key).cloned();
        if let Some(link) = link {
            if let Err(e) = link.send_message(&msg).await {
                warn!(error = %e, key, "failed to deliver message to child");
            }
        }
    }

    async fn route_to_last_client(&self, msg: Message) {
        let key = self.state.lock().last_client.clone();
        if let Some(key) = key {
            self.route_to_conversation(&key, msg).await;
        }
    }

    async fn send_room_event(&self, key: &str, event: RoomEvent) {
        let link = self.state.lock().conversations.get(key).cloned();
        if let Some(link) = link {
            if let Err(e) = link.send_room_event(&event).await {
                warn!(error = %e, key, "failed to deliver room event to child");
            }
        }
    }

    /// Graceful shutdown: tell every child to close,
    /// close each Link, and return so the caller can unlink the listener
    /// path and exit.
    pub async fn shutdown(&self) {
        let links: Vec<Link> = {
            let state = self.state.lock();
            state
                .conversations
                .values()
                .cloned()
                .chain(state.pending.values().cloned())
                .collect()
        };
        for link in links {
            let bye = Command {
                cmd: Command::BYE.to_string(),
                payload: Vec::new(),
            };
            let _ = link.send_command(&bye).await;
            link.close();
        }
    }
}

/// Resolve the local listener's default path: a stable transform of the
/// upstream address under `$XDG_RUNTIME_DIR` (falling back to `/tmp`).
pub fn default_listener_path(address: &str) -> PathBuf {
    let sanitized: String = address
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let base = dirs::runtime_dir().unwrap_or_else(std::env::temp_dir);
    base.join(format!("linkhub-{sanitized}.sock"))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use linkhub_link::Link as ChildLink;
    use tokio::io::DuplexStream;
    use tokio::sync::mpsc as tmpsc;

    use super::*;

    /// Hands back one end of an in-memory duplex pair per spawn call and
    /// forwards the other end to the test over an unbounded channel, so a
    /// test can drive a real `Link::accept` against it exactly as
    /// `linkhub-ui` would.
    struct FakeSpawner {
        tx: StdMutex<tmpsc::UnboundedSender<DuplexStream>>,
    }

    impl ChildSpawner for FakeSpawner {
        fn spawn(&self, _conv_id: &str, _self_nick: &str) -> Result<ChildStream, HubError> {
            let (hub_side, child_side) = tokio::io::duplex(8192);
            let _ = self.tx.lock().unwrap().send(child_side);
            Ok(Box::new(hub_side))
        }
    }

    struct NoopNotifier;

    impl Notifier for NoopNotifier {
        fn notify(&self, _summary: &str, _body: &str) {}
    }

    fn test_config() -> Config {
        Config {
            address: "irc.example.com:6697".to_string(),
            username: "me".to_string(),
            nickname: "me".to_string(),
            realname: "Me".to_string(),
            ..Default::default()
        }
    }

    /// spec.md S3: JOIN, topic (332/333), then a NAMES batch (353/366)
    /// reach the spawned child as a join event, two topic messages, a
    /// names-count message, and a `RoomMemberList`, in that order.
    #[tokio::test]
    async fn s3_channel_join_with_topic() {
        let (tx, mut rx) = tmpsc::unbounded_channel();
        let spawner = Arc::new(FakeSpawner { tx: StdMutex::new(tx) });
        let notifier = Arc::new(NoopNotifier);
        let hub = Hub::new(test_config(), spawner, notifier, 30);

        for line in [
            ":nick!u@h JOIN #room",
            ":srv 332 me #room :hello | world",
            ":srv 333 me #room setter 1700000000",
            ":srv 353 me = #room :@op +voice plain",
            ":srv 366 me #room :End",
        ] {
            hub.handle_upstream_line(line).await;
        }

        let child_side = rx.recv().await.expect("a child was spawned for #room");
        let (_link, mut events) = ChildLink::accept(child_side).await.unwrap();

        match events.recv().await.unwrap() {
            Event::RoomMemberJoin(mask) => assert_eq!(mask, "nick!u@h"),
            other => panic!("expected RoomMemberJoin, got {other:?}"),
        }
        match events.recv().await.unwrap() {
            Event::Message(m) => assert_eq!(m.msg, "Topic: hello\n  world"),
            other => panic!("expected topic message, got {other:?}"),
        }
        match events.recv().await.unwrap() {
            Event::Message(m) => assert!(m.msg.starts_with("Topic set by setter on")),
            other => panic!("expected topic-set-by message, got {other:?}"),
        }
        match events.recv().await.unwrap() {
            Event::Message(m) => assert_eq!(m.msg, "People in this channel: op, voice, plain"),
            other => panic!("expected names summary, got {other:?}"),
        }
        match events.recv().await.unwrap() {
            Event::RoomMemberList { room, members } => {
                assert_eq!(room, "#room");
                assert_eq!(
                    members,
                    vec!["op".to_string(), "voice".to_string(), "plain".to_string()]
                );
            }
            other => panic!("expected RoomMemberList, got {other:?}"),
        }
    }

    /// A QUIT for a nickname present in two channels fans out one
    /// `RoomMemberPart` per channel.
    #[tokio::test]
    async fn s8_quit_fans_out_to_every_channel() {
        let (tx, mut rx) = tmpsc::unbounded_channel();
        let spawner = Arc::new(FakeSpawner { tx: StdMutex::new(tx) });
        let notifier = Arc::new(NoopNotifier);
        let hub = Hub::new(test_config(), spawner, notifier, 30);

        for line in [
            ":nick!u@h JOIN #a",
            ":nick!u@h JOIN #b",
            ":srv 353 me = #a :nick other",
            ":srv 366 me #a :End",
            ":srv 353 me = #b :nick third",
            ":srv 366 me #b :End",
        ] {
            hub.handle_upstream_line(line).await;
        }

        let mut child_sides = Vec::new();
        for _ in 0..2 {
            child_sides.push(rx.recv().await.expect("a child was spawned"));
        }

        hub.handle_upstream_line(":nick!u@h QUIT :goodbye").await;

        for side in child_sides {
            let (_link, mut events) = ChildLink::accept(side).await.unwrap();
            // Drain the join + names-summary + RoomMemberList events that
            // preceded the quit for this channel.
            let mut saw_part = false;
            for _ in 0..8 {
                let Some(ev) = events.recv().await else { break };
                if let Event::RoomMemberPart { member, has_quit, .. } = ev {
                    assert_eq!(member, "nick!u@h");
                    assert!(has_quit);
                    saw_part = true;
                    break;
                }
            }
            assert!(saw_part, "expected a RoomMemberPart for the quitting nick");
        }
    }
}
