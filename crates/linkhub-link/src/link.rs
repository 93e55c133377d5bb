use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::conn::{Conn, ReadOutcome};
use crate::datum::{
    Auth, AuthResponse, Command, DatumType, Message, Roster, RoomEvent, Status, User,
    command_to_room_event, room_event_to_command,
};
use crate::error::LinkError;
use crate::event::Event;

const BINARY_HEADER: [u8; 5] = [0xA4, b'F', b'L', b'E', b'X'];
const TEXT_HEADER: [u8; 5] = [0x00, b'F', b'L', b'E', b'X'];

/// A Link's encoding discipline. Send and receive mode start equal and may
/// diverge after an in-band switch: a switch command arriving over the wire
/// changes only the receive side; calling `set_send_mode` changes only the
/// send side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Binary,
    Text,
}

/// The receiving half of a Link's event channel. Events are delivered in
/// exactly the order they appeared on the wire; at most one is in flight at
/// a time because they all come off the same channel.
pub struct EventStream {
    rx: mpsc::Receiver<Event>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

/// A handle owning one stream connection, its send-mode state, and (via the
/// paired `EventStream`) its callback delivery. Constructed either by
/// dialing — sending the handshake ourselves — or by accepting — reading
/// and validating a peer's handshake. Cheap to clone: both fields are
/// `Arc`-backed, so a Hub can hand one out to its conversation table while
/// the reader task keeps the `Conn` side alive independently.
#[derive(Clone)]
pub struct Link {
    conn: Conn,
    send_mode: Arc<Mutex<Mode>>,
}

impl Link {
    /// Send the 5-byte handshake for `mode` and start the reader task. Used
    /// by whichever side of a connection initiates — the Hub dialing
    /// upstream, or the Hub wrapping its end of a freshly-created child
    /// socketpair.
    pub async fn dial<S>(stream: S, mode: Mode) -> Result<(Self, EventStream), LinkError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let conn = Conn::new(stream);
        conn.write_all(header_bytes(mode)).await?;
        Ok(spawn(conn, mode, mode))
    }

    /// Read exactly 5 bytes and classify them as a binary or text handshake.
    /// Any other prefix is `BadHeader` and the connection is closed before
    /// returning.
    pub async fn accept<S>(stream: S) -> Result<(Self, EventStream), LinkError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let conn = Conn::new(stream);
        let mut header = [0u8; 5];
        conn.read_exact(&mut header).await?;
        let mode = if header == BINARY_HEADER {
            Mode::Binary
        } else if header == TEXT_HEADER {
            Mode::Text
        } else {
            conn.close();
            return Err(LinkError::BadHeader);
        };
        Ok(spawn(conn, mode, mode))
    }

    pub async fn send_message(&self, msg: &Message) -> Result<(), LinkError> {
        match self.current_send_mode() {
            Mode::Binary => self.write_frame(DatumType::Message.tag(), msg).await,
            Mode::Text => {
                let mut line = msg.msg.clone().into_bytes();
                line.push(b'\r');
                self.conn.write_all(&line).await
            }
        }
    }

    pub async fn send_command(&self, cmd: &Command) -> Result<(), LinkError> {
        match self.current_send_mode() {
            Mode::Binary => self.write_frame(DatumType::Command.tag(), cmd).await,
            Mode::Text => self.write_text_command(&cmd.cmd, cmd.payload.first()).await,
        }
    }

    pub async fn send_status(&self, status: &Status) -> Result<(), LinkError> {
        match self.current_send_mode() {
            Mode::Binary => self.write_frame(DatumType::Status.tag(), status).await,
            Mode::Text => {
                let mut line = format!("{} {}", status.status, status.payload).into_bytes();
                line.push(b'\r');
                self.conn.write_all(&line).await
            }
        }
    }

    pub async fn send_roster(&self, roster: &Roster) -> Result<(), LinkError> {
        match self.current_send_mode() {
            Mode::Binary => self.write_frame(DatumType::Roster.tag(), roster).await,
            Mode::Text => Err(LinkError::NotRepresentable),
        }
    }

    pub async fn send_auth(&self, auth: &Auth) -> Result<(), LinkError> {
        match self.current_send_mode() {
            Mode::Binary => self.write_frame(DatumType::Auth.tag(), auth).await,
            Mode::Text => Err(LinkError::NotRepresentable),
        }
    }

    pub async fn send_auth_response(&self, resp: &AuthResponse) -> Result<(), LinkError> {
        match self.current_send_mode() {
            Mode::Binary => self.write_frame(DatumType::AuthResponse.tag(), resp).await,
            Mode::Text => Err(LinkError::NotRepresentable),
        }
    }

    pub async fn send_user(&self, user: &User) -> Result<(), LinkError> {
        match self.current_send_mode() {
            Mode::Binary => self.write_frame(DatumType::User.tag(), user).await,
            Mode::Text => Err(LinkError::NotRepresentable),
        }
    }

    /// Room events have no text-mode representation: they piggyback on the
    /// Command datum, whose text encoding only carries a single payload
    /// string.
    pub async fn send_room_event(&self, ev: &RoomEvent) -> Result<(), LinkError> {
        match self.current_send_mode() {
            Mode::Binary => {
                let cmd = room_event_to_command(ev);
                self.write_frame(DatumType::Command.tag(), &cmd).await
            }
            Mode::Text => Err(LinkError::NotRepresentable),
        }
    }

    /// Emit a switch command in the *current* send mode, then update
    /// `send_mode`. The peer must decode the switch in the mode it is
    /// currently in, so the transition only takes effect locally after the
    /// bytes are flushed.
    pub async fn set_send_mode(&self, mode: Mode) -> Result<(), LinkError> {
        let current = self.current_send_mode();
        if current == mode {
            return Ok(());
        }
        let token = match mode {
            Mode::Binary => Command::SWITCH_BINARY,
            Mode::Text => Command::SWITCH_TEXT,
        };
        match current {
            Mode::Binary => {
                let cmd = Command {
                    cmd: token.to_string(),
                    payload: Vec::new(),
                };
                self.write_frame(DatumType::Command.tag(), &cmd).await?;
            }
            Mode::Text => self.write_text_command(token, None).await?,
        }
        *self.send_mode.lock() = mode;
        Ok(())
    }

    /// Delivers one synchronous disconnect notice is the reader task's job
    /// on EOF/BYE; calling this directly just tears down the stream so
    /// further sends fail with `Closed`.
    pub fn close(&self) {
        self.conn.close();
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    fn current_send_mode(&self) -> Mode {
        *self.send_mode.lock()
    }

    async fn write_text_command(&self, token: &str, payload: Option<&String>) -> Result<(), LinkError> {
        if token.len() != 4 {
            return Err(LinkError::Decode(
                "text-mode command token must be exactly 4 bytes".to_string(),
            ));
        }
        let mut out = Vec::with_capacity(6 + payload.map(String::len).unwrap_or(0));
        out.push(0u8);
        out.extend_from_slice(token.as_bytes());
        if let Some(p) = payload {
            out.extend_from_slice(p.as_bytes());
        }
        out.push(b'\r');
        self.conn.write_all(&out).await
    }

    async fn write_frame<T: Serialize>(&self, tag: u8, value: &T) -> Result<(), LinkError> {
        let payload = rmp_serde::to_vec_named(value).map_err(|e| LinkError::Decode(e.to_string()))?;
        if payload.len() > u16::MAX as usize {
            return Err(LinkError::TooLarge);
        }
        let mut out = Vec::with_capacity(3 + payload.len());
        out.push(tag);
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&payload);
        trace!(tag, len = payload.len(), "writing binary frame");
        self.conn.write_all(&out).await
    }
}

fn header_bytes(mode: Mode) -> &'static [u8; 5] {
    match mode {
        Mode::Binary => &BINARY_HEADER,
        Mode::Text => &TEXT_HEADER,
    }
}

fn spawn(conn: Conn, send_mode: Mode, recv_mode: Mode) -> (Link, EventStream) {
    let (tx, rx) = mpsc::channel(64);
    let send_mode = Arc::new(Mutex::new(send_mode));
    let link = Link {
        conn: conn.clone(),
        send_mode,
    };
    tokio::spawn(reader_loop(conn, recv_mode, tx));
    (link, EventStream { rx })
}

/// What the reader loop should do after classifying one inbound Command.
enum CommandOutcome {
    ModeSwitch(Mode),
    Bye,
    Event(Event),
}

fn classify_command(cmd: Command) -> CommandOutcome {
    match cmd.cmd.as_str() {
        Command::SWITCH_TEXT => CommandOutcome::ModeSwitch(Mode::Text),
        Command::SWITCH_BINARY => CommandOutcome::ModeSwitch(Mode::Binary),
        Command::BYE => CommandOutcome::Bye,
        _ => match command_to_room_event(&cmd) {
            Some(RoomEvent::MemberJoin(mask)) => CommandOutcome::Event(Event::RoomMemberJoin(mask)),
            Some(RoomEvent::MemberPart {
                member,
                msg,
                has_quit,
            }) => CommandOutcome::Event(Event::RoomMemberPart {
                member,
                msg,
                has_quit,
            }),
            Some(RoomEvent::MemberList { room, members }) => {
                CommandOutcome::Event(Event::RoomMemberList { room, members })
            }
            None => CommandOutcome::Event(Event::Command(cmd)),
        },
    }
}

fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, LinkError> {
    rmp_serde::from_slice(payload).map_err(|e| LinkError::Decode(e.to_string()))
}

async fn reader_loop(conn: Conn, mut mode: Mode, tx: mpsc::Sender<Event>) {
    let mut text_buf: Vec<u8> = Vec::new();
    loop {
        let step = match mode {
            Mode::Binary => read_binary_step(&conn).await,
            Mode::Text => read_text_step(&conn, &mut text_buf).await,
        };

        match step {
            Ok(Some(StepOutcome::Event(ev))) => {
                if tx.send(ev).await.is_err() {
                    return;
                }
            }
            Ok(Some(StepOutcome::Dropped(msg))) => {
                warn!(%msg, "dropping undecodable datum");
                let _ = tx.send(Event::Text(msg)).await;
            }
            Ok(Some(StepOutcome::ModeSwitch(new_mode))) => {
                debug!(?new_mode, "peer switched receive mode");
                mode = new_mode;
            }
            Ok(Some(StepOutcome::Bye)) => {
                conn.close();
                let _ = tx.send(Event::Text("Disconnected: BYE".to_string())).await;
                let _ = tx.send(Event::Disconnect).await;
                return;
            }
            Ok(None) => {
                let _ = tx.send(Event::Text("Disconnected".to_string())).await;
                let _ = tx.send(Event::Disconnect).await;
                return;
            }
            Err(e) => {
                let _ = tx.send(Event::Text(e.to_string())).await;
                let _ = tx.send(Event::Disconnect).await;
                return;
            }
        }
    }
}

enum StepOutcome {
    Event(Event),
    Dropped(String),
    ModeSwitch(Mode),
    Bye,
}

async fn read_binary_step(conn: &Conn) -> Result<Option<StepOutcome>, LinkError> {
    let mut header = [0u8; 3];
    match conn.try_read_exact(&mut header).await? {
        ReadOutcome::CleanEof => return Ok(None),
        ReadOutcome::Truncated => return Err(LinkError::Truncated),
        ReadOutcome::Complete => {}
    }
    let tag = header[0];
    let len = u16::from_be_bytes([header[1], header[2]]) as usize;
    let mut payload = vec![0u8; len];
    match conn.try_read_exact(&mut payload).await? {
        ReadOutcome::Complete => {}
        _ => return Err(LinkError::Truncated),
    }
    trace!(tag, len, "read binary frame");

    let Some(dt) = DatumType::from_tag(tag) else {
        return Ok(Some(StepOutcome::Dropped(format!(
            "unknown datum type tag {tag}"
        ))));
    };

    let outcome = match dt {
        DatumType::Message => decode_payload::<Message>(&payload).map(Event::Message),
        DatumType::Status => decode_payload::<Status>(&payload).map(Event::Status),
        DatumType::Roster => decode_payload::<Roster>(&payload).map(Event::Roster),
        DatumType::Auth => decode_payload::<Auth>(&payload).map(Event::Auth),
        DatumType::AuthResponse => decode_payload::<AuthResponse>(&payload).map(Event::AuthResponse),
        DatumType::User => decode_payload::<User>(&payload).map(Event::User),
        DatumType::Command => {
            return match decode_payload::<Command>(&payload) {
                Ok(cmd) => Ok(Some(match classify_command(cmd) {
                    CommandOutcome::ModeSwitch(m) => StepOutcome::ModeSwitch(m),
                    CommandOutcome::Bye => StepOutcome::Bye,
                    CommandOutcome::Event(ev) => StepOutcome::Event(ev),
                })),
                Err(e) => Ok(Some(StepOutcome::Dropped(e.to_string()))),
            };
        }
    };

    match outcome {
        Ok(ev) => Ok(Some(StepOutcome::Event(ev))),
        Err(e) => Ok(Some(StepOutcome::Dropped(e.to_string()))),
    }
}

/// The text-mode receive buffer, parsed by delimiter rather than assuming
/// one read is one logical packet: `\r` for messages, and (per the revised
/// protocol) a `\r` terminator after the 4-byte token for commands too.
async fn read_text_step(conn: &Conn, buf: &mut Vec<u8>) -> Result<Option<StepOutcome>, LinkError> {
    loop {
        if let Some(item) = take_text_item(buf) {
            return Ok(Some(item));
        }

        let mut chunk = [0u8; 1500];
        let n = conn.read_some(&mut chunk).await?;
        if n == 0 {
            return if buf.is_empty() {
                Ok(None)
            } else {
                Err(LinkError::Truncated)
            };
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn take_text_item(buf: &mut Vec<u8>) -> Option<StepOutcome> {
    if buf.is_empty() {
        return None;
    }

    if buf[0] == 0 {
        if buf.len() < 5 {
            return None;
        }
        let terminator = buf[5..].iter().position(|&b| b == b'\r')?;
        let end = 5 + terminator;
        let token = String::from_utf8_lossy(&buf[1..5]).into_owned();
        let payload = String::from_utf8_lossy(&buf[5..end]).into_owned();
        let rest = buf.split_off(end + 1);
        *buf = rest;

        let cmd = Command {
            cmd: token,
            payload: if payload.is_empty() {
                Vec::new()
            } else {
                vec![payload]
            },
        };
        Some(match classify_command(cmd) {
            CommandOutcome::ModeSwitch(m) => StepOutcome::ModeSwitch(m),
            CommandOutcome::Bye => StepOutcome::Bye,
            CommandOutcome::Event(ev) => StepOutcome::Event(ev),
        })
    } else {
        let terminator = buf.iter().position(|&b| b == b'\r')?;
        let line = String::from_utf8_lossy(&buf[..terminator]).into_owned();
        let rest = buf.split_off(terminator + 1);
        *buf = rest;
        Some(StepOutcome::Event(Event::Message(Message {
            to: String::new(),
            from: String::new(),
            flags: Vec::new(),
            date: 0,
            msg: line,
        })))
    }
}
