use serde::{Deserialize, Serialize};

/// The closed set of binary-mode wire tags. Unknown tags are skipped, not
/// fatal: the payload length was already consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatumType {
    Auth = 0,
    AuthResponse = 1,
    Command = 2,
    Message = 3,
    Roster = 4,
    User = 5,
    Status = 6,
}

impl DatumType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(DatumType::Auth),
            1 => Some(DatumType::AuthResponse),
            2 => Some(DatumType::Command),
            3 => Some(DatumType::Message),
            4 => Some(DatumType::Roster),
            5 => Some(DatumType::User),
            6 => Some(DatumType::Status),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub to: String,
    pub from: String,
    pub flags: Vec<String>,
    /// Unix seconds; 0 means unset.
    pub date: i64,
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub cmd: String,
    pub payload: Vec<String>,
}

impl Command {
    /// Graceful-close sentinel. The trailing space distinguishes it from an
    /// ordinary four-letter token.
    pub const BYE: &'static str = "BYE ";
    pub const SWITCH_TEXT: &'static str = "TEXT";
    pub const SWITCH_BINARY: &'static str = "MPCK";

    /// Reserved tokens used to carry room events inside a Command datum.
    /// Room events have no wire tag of their own; they piggyback on Command
    /// the same way TEXT/MPCK/BYE do, and are intercepted by the reader
    /// loop before ever reaching the generic Command event.
    pub const ROOM_MEMBER_JOIN: &'static str = "RMJN";
    pub const ROOM_MEMBER_PART: &'static str = "RMPT";
    pub const ROOM_MEMBER_LIST: &'static str = "RMLS";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub status: i8,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub aliases: Vec<String>,
    pub key: Vec<u8>,
    pub last_seen: i64,
}

pub type Roster = Vec<User>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auth {
    pub date: i64,
    pub challenge: Vec<u8>,
    pub last_seen: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub challenge: Vec<u8>,
}

/// Child-only membership notifications. These never travel child-to-hub and
/// have no representation in text mode.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    MemberJoin(String),
    MemberPart {
        member: String,
        msg: String,
        has_quit: bool,
    },
    MemberList {
        room: String,
        members: Vec<String>,
    },
}

pub(crate) fn room_event_to_command(ev: &RoomEvent) -> Command {
    match ev {
        RoomEvent::MemberJoin(mask) => Command {
            cmd: Command::ROOM_MEMBER_JOIN.to_string(),
            payload: vec![mask.clone()],
        },
        RoomEvent::MemberPart {
            member,
            msg,
            has_quit,
        } => Command {
            cmd: Command::ROOM_MEMBER_PART.to_string(),
            payload: vec![
                member.clone(),
                msg.clone(),
                if *has_quit { "1" } else { "0" }.to_string(),
            ],
        },
        RoomEvent::MemberList { room, members } => {
            let mut payload = Vec::with_capacity(1 + members.len());
            payload.push(room.clone());
            payload.extend(members.iter().cloned());
            Command {
                cmd: Command::ROOM_MEMBER_LIST.to_string(),
                payload,
            }
        }
    }
}

pub(crate) fn command_to_room_event(cmd: &Command) -> Option<RoomEvent> {
    match cmd.cmd.as_str() {
        Command::ROOM_MEMBER_JOIN => cmd.payload.first().cloned().map(RoomEvent::MemberJoin),
        Command::ROOM_MEMBER_PART => {
            let member = cmd.payload.first()?.clone();
            let msg = cmd.payload.get(1).cloned().unwrap_or_default();
            let has_quit = cmd.payload.get(2).map(|s| s == "1").unwrap_or(false);
            Some(RoomEvent::MemberPart {
                member,
                msg,
                has_quit,
            })
        }
        Command::ROOM_MEMBER_LIST => {
            let room = cmd.payload.first()?.clone();
            let members = cmd.payload.get(1..).map(<[String]>::to_vec).unwrap_or_default();
            Some(RoomEvent::MemberList { room, members })
        }
        _ => None,
    }
}
