use crate::datum::{Auth, AuthResponse, Command, Message, Roster, Status, User};

/// Everything a Link's reader task can deliver, on one channel, in the
/// exact order frames appeared on the wire. Replaces a set of seven
/// separately-registered callbacks with a single sum type.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Message(Message),
    Command(Command),
    Status(Status),
    Roster(Roster),
    Auth(Auth),
    AuthResponse(AuthResponse),
    User(User),
    /// Operator-visibility text: decode errors, disconnect descriptions,
    /// and the synthetic `"Disconnected"` / `"Disconnected: BYE"` notices.
    Text(String),
    Disconnect,
    RoomMemberJoin(String),
    RoomMemberPart {
        member: String,
        msg: String,
        has_quit: bool,
    },
    RoomMemberList {
        room: String,
        members: Vec<String>,
    },
}
