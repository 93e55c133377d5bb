use std::fmt;

/// Errors surfaced at the Link boundary.
///
/// `BadHeader` and `Closed` are terminal for a Link. The rest are reported
/// through the text event for the affected datum but do not desynchronize
/// framing — the length prefix is always consumed before the payload is
/// interpreted.
#[derive(Debug)]
pub enum LinkError {
    BadHeader,
    Truncated,
    Decode(String),
    TooLarge,
    NotRepresentable,
    Closed,
    Io(std::io::Error),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::BadHeader => write!(f, "handshake did not match a known mode header"),
            LinkError::Truncated => write!(f, "stream ended mid-frame"),
            LinkError::Decode(msg) => write!(f, "failed to decode payload: {msg}"),
            LinkError::TooLarge => write!(f, "payload exceeds 65535 bytes"),
            LinkError::NotRepresentable => write!(f, "datum has no text-mode encoding"),
            LinkError::Closed => write!(f, "link is closed"),
            LinkError::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LinkError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        LinkError::Io(e)
    }
}
