use std::fmt;

#[derive(Debug)]
pub enum HubError {
    Connect(String),
    Spawn(String),
    Link(linkhub_link::LinkError),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::Connect(msg) => write!(f, "failed to connect upstream: {msg}"),
            HubError::Spawn(msg) => write!(f, "failed to spawn child process: {msg}"),
            HubError::Link(e) => write!(f, "link error: {e}"),
        }
    }
}

impl std::error::Error for HubError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HubError::Link(e) => Some(e),
            _ => None,
        }
    }
}

impl From<linkhub_link::LinkError> for HubError {
    fn from(e: linkhub_link::LinkError) -> Self {
        HubError::Link(e)
    }
}
