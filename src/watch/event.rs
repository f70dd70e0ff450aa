use std::fmt;
use std::str::FromStr;

use super::Error;

/// File event types understood by the watcher executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Access,
    Modify,
    Attrib,
    Open,
    Close,
    Create,
    Delete,
    Move,
    All,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::Access,
        EventKind::Modify,
        EventKind::Attrib,
        EventKind::Open,
        EventKind::Close,
        EventKind::Create,
        EventKind::Delete,
        EventKind::Move,
        EventKind::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Access => "access",
            EventKind::Modify => "modify",
            EventKind::Attrib => "attrib",
            EventKind::Open => "open",
            EventKind::Close => "close",
            EventKind::Create => "create",
            EventKind::Delete => "delete",
            EventKind::Move => "move",
            EventKind::All => "all",
        }
    }
}

impl FromStr for EventKind {
    type Err = Error;

    /// Parses an event name, ignoring ASCII case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnknownEvent(s.to_owned()))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
