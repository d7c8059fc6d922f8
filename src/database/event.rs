use std::fmt;
use std::str::FromStr;

use crate::database::error::{invalid_argument, DatabaseError};

/// Kind of read a listener or one-shot query asks the engine for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    Value,
    ChildAdded,
    ChildChanged,
    ChildRemoved,
    ChildMoved,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Value => "value",
            EventType::ChildAdded => "child_added",
            EventType::ChildChanged => "child_changed",
            EventType::ChildRemoved => "child_removed",
            EventType::ChildMoved => "child_moved",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "value" => Ok(EventType::Value),
            "child_added" => Ok(EventType::ChildAdded),
            "child_changed" => Ok(EventType::ChildChanged),
            "child_removed" => Ok(EventType::ChildRemoved),
            "child_moved" => Ok(EventType::ChildMoved),
            other => Err(invalid_argument(format!("unknown event type '{other}'"))),
        }
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_names() {
        for event in [
            EventType::Value,
            EventType::ChildAdded,
            EventType::ChildChanged,
            EventType::ChildRemoved,
            EventType::ChildMoved,
        ] {
            assert_eq!(event.as_str().parse::<EventType>().unwrap(), event);
        }
        assert!("children".parse::<EventType>().is_err());
    }
}
