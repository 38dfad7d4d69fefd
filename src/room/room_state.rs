use std::fmt;

/// RoomState indicates the progress of the local peer in the room.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RoomState {
    #[default]
    Unspecified,

    /// RoomState::New indicates the room was built but join() was not
    /// called yet, or the last join() failed.
    New,

    /// RoomState::Joining indicates join() is in progress.
    Joining,

    /// RoomState::Joined indicates the peer is in the room and transports
    /// and producers may be created.
    Joined,

    /// RoomState::Closed indicates the room was left or closed by the
    /// router. It is terminal.
    Closed,
}

const ROOM_STATE_NEW_STR: &str = "new";
const ROOM_STATE_JOINING_STR: &str = "joining";
const ROOM_STATE_JOINED_STR: &str = "joined";
const ROOM_STATE_CLOSED_STR: &str = "closed";

impl From<&str> for RoomState {
    fn from(raw: &str) -> Self {
        match raw {
            ROOM_STATE_NEW_STR => RoomState::New,
            ROOM_STATE_JOINING_STR => RoomState::Joining,
            ROOM_STATE_JOINED_STR => RoomState::Joined,
            ROOM_STATE_CLOSED_STR => RoomState::Closed,
            _ => RoomState::Unspecified,
        }
    }
}

impl From<u8> for RoomState {
    fn from(v: u8) -> Self {
        match v {
            1 => RoomState::New,
            2 => RoomState::Joining,
            3 => RoomState::Joined,
            4 => RoomState::Closed,
            _ => RoomState::Unspecified,
        }
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RoomState::New => ROOM_STATE_NEW_STR,
            RoomState::Joining => ROOM_STATE_JOINING_STR,
            RoomState::Joined => ROOM_STATE_JOINED_STR,
            RoomState::Closed => ROOM_STATE_CLOSED_STR,
            RoomState::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}
