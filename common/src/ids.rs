use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Identifier of one chess room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomId(Uuid);

/// Identifier of one player's seat in a room; it outlives the player's
/// connection so that they can reconnect to the same colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticipantId(Uuid);

macro_rules! uuid_id {
    ($name:ident) => {
        impl $name {
            pub fn new() -> $name {
                $name(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> $name {
                $name::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<$name, uuid::Error> {
                Uuid::parse_str(s).map($name)
            }
        }
    };
}

uuid_id!(RoomId);
uuid_id!(ParticipantId);
