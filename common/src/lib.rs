#[macro_use]
extern crate serde_derive;

mod ids;
mod piece;
pub mod protocol;
mod square;

pub use ids::{ParticipantId, RoomId};
pub use piece::{glyph, Piece, PieceColour, PieceKind};
pub use protocol::{
    Action, Command, Envelope, Inbound, MoveContext, Outbound, ProtocolError, RoomReply,
    SerializedSquare, StateChange,
};
pub use square::Square;
