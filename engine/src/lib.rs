#[macro_use]
extern crate log;

pub mod board;
pub mod check;
pub mod game;
pub mod rules;

pub use board::Board;
pub use check::{is_attacked, is_checkmate, is_in_check, where_is_king};
pub use game::{JoinError, Match, MatchState, MoveError, MoveOutcome, ResetError};
pub use rules::{is_legal, Castle};
