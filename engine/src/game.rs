//! One room's game: the board, who plays which colour, and whose turn it is.

use common::{Action, ParticipantId, Piece, PieceColour, PieceKind};
use thiserror::Error;

use crate::board::Board;
use crate::check;
use crate::rules::{self, Castle};

pub const MAX_PLAYERS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    AwaitingSecondPlayer,
    Active,
    Finished { winner: PieceColour },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    #[error("room full")]
    RoomFull,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MoveError {
    #[error("waiting for opponent")]
    NotStarted,
    #[error("game is over")]
    GameOver,
    #[error("user is not in the room")]
    NotInRoom,
    #[error("not your piece")]
    NotYourPiece,
    #[error("not your turn")]
    NotYourTurn,
    #[error("illegal move")]
    Illegal,
    #[error("cannot move into check")]
    IntoCheck,
    #[error("king is in check")]
    KingInCheck,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResetError {
    #[error("reset denied, not enough players")]
    NotEnoughPlayers,
    #[error("no reset pending")]
    NothingPending,
    #[error("cannot acknowledge own reset")]
    OwnProposal,
    #[error("user is not in the room")]
    NotInRoom,
}

/// Everything a successful move changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub action: Action,
    pub moved: Piece,
    pub taken: Option<Piece>,
    pub castle: Option<Castle>,
    /// Set when the move mated the opponent.
    pub winner: Option<PieceColour>,
}

#[derive(Debug, Clone)]
pub struct Match {
    board: Board,
    players: Vec<(ParticipantId, PieceColour)>,
    turn: PieceColour,
    state: MatchState,
    pending_reset: Option<ParticipantId>,
}

impl Match {
    /// A fresh game whose creator plays white.
    pub fn new(first: ParticipantId) -> Match {
        Match {
            board: Board::starting_position(),
            players: vec![(first, PieceColour::White)],
            turn: PieceColour::White,
            state: MatchState::AwaitingSecondPlayer,
            pending_reset: None,
        }
    }

    /// A game between two seated players resumed from an arbitrary position.
    pub fn from_position(
        white: ParticipantId,
        black: ParticipantId,
        board: Board,
        turn: PieceColour,
    ) -> Match {
        Match {
            board,
            players: vec![(white, PieceColour::White), (black, PieceColour::Black)],
            turn,
            state: MatchState::Active,
            pending_reset: None,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn turn(&self) -> PieceColour {
        self.turn
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    pub fn participants(&self) -> impl Iterator<Item = (ParticipantId, PieceColour)> + '_ {
        self.players.iter().copied()
    }

    pub fn colour_of(&self, participant: ParticipantId) -> Option<PieceColour> {
        self.players
            .iter()
            .find(|&&(id, _)| id == participant)
            .map(|&(_, colour)| colour)
    }

    /// Seats the second player as black and starts the game.
    pub fn join(&mut self, participant: ParticipantId) -> Result<PieceColour, JoinError> {
        if self.is_full() {
            return Err(JoinError::RoomFull);
        }
        self.players.push((participant, PieceColour::Black));
        if self.state == MatchState::AwaitingSecondPlayer {
            self.state = MatchState::Active;
        }
        Ok(PieceColour::Black)
    }

    /// Validates and performs one move. Rejections leave the game untouched.
    pub fn play(
        &mut self,
        participant: ParticipantId,
        action: Action,
    ) -> Result<MoveOutcome, MoveError> {
        match self.state {
            MatchState::AwaitingSecondPlayer => return Err(MoveError::NotStarted),
            MatchState::Finished { .. } => return Err(MoveError::GameOver),
            MatchState::Active => {}
        }

        let colour = self.colour_of(participant).ok_or(MoveError::NotInRoom)?;
        let Action { from, to } = action;

        let moved = match self.board.square_at(from) {
            Some(piece) if piece.colour == colour => piece,
            _ => return Err(MoveError::NotYourPiece),
        };
        if self.turn != colour {
            return Err(MoveError::NotYourTurn);
        }
        if !rules::is_legal(&self.board, from, to) {
            return Err(MoveError::Illegal);
        }
        if !check::leaves_king_safe(&self.board, from, to) {
            return Err(if moved.kind == PieceKind::King {
                MoveError::IntoCheck
            } else {
                MoveError::KingInCheck
            });
        }

        let applied = rules::apply(&mut self.board, from, to);
        debug!("{} played {} with {:?}", colour, action, moved.kind);
        self.turn = colour.opponent();
        self.pending_reset = None;

        let winner = if check::is_checkmate(&self.board, colour.opponent()) {
            self.state = MatchState::Finished { winner: colour };
            Some(colour)
        } else {
            None
        };

        Ok(MoveOutcome {
            action,
            moved,
            taken: applied.taken,
            castle: applied.castle,
            winner,
        })
    }

    /// First half of a reset: needs both players connected. The proposal
    /// stands until the other player acknowledges it or a move is made.
    pub fn propose_reset(
        &mut self,
        participant: ParticipantId,
        connected: usize,
    ) -> Result<(), ResetError> {
        if self.colour_of(participant).is_none() {
            return Err(ResetError::NotInRoom);
        }
        if connected < MAX_PLAYERS {
            return Err(ResetError::NotEnoughPlayers);
        }
        self.pending_reset = Some(participant);
        Ok(())
    }

    /// Second half of a reset: restores the starting position, keeping seats
    /// and colours.
    pub fn acknowledge_reset(&mut self, participant: ParticipantId) -> Result<(), ResetError> {
        if self.colour_of(participant).is_none() {
            return Err(ResetError::NotInRoom);
        }
        match self.pending_reset {
            None => Err(ResetError::NothingPending),
            Some(proposer) if proposer == participant => Err(ResetError::OwnProposal),
            Some(_) => {
                self.reset();
                Ok(())
            }
        }
    }

    pub fn reset_pending(&self) -> bool {
        self.pending_reset.is_some()
    }

    fn reset(&mut self) {
        self.board = Board::starting_position();
        self.turn = PieceColour::White;
        self.pending_reset = None;
        self.state = if self.is_full() {
            MatchState::Active
        } else {
            MatchState::AwaitingSecondPlayer
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Square;

    fn action(from: u8, to: u8) -> Action {
        Action {
            from: Square::from_index(from).unwrap(),
            to: Square::from_index(to).unwrap(),
        }
    }

    fn seated() -> (Match, ParticipantId, ParticipantId) {
        let white = ParticipantId::new();
        let black = ParticipantId::new();
        let mut game = Match::new(white);
        game.join(black).unwrap();
        (game, white, black)
    }

    #[test]
    fn creator_plays_white_and_waits() {
        let white = ParticipantId::new();
        let mut game = Match::new(white);
        assert_eq!(game.colour_of(white), Some(PieceColour::White));
        assert_eq!(game.state(), MatchState::AwaitingSecondPlayer);
        assert_eq!(game.play(white, action(12, 28)), Err(MoveError::NotStarted));
        assert_eq!(game.board(), &Board::starting_position());
    }

    #[test]
    fn second_player_is_black_and_third_is_turned_away() {
        let (mut game, _, black) = seated();
        assert_eq!(game.colour_of(black), Some(PieceColour::Black));
        assert_eq!(game.state(), MatchState::Active);

        let before = game.participants().collect::<Vec<_>>();
        assert_eq!(game.join(ParticipantId::new()), Err(JoinError::RoomFull));
        assert_eq!(game.participants().collect::<Vec<_>>(), before);
    }

    #[test]
    fn validation_order() {
        let (mut game, white, black) = seated();
        let stranger = ParticipantId::new();

        assert_eq!(game.play(stranger, action(12, 28)), Err(MoveError::NotInRoom));
        assert_eq!(game.play(white, action(52, 44)), Err(MoveError::NotYourPiece));
        assert_eq!(game.play(white, action(28, 36)), Err(MoveError::NotYourPiece));
        assert_eq!(game.play(black, action(52, 44)), Err(MoveError::NotYourTurn));
        assert_eq!(game.play(white, action(12, 36)), Err(MoveError::Illegal));
        assert_eq!(game.board(), &Board::starting_position());
        assert_eq!(game.turn(), PieceColour::White);
    }

    #[test]
    fn turns_alternate() {
        let (mut game, white, black) = seated();
        game.play(white, action(12, 28)).unwrap();
        assert_eq!(game.turn(), PieceColour::Black);
        assert_eq!(game.play(white, action(11, 27)), Err(MoveError::NotYourTurn));
        game.play(black, action(52, 36)).unwrap();
        assert_eq!(game.turn(), PieceColour::White);
    }

    #[test]
    fn king_cannot_step_into_check() {
        let white = ParticipantId::new();
        let black = ParticipantId::new();
        let mut game = Match::new(white);
        game.join(black).unwrap();
        game.board = Board::from_layout(
            "
            ...rk...
            ........
            ........
            ........
            ........
            ........
            ........
            ....K...
            ",
        )
        .unwrap();
        let before = game.board.clone();

        assert_eq!(game.play(white, action(4, 3)), Err(MoveError::IntoCheck));
        assert_eq!(game.board, before);
        assert!(game.play(white, action(4, 5)).is_ok());
    }

    #[test]
    fn successful_move_cancels_a_reset_proposal() {
        let (mut game, white, black) = seated();
        game.propose_reset(black, 2).unwrap();
        assert!(game.reset_pending());
        game.play(white, action(12, 28)).unwrap();
        assert!(!game.reset_pending());
        assert_eq!(game.acknowledge_reset(white), Err(ResetError::NothingPending));
    }

    #[test]
    fn reset_needs_two_connected_players_and_the_other_players_ack() {
        let (mut game, white, black) = seated();
        game.play(white, action(12, 28)).unwrap();

        assert_eq!(
            game.propose_reset(white, 1),
            Err(ResetError::NotEnoughPlayers)
        );
        assert_eq!(game.acknowledge_reset(black), Err(ResetError::NothingPending));

        game.propose_reset(white, 2).unwrap();
        assert_eq!(game.acknowledge_reset(white), Err(ResetError::OwnProposal));
        assert_ne!(game.board(), &Board::starting_position());

        game.acknowledge_reset(black).unwrap();
        assert_eq!(game.board(), &Board::starting_position());
        assert_eq!(game.turn(), PieceColour::White);
        assert_eq!(game.colour_of(white), Some(PieceColour::White));
        assert_eq!(game.colour_of(black), Some(PieceColour::Black));
        assert_eq!(game.state(), MatchState::Active);
    }

    #[test]
    fn outsiders_cannot_reset() {
        let (mut game, _, _) = seated();
        let stranger = ParticipantId::new();
        assert_eq!(game.propose_reset(stranger, 2), Err(ResetError::NotInRoom));
        assert_eq!(game.acknowledge_reset(stranger), Err(ResetError::NotInRoom));
    }
}
