//! Per-piece move legality.
//!
//! Everything here is a pure function of the board; nothing is mutated except
//! by [`apply`], which must only be handed moves that [`is_legal`] accepted.

use common::{Piece, PieceKind, Square};

use crate::board::Board;
use crate::check;

/// King and rook squares before and after a castle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Castle {
    pub king_from: Square,
    pub rook_from: Square,
    pub king_to: Square,
    pub rook_to: Square,
}

/// What [`apply`] did to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub taken: Option<Piece>,
    pub castle: Option<Castle>,
}

fn deltas(from: Square, to: Square) -> (i8, i8) {
    (
        to.rank() as i8 - from.rank() as i8,
        to.file() as i8 - from.file() as i8,
    )
}

/// True if any square strictly between `start` and `stop` is occupied.
/// Squares that do not share a rank, file or diagonal have nothing between them.
pub fn piece_between(board: &Board, start: Square, stop: Square) -> bool {
    let (dx, dy) = deltas(start, stop);
    if !(dx == 0 || dy == 0 || dx.abs() == dy.abs()) {
        return false;
    }

    let (step_rank, step_file) = (dx.signum(), dy.signum());
    let mut current = start.offset(step_rank, step_file);
    while let Some(square) = current {
        if square == stop {
            break;
        }
        if board.square_at(square).is_some() {
            trace!("Collision at {} between {} and {}", square, start, stop);
            return true;
        }
        current = square.offset(step_rank, step_file);
    }
    false
}

/// Whether `piece` on `from` bears on `to` through its own geometry with a
/// clear path, whatever stands on `to`. Pawns bear diagonally forward only;
/// pushes and castling never threaten anything.
pub(crate) fn threatens(board: &Board, piece: Piece, from: Square, to: Square) -> bool {
    let (dx, dy) = deltas(from, to);
    let straight = (dx == 0) != (dy == 0);
    let diagonal = dx != 0 && dx.abs() == dy.abs();

    match piece.kind {
        PieceKind::Pawn => dx == piece.colour.forward() && dy.abs() == 1,
        PieceKind::Rook => straight && !piece_between(board, from, to),
        PieceKind::Knight => matches!((dx.abs(), dy.abs()), (2, 1) | (1, 2)),
        PieceKind::Bishop => diagonal && !piece_between(board, from, to),
        PieceKind::Queen => (straight || diagonal) && !piece_between(board, from, to),
        PieceKind::King => dx.abs() <= 1 && dy.abs() <= 1 && (dx, dy) != (0, 0),
    }
}

fn pawn_move(board: &Board, piece: Piece, from: Square, to: Square) -> bool {
    let (dx, dy) = deltas(from, to);
    let forward = piece.colour.forward();
    let target = board.square_at(to);

    if dy == 0 {
        if target.is_some() {
            trace!("Pawn on {} cannot capture straight ahead", from);
            return false;
        }
        dx == forward
            || (dx == 2 * forward
                && from.rank() == piece.colour.pawn_rank()
                && !piece_between(board, from, to))
    } else if dx == forward && dy.abs() == 1 {
        if target.is_none() {
            trace!("Pawn on {} can only move diagonally when capturing", from);
        }
        target.is_some()
    } else {
        trace!("Pawns cannot move like that");
        false
    }
}

/// Recognises a castle: the king dragged onto its own home rook, or a home
/// rook dragged onto its king. Only returns the castle if it is legal right
/// now, i.e. both pieces are on their home squares, nothing stands between
/// them and neither the king's square nor its landing square is attacked.
pub fn castle_squares(board: &Board, from: Square, to: Square) -> Option<Castle> {
    let mover = board.square_at(from)?;
    let partner = board.square_at(to)?;
    if mover.colour != partner.colour {
        return None;
    }

    let (king_from, rook_from) = match (mover.kind, partner.kind) {
        (PieceKind::King, PieceKind::Rook) => (from, to),
        (PieceKind::Rook, PieceKind::King) => (to, from),
        _ => return None,
    };

    let colour = mover.colour;
    let home = colour.home_rank();
    if king_from != Square::new(home, 4)? || rook_from.rank() != home {
        return None;
    }

    let (king_file, rook_file) = match rook_from.file() {
        7 => (6, 5),
        0 => (2, 3),
        _ => return None,
    };

    if piece_between(board, king_from, rook_from) {
        trace!("Castle rejected as the back rank is not clear");
        return None;
    }

    let king_to = Square::new(home, king_file)?;
    let rook_to = Square::new(home, rook_file)?;
    let enemy = colour.opponent();
    if check::is_attacked(board, king_from, enemy) || check::is_attacked(board, king_to, enemy) {
        trace!("Castle rejected as the king would pass through check");
        return None;
    }

    Some(Castle {
        king_from,
        rook_from,
        king_to,
        rook_to,
    })
}

/// Returns true if the piece on `from` may move to `to`, ignoring whether the
/// move leaves its own king attacked.
pub fn is_legal(board: &Board, from: Square, to: Square) -> bool {
    let piece = match board.square_at(from) {
        Some(piece) => piece,
        None => {
            trace!("Cannot move from {} as there is no piece there", from);
            return false;
        }
    };

    if from == to {
        trace!("Move rejected as {} is both source and destination", from);
        return false;
    }

    if castle_squares(board, from, to).is_some() {
        return true;
    }

    if board
        .square_at(to)
        .map_or(false, |target| target.colour == piece.colour)
    {
        trace!("Cannot take your own piece");
        return false;
    }

    match piece.kind {
        PieceKind::Pawn => pawn_move(board, piece, from, to),
        _ => threatens(board, piece, from, to),
    }
}

/// Performs an accepted move. Castles relocate king and rook together;
/// everything else moves one piece, removing whatever stood on `to`.
pub fn apply(board: &mut Board, from: Square, to: Square) -> Applied {
    if let Some(castle) = castle_squares(board, from, to) {
        let king = board.take(castle.king_from);
        let rook = board.take(castle.rook_from);
        board.set_piece(castle.king_to, king);
        board.set_piece(castle.rook_to, rook);
        return Applied {
            taken: None,
            castle: Some(castle),
        };
    }

    let moving = board.take(from);
    let taken = board.take(to);
    board.set_piece(to, moving);
    Applied {
        taken,
        castle: None,
    }
}
