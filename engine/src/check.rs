use common::{PieceColour, PieceKind, Square};
use itertools::Itertools;

use crate::board::Board;
use crate::rules;

const NEIGHBOURS: [(i8, i8); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Whether the piece on `from` threatens `to`, whatever stands there.
pub fn attacks(board: &Board, from: Square, to: Square) -> bool {
    match board.square_at(from) {
        Some(piece) => from != to && rules::threatens(board, piece, from, to),
        None => false,
    }
}

/// Whether any piece of colour `by` threatens `square`.
pub fn is_attacked(board: &Board, square: Square, by: PieceColour) -> bool {
    board
        .pieces()
        .filter(|&(_, piece)| piece.colour == by)
        .any(|(from, _)| attacks(board, from, square))
}

/// True iff some piece of the other colour to the one on `square` has a
/// legal move onto it. An empty square is never in check.
pub fn is_in_check(board: &Board, square: Square) -> bool {
    let defender = match board.square_at(square) {
        Some(piece) => piece,
        None => return false,
    };
    board
        .pieces()
        .filter(|&(_, piece)| piece.colour != defender.colour)
        .any(|(from, _)| rules::is_legal(board, from, square))
}

pub fn where_is_king(board: &Board, colour: PieceColour) -> Option<Square> {
    board
        .pieces()
        .find(|&(_, piece)| piece.kind == PieceKind::King && piece.colour == colour)
        .map(|(square, _)| square)
}

/// Plays `from -> to` on a copy of the board and reports whether the mover's
/// king is unattacked afterwards.
pub fn leaves_king_safe(board: &Board, from: Square, to: Square) -> bool {
    let mover = match board.square_at(from) {
        Some(piece) => piece,
        None => return false,
    };

    let mut after = board.clone();
    rules::apply(&mut after, from, to);
    match where_is_king(&after, mover.colour) {
        Some(king) => !is_attacked(&after, king, mover.colour.opponent()),
        None => false,
    }
}

/// `colour` is in check and no legal move, king step or otherwise, gets it
/// out of check.
pub fn is_checkmate(board: &Board, colour: PieceColour) -> bool {
    let king = match where_is_king(board, colour) {
        Some(king) => king,
        None => return false,
    };
    if !is_in_check(board, king) {
        return false;
    }

    let king_escapes = NEIGHBOURS
        .iter()
        .filter_map(|&(ranks, files)| king.offset(ranks, files))
        .any(|to| rules::is_legal(board, king, to) && leaves_king_safe(board, king, to));
    if king_escapes {
        debug!("{} king can step out of check", colour);
        return false;
    }

    let defenders: Vec<Square> = board
        .pieces()
        .filter(|&(_, piece)| piece.colour == colour && piece.kind != PieceKind::King)
        .map(|(square, _)| square)
        .collect();

    match defenders
        .into_iter()
        .cartesian_product(Square::all())
        .find(|&(from, to)| rules::is_legal(board, from, to) && leaves_king_safe(board, from, to))
    {
        Some((from, to)) => {
            debug!("Check on {} can be answered by {} -> {}", colour, from, to);
            false
        }
        None => {
            info!("Checkmate. Winner {}", colour.opponent());
            true
        }
    }
}
