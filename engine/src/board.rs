use std::fmt;

use common::{glyph, Piece, PieceColour, PieceKind, SerializedSquare, Square};

const BACK_RANK: [PieceKind; 8] = [
    PieceKind::Rook,
    PieceKind::Knight,
    PieceKind::Bishop,
    PieceKind::Queen,
    PieceKind::King,
    PieceKind::Bishop,
    PieceKind::Knight,
    PieceKind::Rook,
];

/// The 8x8 grid, indexed `[rank][file]`. Storage only; the rules live in
/// [`crate::rules`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board([[Option<Piece>; 8]; 8]);

impl Board {
    pub fn empty() -> Board {
        Board([[None; 8]; 8])
    }

    /// White's back rank on rank 0, pawns on ranks 1 and 6, Black's back
    /// rank on rank 7.
    pub fn starting_position() -> Board {
        let mut inner = [[None; 8]; 8];
        for (file, &kind) in BACK_RANK.iter().enumerate() {
            inner[0][file] = Some(Piece::new(kind, PieceColour::White));
            inner[1][file] = Some(Piece::new(PieceKind::Pawn, PieceColour::White));
            inner[6][file] = Some(Piece::new(PieceKind::Pawn, PieceColour::Black));
            inner[7][file] = Some(Piece::new(kind, PieceColour::Black));
        }
        Board(inner)
    }

    /// Parses a diagram of eight rows, rank 7 first. Uppercase letters are
    /// white pieces, lowercase black, `.` an empty square.
    pub fn from_layout(layout: &str) -> Option<Board> {
        let rows: Vec<&str> = layout
            .lines()
            .map(str::trim)
            .filter(|row| !row.is_empty())
            .collect();
        if rows.len() != 8 {
            return None;
        }

        let mut board = Board::empty();
        for (row, line) in rows.iter().enumerate() {
            let rank = 7 - row;
            let cells: Vec<char> = line.chars().filter(|c| !c.is_whitespace()).collect();
            if cells.len() != 8 {
                return None;
            }
            for (file, &cell) in cells.iter().enumerate() {
                board.0[rank][file] = match cell {
                    '.' => None,
                    letter => Some(Piece::from_letter(letter)?),
                };
            }
        }
        Some(board)
    }

    pub fn square_at(&self, square: Square) -> Option<Piece> {
        self.0[square.rank() as usize][square.file() as usize]
    }

    pub fn set_piece(&mut self, square: Square, piece: Option<Piece>) {
        self.0[square.rank() as usize][square.file() as usize] = piece;
    }

    /// Empties `square`, returning whatever stood there.
    pub fn take(&mut self, square: Square) -> Option<Piece> {
        self.0[square.rank() as usize][square.file() as usize].take()
    }

    /// Occupied squares in index order.
    pub fn pieces(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        Square::all().filter_map(move |square| self.square_at(square).map(|piece| (square, piece)))
    }

    pub fn serialize(&self) -> Vec<SerializedSquare> {
        Square::all()
            .map(|square| SerializedSquare {
                color: square_colour(square).to_owned(),
                piece: glyph(self.square_at(square)).to_owned(),
            })
            .collect()
    }
}

impl Default for Board {
    fn default() -> Board {
        Board::starting_position()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for row in self.0.iter().rev() {
            for square in row {
                write!(f, "{}", square.map_or('.', Piece::letter))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Background the client paints `square` with. Purely cosmetic.
pub fn square_colour(square: Square) -> &'static str {
    if (square.rank() + square.file()) % 2 == 0 {
        "white/35"
    } else {
        "white/15"
    }
}
