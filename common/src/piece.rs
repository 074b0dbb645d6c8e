use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    Pawn,
    Rook,
    Knight,
    Bishop,
    Queen,
    King,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PieceColour {
    White,
    Black,
}

impl PieceColour {
    pub fn opponent(self) -> PieceColour {
        match self {
            PieceColour::White => PieceColour::Black,
            PieceColour::Black => PieceColour::White,
        }
    }

    /// Rank holding this colour's king and rooks at the start of a game.
    pub fn home_rank(self) -> u8 {
        match self {
            PieceColour::White => 0,
            PieceColour::Black => 7,
        }
    }

    /// Rank this colour's pawns start on, the only rank they may double-step from.
    pub fn pawn_rank(self) -> u8 {
        match self {
            PieceColour::White => 1,
            PieceColour::Black => 6,
        }
    }

    /// Rank delta of a single pawn step.
    pub fn forward(self) -> i8 {
        match self {
            PieceColour::White => 1,
            PieceColour::Black => -1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PieceColour::White => "white",
            PieceColour::Black => "black",
        }
    }
}

impl fmt::Display for PieceColour {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Piece {
    pub kind: PieceKind,
    pub colour: PieceColour,
}

const KIND_MASK: u8 = 0b0111;
const COLOUR_BIT: u8 = 0b1000;

impl Piece {
    pub const fn new(kind: PieceKind, colour: PieceColour) -> Piece {
        Piece { kind, colour }
    }

    /// Packed form: kind in the low three bits, black flagged by `0b1000`.
    pub fn to_bits(self) -> u8 {
        let kind = match self.kind {
            PieceKind::Pawn => 0b0001,
            PieceKind::Rook => 0b0010,
            PieceKind::Knight => 0b0011,
            PieceKind::Bishop => 0b0100,
            PieceKind::Queen => 0b0101,
            PieceKind::King => 0b0110,
        };
        match self.colour {
            PieceColour::White => kind,
            PieceColour::Black => kind | COLOUR_BIT,
        }
    }

    /// Inverse of [`Piece::to_bits`]. Zero and unused codes yield `None`,
    /// so an empty square can never carry a colour.
    pub fn from_bits(bits: u8) -> Option<Piece> {
        let kind = match bits & KIND_MASK {
            0b0001 => PieceKind::Pawn,
            0b0010 => PieceKind::Rook,
            0b0011 => PieceKind::Knight,
            0b0100 => PieceKind::Bishop,
            0b0101 => PieceKind::Queen,
            0b0110 => PieceKind::King,
            _ => return None,
        };
        if bits & !(KIND_MASK | COLOUR_BIT) != 0 {
            return None;
        }
        let colour = if bits & COLOUR_BIT == 0 {
            PieceColour::White
        } else {
            PieceColour::Black
        };
        Some(Piece { kind, colour })
    }

    /// Diagram letter, uppercase for white.
    pub fn letter(self) -> char {
        let letter = match self.kind {
            PieceKind::Pawn => 'p',
            PieceKind::Rook => 'r',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        };
        match self.colour {
            PieceColour::White => letter.to_ascii_uppercase(),
            PieceColour::Black => letter,
        }
    }

    pub fn from_letter(letter: char) -> Option<Piece> {
        let kind = match letter.to_ascii_lowercase() {
            'p' => PieceKind::Pawn,
            'r' => PieceKind::Rook,
            'n' => PieceKind::Knight,
            'b' => PieceKind::Bishop,
            'q' => PieceKind::Queen,
            'k' => PieceKind::King,
            _ => return None,
        };
        let colour = if letter.is_ascii_uppercase() {
            PieceColour::White
        } else {
            PieceColour::Black
        };
        Some(Piece { kind, colour })
    }

    /// Key of the image the browser client draws for this piece.
    pub fn glyph(self) -> &'static str {
        match (self.colour, self.kind) {
            (PieceColour::Black, PieceKind::Pawn) => "c/c7/Chess_pdt45.svg",
            (PieceColour::Black, PieceKind::Rook) => "f/ff/Chess_rdt45.svg",
            (PieceColour::Black, PieceKind::Knight) => "e/ef/Chess_ndt45.svg",
            (PieceColour::Black, PieceKind::Bishop) => "9/98/Chess_bdt45.svg",
            (PieceColour::Black, PieceKind::Queen) => "4/47/Chess_qdt45.svg",
            (PieceColour::Black, PieceKind::King) => "f/f0/Chess_kdt45.svg",
            (PieceColour::White, PieceKind::Pawn) => "4/45/Chess_plt45.svg",
            (PieceColour::White, PieceKind::Rook) => "7/72/Chess_rlt45.svg",
            (PieceColour::White, PieceKind::Knight) => "7/70/Chess_nlt45.svg",
            (PieceColour::White, PieceKind::Bishop) => "b/b1/Chess_blt45.svg",
            (PieceColour::White, PieceKind::Queen) => "1/15/Chess_qlt45.svg",
            (PieceColour::White, PieceKind::King) => "4/42/Chess_klt45.svg",
        }
    }
}

/// Glyph key for a square's occupant; empty squares render as `""`.
pub fn glyph(piece: Option<Piece>) -> &'static str {
    piece.map_or("", Piece::glyph)
}
