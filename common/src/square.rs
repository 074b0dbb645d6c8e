use std::fmt;
use std::str::FromStr;

/// A board coordinate. Rank and file are both `0..8`; on the wire a square
/// travels as its index `rank * 8 + file`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "u8", into = "u8")]
pub struct Square {
    rank: u8,
    file: u8,
}

impl Square {
    pub fn new(rank: u8, file: u8) -> Option<Square> {
        if rank < 8 && file < 8 {
            Some(Square { rank, file })
        } else {
            None
        }
    }

    pub fn from_index(index: u8) -> Option<Square> {
        if index < 64 {
            Some(Square {
                rank: index / 8,
                file: index % 8,
            })
        } else {
            None
        }
    }

    pub fn index(self) -> u8 {
        self.rank * 8 + self.file
    }

    pub fn rank(self) -> u8 {
        self.rank
    }

    pub fn file(self) -> u8 {
        self.file
    }

    /// The square `ranks` and `files` away, if it is still on the board.
    pub fn offset(self, ranks: i8, files: i8) -> Option<Square> {
        let rank = self.rank as i8 + ranks;
        let file = self.file as i8 + files;
        if (0..8).contains(&rank) && (0..8).contains(&file) {
            Some(Square {
                rank: rank as u8,
                file: file as u8,
            })
        } else {
            None
        }
    }

    /// All 64 squares in index order.
    pub fn all() -> impl Iterator<Item = Square> + Clone {
        (0..64u8).map(|index| Square {
            rank: index / 8,
            file: index % 8,
        })
    }
}

impl From<Square> for u8 {
    fn from(square: Square) -> u8 {
        square.index()
    }
}

impl TryFrom<u8> for Square {
    type Error = String;

    fn try_from(index: u8) -> Result<Square, String> {
        Square::from_index(index).ok_or_else(|| format!("square {} is off the board", index))
    }
}

impl FromStr for Square {
    type Err = String;

    fn from_str(s: &str) -> Result<Square, String> {
        let index: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("`{}` is not a square index", s))?;
        Square::try_from(index)
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}
