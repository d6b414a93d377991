//! UCI move parsing and the minimal FEN bookkeeping the server performs.
//!
//! The server never interprets positions. It parses UCI strings far enough
//! to store from/to squares, and when a client omits the post-move FEN it
//! flips the side-to-move field of the current one.

use thiserror::Error;

/// A parsed UCI move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UciMove {
    pub from: String,
    pub to: String,
    pub promotion: Option<char>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoveParseError {
    #[error("UCI string must be 4 or 5 characters, got {0}")]
    BadLength(usize),
    #[error("'{0}' is not a board square")]
    BadSquare(String),
    #[error("'{0}' is not a promotion piece")]
    BadPromotion(char),
}

/// Parse a UCI move string (`e2e4`, `e7e8q`).
pub fn parse_uci(uci: &str) -> Result<UciMove, MoveParseError> {
    let uci = uci.trim();
    if uci.len() != 4 && uci.len() != 5 {
        return Err(MoveParseError::BadLength(uci.len()));
    }

    let from = &uci[0..2];
    let to = &uci[2..4];
    for square in [from, to] {
        if !is_square(square) {
            return Err(MoveParseError::BadSquare(square.to_string()));
        }
    }

    let promotion = match uci.chars().nth(4) {
        Some(piece) => {
            let piece = piece.to_ascii_lowercase();
            if !matches!(piece, 'q' | 'r' | 'b' | 'n') {
                return Err(MoveParseError::BadPromotion(piece));
            }
            Some(piece)
        }
        None => None,
    };

    Ok(UciMove {
        from: from.to_ascii_lowercase(),
        to: to.to_ascii_lowercase(),
        promotion,
    })
}

fn is_square(s: &str) -> bool {
    let mut chars = s.chars();
    let (Some(file), Some(rank)) = (chars.next(), chars.next()) else {
        return false;
    };
    matches!(file.to_ascii_lowercase(), 'a'..='h') && matches!(rank, '1'..='8')
}

/// Toggle the side-to-move field (the second whitespace-separated field)
/// of a FEN string. A FEN without a second field is returned unchanged.
#[must_use]
pub fn flip_fen_turn(fen: &str) -> String {
    let mut fields: Vec<&str> = fen.split_whitespace().collect();
    match fields.get(1) {
        Some(&"w") => fields[1] = "b",
        Some(&"b") => fields[1] = "w",
        _ => return fen.to_string(),
    }
    fields.join(" ")
}
