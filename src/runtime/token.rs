use std::fmt;
use std::hash::{Hash, Hasher};

use strum::{Display, EnumIter};

/// The kind of runtime entity a [`Token`] refers to, stored in the token's high byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[repr(u8)]
pub enum TokenKind {
    /// A type (class or interface)
    Type = 0x02,
    /// A field
    Field = 0x04,
    /// A method, constructor or type initializer
    Method = 0x06,
    /// An event
    Event = 0x14,
    /// A property
    Property = 0x17,
}

impl TokenKind {
    /// Maps a raw table byte back to a `TokenKind`
    #[must_use]
    pub fn from_table(table: u8) -> Option<Self> {
        match table {
            0x02 => Some(TokenKind::Type),
            0x04 => Some(TokenKind::Field),
            0x06 => Some(TokenKind::Method),
            0x14 => Some(TokenKind::Event),
            0x17 => Some(TokenKind::Property),
            _ => None,
        }
    }
}

/// A token identifying one runtime entity inside a [`crate::runtime::TypeRegistry`].
///
/// Tokens consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the entity kind
/// - The low 24 bits (bits 0-23) are a per-kind sequence number
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token from its kind and row
    #[must_use]
    pub fn from_parts(kind: TokenKind, row: u32) -> Self {
        Token(((kind as u32) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Returns the kind of entity this token refers to
    #[must_use]
    pub fn kind(&self) -> Option<TokenKind> {
        TokenKind::from_table(self.table())
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_token_from_parts() {
        let token = Token::from_parts(TokenKind::Method, 7);
        assert_eq!(token.value(), 0x06000007);
        assert_eq!(token.kind(), Some(TokenKind::Method));
        assert_eq!(token.row(), 7);
    }

    #[test]
    fn test_token_row_is_masked() {
        let token = Token::from_parts(TokenKind::Type, 0x0100_0001);
        assert_eq!(token.table(), 0x02);
        assert_eq!(token.row(), 1);
    }

    #[test]
    fn test_token_kind_round_trip() {
        for kind in TokenKind::iter() {
            assert_eq!(TokenKind::from_table(kind as u8), Some(kind));
        }
        assert_eq!(Token(0x0100_0000).kind(), None);
    }

    #[test]
    fn test_token_is_null() {
        assert!(Token(0).is_null());
        assert!(!Token::from_parts(TokenKind::Field, 1).is_null());
    }

    #[test]
    fn test_token_display() {
        let token = Token(0x06000001);
        assert_eq!(format!("{}", token), "0x06000001");
        assert_eq!(
            format!("{:?}", token),
            "Token(0x06000001, table: 0x06, row: 1)"
        );
    }
}
