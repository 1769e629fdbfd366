//! Metadata tokens.
//!
//! A token is the 4-byte form of a row reference used outside of the table stream: entry
//! points in the CLI header, IL operands and local variable signature references in fat
//! method headers. The high byte selects the table, the low three bytes hold the one-based
//! row. Table byte `0x70` marks a `#US` heap offset instead of a row (the `ldstr` operand).
//!
//! Inside the crate rows are addressed with the zero-based [`crate::TableIndex`]; tokens only
//! appear at the binary boundary.

use std::fmt;

use crate::metadata::tables::TableId;

/// Table byte of a user string token.
pub const USER_STRING_TABLE: u8 = 0x70;

/// A metadata token, `(table << 24) | row`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

impl Token {
    /// Wrap a raw token value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Build a token from a table id and a one-based row.
    #[must_use]
    pub fn from_parts(table: TableId, row: u32) -> Self {
        Token((u32::from(table as u8) << 24) | (row & 0x00FF_FFFF))
    }

    /// The raw value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The table byte.
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The table byte as a [`TableId`], `None` for heap tokens and unknown tables.
    #[must_use]
    pub fn table_id(&self) -> Option<TableId> {
        TableId::from_repr(self.table())
    }

    /// The one-based row.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Whether the token is `0`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Whether the token addresses the `#US` heap.
    #[must_use]
    pub fn is_user_string(&self) -> bool {
        self.table() == USER_STRING_TABLE
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts() {
        let token = Token::new(0x0600_0001);
        assert_eq!(token.table(), 0x06);
        assert_eq!(token.row(), 1);
        assert_eq!(token.table_id(), Some(TableId::MethodDef));
        assert_eq!(Token::from_parts(TableId::MethodDef, 1), token);

        let token = Token(0x06FF_FFFF);
        assert_eq!(token.row(), 0x00FF_FFFF);
    }

    #[test]
    fn heap_and_null() {
        assert!(Token(0).is_null());
        assert!(!Token(0x0600_0001).is_null());

        let string = Token(0x7000_0001);
        assert!(string.is_user_string());
        assert_eq!(string.table_id(), None);
    }

    #[test]
    fn conversion() {
        let value = 0x0600_0001u32;
        let token: Token = value.into();
        assert_eq!(token.value(), value);
        let back: u32 = token.into();
        assert_eq!(back, value);
    }

    #[test]
    fn formatting() {
        let token = Token(0x0600_0001);
        assert_eq!(format!("{}", token), "0x06000001");

        let debug = format!("{:?}", token);
        assert!(debug.contains("Token(0x06000001"));
        assert!(debug.contains("table: 0x06"));
        assert!(debug.contains("row: 1"));
    }
}
