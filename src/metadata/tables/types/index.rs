use std::fmt;

use crate::{
    metadata::{tables::TableId, token::Token},
    Error, Result,
};

/// A reference to one row of one table.
///
/// `index` is zero-based. The serialized forms (tokens, simple and coded indices) are
/// one-based, with `0` reserved for "no row".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableIndex {
    /// Target table
    pub table: TableId,
    /// Zero-based row
    pub index: u32,
}

impl TableIndex {
    /// Reference row `index` (zero-based) of `table`.
    #[must_use]
    pub fn new(table: TableId, index: u32) -> Self {
        TableIndex { table, index }
    }

    /// The one-based token of this row.
    #[must_use]
    pub fn token(&self) -> Token {
        Token::from_parts(self.table, self.index + 1)
    }

    /// Convert a token into a row reference.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for the null token, heap tokens and unknown tables.
    pub fn from_token(token: Token) -> Result<Self> {
        let table = token
            .table_id()
            .ok_or_else(|| malformed_error!("Token does not reference a table - {}", token))?;
        if token.row() == 0 {
            return Err(malformed_error!("Token references row 0 - {}", token));
        }
        Ok(TableIndex::new(table, token.row() - 1))
    }

    /// Like [`TableIndex::from_token`] but requires the token to address `table`, `0` maps to
    /// `None`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the token addresses another table.
    pub fn from_token_of(token: Token, table: TableId) -> Result<Option<Self>> {
        if token.is_null() {
            return Ok(None);
        }
        let index = TableIndex::from_token(token)?;
        if index.table != table {
            return Err(malformed_error!(
                "Token {} does not reference the {:?} table",
                token,
                table
            ));
        }
        Ok(Some(index))
    }

    /// Fail unless the reference targets `table`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] on a table mismatch.
    pub fn expect_table(&self, table: TableId) -> Result<()> {
        if self.table == table {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "{:?} references the {:?} table, expected {:?}",
                self, self.table, table
            )))
        }
    }
}

impl fmt::Debug for TableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}[{}]", self.table, self.index)
    }
}

impl fmt::Display for TableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_conversion() {
        let index = TableIndex::new(TableId::TypeDef, 4);
        assert_eq!(index.token(), Token(0x0200_0005));
        assert_eq!(TableIndex::from_token(Token(0x0200_0005)).unwrap(), index);

        assert!(TableIndex::from_token(Token(0x0200_0000)).is_err());
        assert!(TableIndex::from_token(Token(0x7000_0001)).is_err());
    }

    #[test]
    fn token_of_table() {
        assert_eq!(
            TableIndex::from_token_of(Token(0), TableId::StandAloneSig).unwrap(),
            None
        );
        assert_eq!(
            TableIndex::from_token_of(Token(0x1100_0002), TableId::StandAloneSig).unwrap(),
            Some(TableIndex::new(TableId::StandAloneSig, 1))
        );
        assert!(TableIndex::from_token_of(Token(0x0200_0002), TableId::StandAloneSig).is_err());
    }

    #[test]
    fn formatting() {
        let index = TableIndex::new(TableId::MethodDef, 0);
        assert_eq!(format!("{:?}", index), "MethodDef[0]");
        assert_eq!(format!("{}", index), "0x06000001");
        assert!(index.expect_table(TableId::MethodDef).is_ok());
        assert!(matches!(
            index.expect_table(TableId::Field),
            Err(Error::InvalidArgument(_))
        ));
    }
}
