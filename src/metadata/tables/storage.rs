//! Staging buffer for raw column values.
//!
//! Both directions of the codec run in two passes. Reading first decodes every row into raw
//! integers, then resolves them once all tables are known. Writing first extracts every row
//! into raw integers while filling the heaps, then encodes them once heap and table sizes are
//! final. [`RawValueStorage`] holds the values between the passes in one flat vector.

use strum::IntoEnumIterator;

use crate::{
    metadata::tables::{TableId, TABLE_COUNT},
    Error::OutOfBounds,
    Result,
};

/// Flat `(table, row, column)` keyed storage.
#[derive(Debug, Clone)]
pub struct RawValueStorage<T> {
    values: Vec<T>,
    starts: [usize; TABLE_COUNT],
    rows: [u32; TABLE_COUNT],
}

impl<T: Copy + Default> RawValueStorage<T> {
    /// Allocate storage for the given row counts, every value set to `T::default()`.
    #[must_use]
    pub fn new(rows: [u32; TABLE_COUNT]) -> Self {
        let mut starts = [0usize; TABLE_COUNT];
        let mut total = 0usize;
        for table in TableId::iter() {
            starts[table as usize] = total;
            total += rows[table as usize] as usize * table.columns().len();
        }

        RawValueStorage {
            values: vec![T::default(); total],
            starts,
            rows,
        }
    }

    /// Row count of `table`.
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.rows[table as usize]
    }

    /// All row counts.
    #[must_use]
    pub fn row_counts(&self) -> &[u32; TABLE_COUNT] {
        &self.rows
    }

    fn range(&self, table: TableId, row: u32) -> Option<std::ops::Range<usize>> {
        if row >= self.rows[table as usize] {
            return None;
        }
        let width = table.columns().len();
        let start = self.starts[table as usize] + row as usize * width;
        Some(start..start + width)
    }

    /// The values of one row.
    #[must_use]
    pub fn row(&self, table: TableId, row: u32) -> Option<&[T]> {
        self.range(table, row).map(|range| &self.values[range])
    }

    /// Mutable access to the values of one row.
    pub fn row_mut(&mut self, table: TableId, row: u32) -> Option<&mut [T]> {
        self.range(table, row).map(move |range| &mut self.values[range])
    }

    /// One value.
    #[must_use]
    pub fn get(&self, table: TableId, row: u32, column: usize) -> Option<T> {
        self.row(table, row)
            .and_then(|values| values.get(column).copied())
    }

    /// Overwrite one value.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the row or column does not exist.
    pub fn set(&mut self, table: TableId, row: u32, column: usize, value: T) -> Result<()> {
        let slot = self
            .row_mut(table, row)
            .and_then(|values| values.get_mut(column))
            .ok_or(OutOfBounds)?;
        *slot = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addressing() {
        let mut rows = [0u32; TABLE_COUNT];
        rows[TableId::Module as usize] = 1;
        rows[TableId::TypeDef as usize] = 3;
        let mut storage = RawValueStorage::<u32>::new(rows);

        assert_eq!(storage.row(TableId::Module, 0).unwrap().len(), 5);
        assert_eq!(storage.row(TableId::TypeDef, 2).unwrap().len(), 6);
        assert!(storage.row(TableId::TypeDef, 3).is_none());
        assert!(storage.row(TableId::Field, 0).is_none());

        storage.set(TableId::TypeDef, 1, 3, 0x42).unwrap();
        assert_eq!(storage.get(TableId::TypeDef, 1, 3), Some(0x42));
        assert_eq!(storage.get(TableId::TypeDef, 0, 3), Some(0));
        assert_eq!(storage.get(TableId::Module, 0, 1), Some(0));
        assert!(storage.set(TableId::TypeDef, 1, 6, 1).is_err());
        assert!(storage.set(TableId::TypeDef, 3, 0, 1).is_err());
    }
}
