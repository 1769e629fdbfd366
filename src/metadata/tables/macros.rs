//! Generator for the row structs and the table container.
//!
//! Each table is declared once as a list of `field: Type = ColumnKind` entries. The macro
//! derives from that declaration:
//!
//! - the row struct with one public field per column, in column order
//! - `COLUMNS`, the column schema used for sizing and by [`TableId::columns`]
//! - the raw-row conversions in both directions, dispatching to [`ColumnValue`] per field
//! - [`MetadataTables`] with one `Vec` per table
//!
//! [`TableId::columns`]: crate::metadata::tables::TableId::columns
//! [`ColumnValue`]: crate::metadata::tables::ColumnValue
//! [`MetadataTables`]: crate::metadata::tables::MetadataTables

macro_rules! tables {
    ($(
        $(#[$table_meta:meta])*
        $table:ident => $field_name:ident: $row:ident {
            $(
                $(#[$column_meta:meta])*
                $column:ident: $ty:ty = $kind:expr
            ),* $(,)?
        }
    ),* $(,)?) => {
        $(
            $(#[$table_meta])*
            #[derive(Debug, Clone, PartialEq)]
            pub struct $row {
                $(
                    $(#[$column_meta])*
                    pub $column: $ty,
                )*
            }

            impl $row {
                #[doc = concat!("Columns of the `", stringify!($table), "` table, in storage order.")]
                pub const COLUMNS: &[ColumnSchema] = &[
                    $(ColumnSchema { name: stringify!($column), kind: $kind },)*
                ];

                pub(crate) fn read_row(ctx: &ReadContext, raw: &[u32]) -> Result<Self> {
                    if raw.len() != Self::COLUMNS.len() {
                        return Err(malformed_error!(
                            "{} row has {} values, expected {}",
                            stringify!($table),
                            raw.len(),
                            Self::COLUMNS.len()
                        ));
                    }

                    let mut index = 0usize;
                    $(
                        let $column = <$ty as ColumnValue>::read_column(
                            ctx,
                            &Self::COLUMNS[index],
                            raw,
                            index,
                        )?;
                        index += 1;
                    )*
                    let _ = index;

                    Ok($row { $($column),* })
                }

                pub(crate) fn extract_row(
                    &self,
                    ctx: &mut WriteContext,
                    out: &mut [u32],
                ) -> Result<()> {
                    if out.len() != Self::COLUMNS.len() {
                        return Err(crate::Error::OutOfBounds);
                    }

                    let mut index = 0usize;
                    $(
                        let value = ColumnValue::write_column(
                            &self.$column,
                            ctx,
                            &Self::COLUMNS[index],
                            &out[..index],
                        )?;
                        out[index] = value;
                        index += 1;
                    )*
                    let _ = index;

                    Ok(())
                }
            }
        )*

        impl TableId {
            /// The column schema of this table.
            #[must_use]
            pub fn columns(&self) -> &'static [ColumnSchema] {
                match self {
                    $(TableId::$table => $row::COLUMNS,)*
                }
            }
        }

        /// The typed rows of all metadata tables.
        ///
        /// Row order is significant: list columns (`TypeDef.FieldList`, `MethodDef.ParamList`,
        /// ...) describe ranges into the following rows, and sorted tables must be kept in
        /// ascending key order by the caller.
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct MetadataTables {
            $(
                #[doc = concat!("Rows of the `", stringify!($table), "` table")]
                pub $field_name: Vec<$row>,
            )*
        }

        impl MetadataTables {
            /// Number of rows in `table`.
            #[must_use]
            #[allow(clippy::cast_possible_truncation)]
            pub fn row_count(&self, table: TableId) -> u32 {
                match table {
                    $(TableId::$table => self.$field_name.len() as u32,)*
                }
            }

            /// Row counts of all tables, indexed by table id.
            #[must_use]
            pub fn row_counts(&self) -> [u32; TABLE_COUNT] {
                let mut counts = [0u32; TABLE_COUNT];
                for table in TableId::iter() {
                    counts[table as usize] = self.row_count(table);
                }
                counts
            }

            pub(crate) fn read_rows(ctx: &ReadContext) -> Result<Self> {
                Ok(MetadataTables {
                    $($field_name: read_table(ctx, TableId::$table, $row::read_row)?,)*
                })
            }

            pub(crate) fn extract_rows(
                &self,
                ctx: &mut WriteContext,
                storage: &mut RawValueStorage<u32>,
            ) -> Result<()> {
                $(extract_table(&self.$field_name, TableId::$table, ctx, storage, $row::extract_row)?;)*
                Ok(())
            }
        }
    };
}
