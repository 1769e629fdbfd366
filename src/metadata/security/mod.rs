//! Declarative security permission sets (ECMA-335 II.23.1.3, II.22.11).
//!
//! The `DeclSecurity` table attaches a permission set to a type, method or assembly. Its
//! blob comes in two formats:
//!
//! - binary, starting with `.` (0x2E): a compressed attribute count, then per attribute the
//!   attribute type name, the compressed byte length of its arguments, and the arguments in
//!   custom attribute named-argument form preceded by a compressed count
//! - legacy: the whole blob is an XML document in UTF-16LE
//!
//! Named arguments may reference enums of other assemblies. When those cannot be resolved
//! the argument bytes of that attribute are kept raw and written back unchanged, see
//! [`crate::resolution`] for retrying them with more assemblies at hand.
//!
//! # Key Components
//!
//! - [`PermissionSet`] - the decoded blob
//! - [`SecurityAttribute`] - one attribute of the binary format
//! - [`SecurityAction`] - the `DeclSecurity.Action` values
//!
//! # Examples
//!
//! ```rust
//! use dotmeta::metadata::security::{PermissionSet, SecurityAttribute, SecurityNamedArguments};
//!
//! let set = PermissionSet::Attributes(vec![SecurityAttribute {
//!     type_name: "System.Security.Permissions.SecurityPermissionAttribute".to_string(),
//!     named_args: SecurityNamedArguments::Resolved(Vec::new()),
//! }]);
//! let blob = set.encode()?;
//! assert_eq!(blob[0], b'.');
//! # Ok::<(), dotmeta::Error>(())
//! ```

mod permissionset;
mod types;

pub use permissionset::*;
pub use types::*;

use crate::{
    metadata::tables::{
        kind_mismatch, raw_value, ColumnKind, ColumnSchema, ColumnValue, DeclSecurityRow,
        ReadContext, WriteContext,
    },
    Result,
};

impl ColumnValue for PermissionSet {
    fn read_column(
        ctx: &ReadContext,
        column: &ColumnSchema,
        raw: &[u32],
        index: usize,
    ) -> Result<Self> {
        if column.kind != ColumnKind::BlobIndex {
            return Err(kind_mismatch(column));
        }

        let data = ctx.blob(raw_value(raw, index)?)?;
        match PermissionSet::parse(data, ctx) {
            Ok(set) => Ok(set),
            Err(error) => {
                tracing::warn!(%error, "undecodable permission set, keeping raw bytes");
                Ok(PermissionSet::Raw(data.to_vec()))
            }
        }
    }

    fn write_column(
        &self,
        ctx: &mut WriteContext,
        _column: &ColumnSchema,
        _previous: &[u32],
    ) -> Result<u32> {
        ctx.blobs.add(&self.encode()?)
    }
}

impl DeclSecurityRow {
    /// The `Action` column as a [`SecurityAction`].
    #[must_use]
    pub fn security_action(&self) -> SecurityAction {
        SecurityAction::from(self.action)
    }
}
