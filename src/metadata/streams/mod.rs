//! Metadata streams.
//!
//! The metadata root is followed by a list of named streams. Four of them are heaps that the
//! table rows reference by byte offset or record number, one holds the tables themselves:
//!
//! - **`#Strings`** - UTF-8 identifiers, null terminated, offset 0 is the empty string
//! - **`#US`** - UTF-16 string literals referenced by `ldstr`, each prefixed with a
//!   compressed length and followed by a terminal flag byte
//! - **`#Blob`** - signatures and other binary values, each prefixed with a compressed length
//! - **`#GUID`** - 16-byte records addressed by a one-based record number
//! - **`#~`** (or the uncompressed **`#-`**) - the table stream, see [`TablesHeader`]
//!
//! Every heap has a borrowed view type used while reading and a builder used while writing.
//! Builders deduplicate values and report whether their final size requires 4-byte indices.

mod blob;
mod guid;
mod streamheader;
mod strings;
mod tablesheader;
mod userstrings;

pub use blob::{Blob, BlobBuilder};
pub use guid::{Guid, GuidBuilder};
pub use streamheader::{StreamHeader, MAX_STREAM_NAME_LENGTH};
pub use strings::{Strings, StringsBuilder};
pub use tablesheader::{sorted_tables_mask, HeapSizes, TablesHeader};
pub use userstrings::{UserStrings, UserStringsBuilder};

/// Kind of a metadata stream, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// `#Strings`
    Strings,
    /// `#US`
    UserStrings,
    /// `#GUID`
    Guid,
    /// `#Blob`
    Blob,
    /// `#~`
    Tables,
    /// `#-`, the uncompressed table stream of edit-and-continue images
    UncompressedTables,
}

impl StreamKind {
    /// Map a stream name to its kind, `None` for names this codec ignores.
    #[must_use]
    pub fn from_name(name: &str) -> Option<StreamKind> {
        match name {
            "#Strings" => Some(StreamKind::Strings),
            "#US" => Some(StreamKind::UserStrings),
            "#GUID" => Some(StreamKind::Guid),
            "#Blob" => Some(StreamKind::Blob),
            "#~" => Some(StreamKind::Tables),
            "#-" => Some(StreamKind::UncompressedTables),
            _ => None,
        }
    }

    /// Canonical stream name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::Strings => "#Strings",
            StreamKind::UserStrings => "#US",
            StreamKind::Guid => "#GUID",
            StreamKind::Blob => "#Blob",
            StreamKind::Tables => "#~",
            StreamKind::UncompressedTables => "#-",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_names() {
        for kind in [
            StreamKind::Strings,
            StreamKind::UserStrings,
            StreamKind::Guid,
            StreamKind::Blob,
            StreamKind::Tables,
            StreamKind::UncompressedTables,
        ] {
            assert_eq!(StreamKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(StreamKind::from_name("#Pdb"), None);
        assert_eq!(StreamKind::from_name("#strings"), None);
    }
}
