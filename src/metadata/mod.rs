//! CLI metadata of .NET assemblies.
//!
//! This module holds everything between the PE headers and the typed tables: the CLI header,
//! the metadata root with its streams, the heaps, the 45 tables and the blobs their columns
//! reference.
//!
//! # Key Components
//!
//! - [`cilmetadata::CilMetadata`] - a complete assembly: tables plus the header values needed
//!   to write it back
//! - [`cor20header`] - the CLI header
//! - [`root`] - the metadata root and stream directory
//! - [`streams`] - `#Strings`, `#US`, `#GUID`, `#Blob` and the table stream header
//! - [`tables`] - table ids, coded indices, the schema registry and the typed rows
//! - [`signatures`] - field, method, property, local variable and type specification blobs
//! - [`customattributes`], [`security`], [`marshalling`], [`constant`] - other typed blobs
//! - [`method`] - method bodies and CIL instructions
//! - [`resource`] - embedded manifest resources
//! - [`token`] - metadata tokens
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotmeta::CilMetadata;
//!
//! let metadata = CilMetadata::from_file("tests/samples/Test.dll".as_ref())?;
//! for method in &metadata.tables.method_def {
//!     let size = method.body.as_ref().map_or(0, |body| body.code_size());
//!     println!("{}: {} bytes of IL", method.name, size);
//! }
//! # Ok::<(), dotmeta::Error>(())
//! ```

/// A complete assembly image in typed form
pub mod cilmetadata;
/// Values of the `Constant` table
pub mod constant;
/// The CLI header
pub mod cor20header;
/// Custom attribute blobs
pub mod customattributes;
/// Field marshalling descriptors
pub mod marshalling;
/// Method bodies and the CIL instruction set
pub mod method;
/// Embedded manifest resources
pub mod resource;
/// The metadata root
pub mod root;
/// Declarative security permission sets
pub mod security;
/// Method and type signatures
pub mod signatures;
/// Metadata streams and heaps
pub mod streams;
/// The metadata tables
pub mod tables;
/// Metadata tokens
pub mod token;
