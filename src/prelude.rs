//! # dotmeta Prelude
//!
//! The types most programs reading or writing assemblies need, in one import.
//!
//! ```rust
//! use dotmeta::prelude::*;
//!
//! let metadata = CilMetadata::default();
//! assert!(metadata.tables.type_def.is_empty());
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotmeta operations
pub use crate::Error;

/// The result type used throughout dotmeta
pub use crate::Result;

// ================================================================================================
// Entry Points
// ================================================================================================

/// A complete assembly in typed form
pub use crate::CilMetadata;

/// Input backends and the byte cursor
pub use crate::{File, Parser};

/// Read configuration
pub use crate::reader::{ReaderFunctionalityProvider, ReadingArguments};

/// Write configuration
pub use crate::writer::{
    CliOptions, DebugOptions, PeOptions, WriterFunctionalityProvider, WritingOptions,
};

/// Strong naming
pub use crate::writer::{
    CryptoCallbacks, RsaKey, RsaParameters, StrongNameKeySource, StrongNameOptions,
};

/// Cross-assembly custom attribute resolution
pub use crate::resolution::{resolve_custom_attributes, AssemblyName, AssemblyReferenceResolver};

// ================================================================================================
// Metadata
// ================================================================================================

/// Tokens and table addressing
pub use crate::metadata::{
    tables::{CodedIndexType, MetadataTables, TableId, TableIndex},
    token::Token,
};

/// Heap views
pub use crate::metadata::streams::{Blob, Guid, Strings, UserStrings};

/// Signatures
pub use crate::metadata::signatures::{
    AbstractSignature, SignatureField, SignatureLocalVariables, SignatureMethod,
    SignatureProperty, SimpleType, TypeSignature,
};

/// Method bodies
pub use crate::metadata::method::{ExceptionBlock, Instruction, MethodBody, OpCode, Operand};

/// Blob values of table columns
pub use crate::metadata::{
    constant::ConstantValue,
    customattributes::{CustomAttributeArgument, CustomAttributeSignature, CustomAttributeValue},
    marshalling::MarshallingInfo,
    resource::ManifestResourceData,
    security::PermissionSet,
};
