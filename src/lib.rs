// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # dotmeta
//!
//! A codec for .NET assembly images. `dotmeta` reads a PE/COFF file carrying ECMA-335 CLI
//! metadata into a fully typed, cross-referenced set of metadata tables, and writes such a set
//! back into a loadable image: PE headers, CLI header, metadata root, heaps, method bodies,
//! embedded resources, field data and an optional strong-name signature.
//!
//! ## Features
//!
//! - **All 45 metadata tables** - every ECMA-335 table from `Module` (0x00) to
//!   `GenericParamConstraint` (0x2C), declared once in a schema registry that drives both
//!   reading and writing
//! - **Typed signatures** - field, method, property, local variable, type specification,
//!   generic instantiation, custom attribute, security and marshalling blobs
//! - **Method bodies** - tiny and fat headers, small and fat exception sections, the complete
//!   CIL opcode table
//! - **Writer with layout** - two-pass extraction, heap deduplication, index width selection
//!   and a single forward sweep over the section layout
//! - **Strong naming** - hashing and signing through caller-supplied [`writer::CryptoCallbacks`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dotmeta::prelude::*;
//!
//! let metadata = CilMetadata::from_file(std::path::Path::new("tests/samples/Test.dll"))?;
//! for type_def in &metadata.tables.type_def {
//!     println!("{}.{}", type_def.namespace, type_def.name);
//! }
//!
//! let bytes = metadata.write(&WritingOptions::default())?;
//! let reread = CilMetadata::from_mem(bytes)?;
//! assert_eq!(reread.tables.type_def.len(), metadata.tables.type_def.len());
//! # Ok::<(), dotmeta::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`file`] - byte primitives, the cursor [`Parser`], input backends, the RVA converter and
//!   the PE header codec
//! - [`metadata`] - tokens, the CLI header, the metadata root, heaps, tables, signatures and
//!   method bodies
//! - [`reader`] - the read orchestrator
//! - [`writer`] - the write orchestrator, section layout and strong naming
//! - [`resolution`] - re-resolution of custom attributes against other assemblies
//!
//! ## Logging
//!
//! Both orchestrators emit [`tracing`] events. The crate never installs a subscriber.

#[macro_use]
pub(crate) mod error;

pub mod file;
pub mod metadata;
pub mod prelude;
pub mod reader;
pub mod resolution;
pub mod utils;
pub mod writer;

pub use error::Error;

/// The result type used throughout `dotmeta`.
pub type Result<T> = std::result::Result<T, Error>;

pub use file::{parser::Parser, File};
pub use metadata::{
    cilmetadata::CilMetadata,
    streams::{Blob, Guid, Strings, UserStrings},
    tables::{TableId, TableIndex},
    token::Token,
};
pub use reader::ReadingArguments;
pub use writer::WritingOptions;
