use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! consistency_error {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::WriteConsistency {
            message: format!($fmt $(, $arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Format errors (reading)
/// - [`Error::BadImageFormat`] - A fatal structural problem, e.g. a missing CLI header
/// - [`Error::Malformed`] - Corrupted or invalid data inside an otherwise valid structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond buffer boundaries
/// - [`Error::NotSupported`] - A construct the codec does not handle
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::RecursionLimit`] - Nesting too deep while decoding a signature
///
/// ## Contract violations (writing)
/// - [`Error::WriteConsistency`] - Emitted bytes disagree with the precomputed layout
/// - [`Error::InvalidArgument`] - Caller data that cannot be encoded
///
/// ## Signing and I/O
/// - [`Error::SigningFailed`] - Any strong-name or cryptographic failure
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::GoblinErr`] - PE parsing failures reported by `goblin`
///
/// # Examples
///
/// ```rust,no_run
/// use dotmeta::{CilMetadata, Error};
/// use std::path::Path;
///
/// match CilMetadata::from_file(Path::new("assembly.dll")) {
///     Ok(metadata) => println!("{} types", metadata.tables.type_def.len()),
///     Err(Error::BadImageFormat(reason)) => eprintln!("not a .NET image: {reason}"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed file: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The image is not a valid .NET assembly.
    ///
    /// Raised for the fatal conditions of the reader: an unknown optional header magic, a
    /// missing CLI header data directory, a missing metadata root or a missing table stream.
    /// The message names the offending structure.
    #[error("Bad image format - {0}")]
    BadImageFormat(String),

    /// The file is damaged and could not be parsed.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// This file type or construct is not supported.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate during PE parsing.
    ///
    /// Missing signatures and unknown optional header magics are reported as
    /// [`Error::BadImageFormat`] instead.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// Recursion limit reached.
    ///
    /// Signatures are recursive grammars; decoding stops once the nesting exceeds the
    /// associated limit.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// The writer produced a different amount of data than its layout predicted.
    ///
    /// This indicates a defect in size prediction, not a problem with the input.
    #[error("Write consistency violated - {message}")]
    WriteConsistency {
        /// What disagreed
        message: String,
    },

    /// The caller supplied data that cannot be encoded.
    ///
    /// Examples are a custom attribute whose fixed argument count differs from its
    /// constructor's parameter count, or a token operand pointing into the wrong table.
    #[error("Invalid argument - {0}")]
    InvalidArgument(String),

    /// Strong-name signing failed.
    ///
    /// Covers missing crypto callbacks, invalid key blobs and signatures whose length does
    /// not match the reserved slot.
    #[error("Signing failed - {0}")]
    SigningFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_carries_location() {
        let error = malformed_error!("bad value {}", 42);
        match error {
            Error::Malformed {
                message,
                file,
                line,
            } => {
                assert_eq!(message, "bad value 42");
                assert!(file.ends_with("error.rs"));
                assert!(line > 0);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn display_messages() {
        let error = Error::BadImageFormat("no table stream exists".to_string());
        assert_eq!(error.to_string(), "Bad image format - no table stream exists");

        let error = consistency_error!("expected {} bytes, wrote {}", 8, 4);
        assert_eq!(
            error.to_string(),
            "Write consistency violated - expected 8 bytes, wrote 4"
        );
    }
}
