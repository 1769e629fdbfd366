//! Helpers shared by the reader, the writer and callers working with assembly identities.

pub mod hash;

pub use hash::{hash_stream, public_key_token, public_key_token_with, HashStream};
