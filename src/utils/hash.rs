//! Hashing helpers for strong names and assembly references.
//!
//! Strong-name signing hashes a whole image in several pieces, so hashing is exposed as an
//! incremental [`HashStream`]. The built-in streams cover the algorithms ECMA-335 images use
//! for strong names and public key tokens, SHA-1 and MD5.

use md5::Md5;
use sha1::{Digest, Sha1};

use crate::{metadata::tables::AssemblyHashAlgorithm, Error, Result};

/// Incremental hash computation.
pub trait HashStream {
    /// Feed more data.
    fn update(&mut self, data: &[u8]);

    /// Consume the stream and return the digest.
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

struct DigestStream<D: Digest>(D);

impl<D: Digest> HashStream for DigestStream<D> {
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().to_vec()
    }
}

/// A hash stream for an `AssemblyHashAlgorithm` id.
///
/// # Errors
/// Returns [`crate::Error::NotSupported`] for algorithms other than SHA-1 and MD5.
pub fn hash_stream(algorithm: u32) -> Result<Box<dyn HashStream>> {
    match algorithm {
        AssemblyHashAlgorithm::SHA1 => Ok(Box::new(DigestStream(Sha1::new()))),
        AssemblyHashAlgorithm::MD5 => Ok(Box::new(DigestStream(Md5::new()))),
        _ => Err(Error::NotSupported),
    }
}

/// The public key token of a public key blob: the last 8 bytes of its SHA-1 hash, reversed.
#[must_use]
pub fn public_key_token(public_key: &[u8]) -> [u8; 8] {
    let hash = Sha1::digest(public_key);
    token_from_hash(&hash)
}

/// The public key token computed with `algorithm` instead of SHA-1.
///
/// # Errors
/// Returns [`crate::Error::NotSupported`] for algorithms other than SHA-1 and MD5.
pub fn public_key_token_with(algorithm: u32, public_key: &[u8]) -> Result<[u8; 8]> {
    let mut stream = hash_stream(algorithm)?;
    stream.update(public_key);
    Ok(token_from_hash(&stream.finalize()))
}

fn token_from_hash(hash: &[u8]) -> [u8; 8] {
    let mut token = [0u8; 8];
    for (target, source) in token.iter_mut().zip(hash.iter().rev()) {
        *target = *source;
    }
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The ECMA standard public key, tokenized to `b77a5c561934e089`.
    #[rustfmt::skip]
    const ECMA_KEY: [u8; 16] = [
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn ecma_key_token() {
        assert_eq!(
            public_key_token(&ECMA_KEY),
            [0xB7, 0x7A, 0x5C, 0x56, 0x19, 0x34, 0xE0, 0x89]
        );
        assert_eq!(
            public_key_token_with(AssemblyHashAlgorithm::SHA1, &ECMA_KEY).unwrap(),
            public_key_token(&ECMA_KEY)
        );
    }

    #[test]
    fn streams_hash_incrementally() {
        let mut stream = hash_stream(AssemblyHashAlgorithm::SHA1).unwrap();
        stream.update(b"abc");
        stream.update(b"def");
        assert_eq!(stream.finalize(), Sha1::digest(b"abcdef").to_vec());

        let mut stream = hash_stream(AssemblyHashAlgorithm::MD5).unwrap();
        stream.update(b"abc");
        assert_eq!(stream.finalize().len(), 16);
    }

    #[test]
    fn unsupported_algorithm() {
        assert!(matches!(
            hash_stream(AssemblyHashAlgorithm::SHA256),
            Err(Error::NotSupported)
        ));
    }
}
