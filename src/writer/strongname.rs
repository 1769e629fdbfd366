//! Strong-name signing.
//!
//! A strong-named image carries the signer's public key in its `Assembly` row and an RSA
//! signature over a hash of the image in a slot the CLI header points at. The hash covers the
//! whole file except the checksum, the security data directory entry and the signature slot
//! itself; the signature is stored little-endian, i.e. reversed compared to what RSA
//! implementations produce.
//!
//! The crate does not implement RSA. Key handling and signing go through a caller-supplied
//! [`CryptoCallbacks`] implementation, only hashing has a default.
//!
//! Keys are given in the CryptoAPI formats used by `sn.exe`:
//!
//! - a key pair is a `PRIVATEKEYBLOB` (`.snk` file)
//! - a public key is either the strong-name public key blob found in `Assembly.PublicKey`
//!   (12-byte header followed by a `PUBLICKEYBLOB`), a bare `PUBLICKEYBLOB`, or the 16-byte
//!   ECMA standard key
//! - a key container is resolved by name through the callbacks

use std::{any::Any, ops::Range};

use tracing::debug;

use crate::{
    file::parser::Parser,
    metadata::tables::AssemblyHashAlgorithm,
    utils::{hash_stream, HashStream},
    Error, Result,
};

/// `PUBLICKEYBLOB`
pub const PUBLIC_KEY_BLOB: u8 = 0x06;
/// `PRIVATEKEYBLOB`
pub const PRIVATE_KEY_BLOB: u8 = 0x07;
/// Version of the CryptoAPI blobs
pub const BLOB_VERSION: u8 = 0x02;
/// `CALG_RSA_SIGN`
pub const CALG_RSA_SIGN: u32 = 0x0000_2400;
/// `CALG_SHA1`
pub const CALG_SHA1: u32 = 0x0000_8004;
/// `RSA1`, magic of an RSA public key
pub const RSA1_MAGIC: u32 = 0x3141_5352;
/// `RSA2`, magic of an RSA private key
pub const RSA2_MAGIC: u32 = 0x3241_5352;

/// The ECMA standard public key of the framework assemblies.
#[rustfmt::skip]
pub const ECMA_PUBLIC_KEY: [u8; 16] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Signature size of images delay-signed with the ECMA key.
const ECMA_SIGNATURE_SIZE: u32 = 128;

/// Size of the header in front of the `PUBLICKEYBLOB` of a strong-name public key.
const PUBLIC_KEY_HEADER_SIZE: usize = 12;

/// RSA key components, big-endian.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RsaParameters {
    /// Modulus `n`
    pub modulus: Vec<u8>,
    /// Public exponent `e`
    pub exponent: Vec<u8>,
    /// Private exponent `d`
    pub d: Vec<u8>,
    /// First prime `p`
    pub p: Vec<u8>,
    /// Second prime `q`
    pub q: Vec<u8>,
    /// `d mod (p - 1)`
    pub dp: Vec<u8>,
    /// `d mod (q - 1)`
    pub dq: Vec<u8>,
    /// `q^-1 mod p`
    pub inverse_q: Vec<u8>,
}

/// An RSA key created by a [`CryptoCallbacks`] implementation.
pub trait RsaKey {
    /// Access to the concrete key type.
    fn as_any(&self) -> &dyn Any;
}

/// Cryptographic operations needed for strong naming.
pub trait CryptoCallbacks {
    /// Create a signing key from its components.
    ///
    /// # Errors
    /// Implementation defined, reported as [`crate::Error::SigningFailed`].
    fn create_rsa_from_params(&self, params: &RsaParameters) -> Result<Box<dyn RsaKey>>;

    /// Open a signing key stored in a named key container.
    ///
    /// # Errors
    /// Implementation defined, reported as [`crate::Error::SigningFailed`].
    fn create_rsa_from_container(&self, container: &str) -> Result<Box<dyn RsaKey>>;

    /// An incremental hash for an `AssemblyHashAlgorithm` id.
    ///
    /// # Errors
    /// The default supports SHA-1 and MD5 and fails with [`crate::Error::NotSupported`]
    /// otherwise.
    fn create_hash_stream(&self, algorithm: u32) -> Result<Box<dyn HashStream>> {
        hash_stream(algorithm)
    }

    /// Sign a hash with PKCS#1 v1.5 padding, returning the big-endian signature.
    ///
    /// # Errors
    /// Implementation defined, reported as [`crate::Error::SigningFailed`].
    fn sign_hash(&self, key: &dyn RsaKey, algorithm: u32, hash: &[u8]) -> Result<Vec<u8>>;

    /// The public key blob of a named key container.
    ///
    /// # Errors
    /// Implementation defined, reported as [`crate::Error::SigningFailed`].
    fn extract_public_key_from_container(&self, container: &str) -> Result<Vec<u8>>;
}

/// Where the strong-name key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrongNameKeySource {
    /// A CryptoAPI `PRIVATEKEYBLOB`
    KeyPair(Vec<u8>),
    /// A public key, only usable for delay signing
    PublicKey(Vec<u8>),
    /// A named key container
    Container(String),
}

/// Strong-name settings of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrongNameOptions {
    /// The key
    pub key: StrongNameKeySource,
    /// Reserve the signature slot but leave it zeroed
    pub delay_sign: bool,
    /// `AssemblyHashAlgorithm` of the signature hash, SHA-1 when `None`
    pub hash_algorithm: Option<u32>,
}

impl StrongNameOptions {
    /// Hash algorithm in effect.
    #[must_use]
    pub fn hash_algorithm(&self) -> u32 {
        self.hash_algorithm.unwrap_or(AssemblyHashAlgorithm::SHA1)
    }
}

/// How the signature is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Signer {
    Parameters(RsaParameters),
    Container(String),
    PublicOnly,
}

/// A loaded strong-name key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrongNameKey {
    /// Strong-name public key blob, as stored in `Assembly.PublicKey`
    pub public_key: Vec<u8>,
    /// Size of the signature in bytes
    pub signature_size: u32,
    signer: Signer,
}

impl StrongNameKey {
    /// Load the key of `options`, consulting `crypto` for key containers.
    ///
    /// # Errors
    /// Returns [`crate::Error::SigningFailed`] for malformed key blobs, a public key without
    /// `delay_sign`, a key container without callbacks, and failures of the callbacks.
    pub fn load(options: &StrongNameOptions, crypto: Option<&dyn CryptoCallbacks>) -> Result<Self> {
        let key = match &options.key {
            StrongNameKeySource::KeyPair(blob) => {
                Self::from_key_pair(blob, options.hash_algorithm())?
            }
            StrongNameKeySource::PublicKey(blob) => {
                Self::from_public_key(blob, options.hash_algorithm())?
            }
            StrongNameKeySource::Container(name) => {
                let blob = crypto
                    .ok_or_else(missing_callbacks)?
                    .extract_public_key_from_container(name)
                    .map_err(signing_error)?;
                StrongNameKey {
                    signer: Signer::Container(name.clone()),
                    ..Self::from_public_key(&blob, options.hash_algorithm())?
                }
            }
        };

        if key.signer == Signer::PublicOnly && !options.delay_sign {
            return Err(Error::SigningFailed(
                "a public key can only be used for delay signing".to_string(),
            ));
        }
        debug!(signature_size = key.signature_size, "loaded strong name key");
        Ok(key)
    }

    /// Parse a CryptoAPI `PRIVATEKEYBLOB`.
    ///
    /// # Errors
    /// Returns [`crate::Error::SigningFailed`] if the blob is not an RSA private key.
    pub fn from_key_pair(blob: &[u8], hash_algorithm: u32) -> Result<Self> {
        let mut parser = Parser::new(blob);
        let header = read_blob_header(&mut parser).map_err(signing_error)?;
        if header.blob_type != PRIVATE_KEY_BLOB || header.magic != RSA2_MAGIC {
            return Err(Error::SigningFailed(
                "key pair is not an RSA PRIVATEKEYBLOB".to_string(),
            ));
        }

        let full = header.modulus_size();
        let half = full / 2;
        let mut read = |length: usize| -> Result<Vec<u8>> {
            let mut value = parser.read_bytes(length).map_err(signing_error)?.to_vec();
            value.reverse();
            Ok(value)
        };

        let modulus = read(full)?;
        let p = read(half)?;
        let q = read(half)?;
        let dp = read(half)?;
        let dq = read(half)?;
        let inverse_q = read(half)?;
        let d = read(full)?;

        let exponent = exponent_bytes(header.exponent);
        let public_key = public_key_blob(&modulus, header.exponent, hash_algorithm)?;
        Ok(StrongNameKey {
            public_key,
            signature_size: header.bit_length / 8,
            signer: Signer::Parameters(RsaParameters {
                modulus,
                exponent,
                d,
                p,
                q,
                dp,
                dq,
                inverse_q,
            }),
        })
    }

    /// Load a public key for delay signing. Bare `PUBLICKEYBLOB`s are wrapped into the
    /// strong-name format.
    ///
    /// # Errors
    /// Returns [`crate::Error::SigningFailed`] if the blob is not an RSA public key.
    pub fn from_public_key(blob: &[u8], hash_algorithm: u32) -> Result<Self> {
        if blob == ECMA_PUBLIC_KEY {
            return Ok(StrongNameKey {
                public_key: blob.to_vec(),
                signature_size: ECMA_SIGNATURE_SIZE,
                signer: Signer::PublicOnly,
            });
        }

        let (public_key, inner) = if blob.first() == Some(&PUBLIC_KEY_BLOB) {
            let header = read_blob_header(&mut Parser::new(blob)).map_err(signing_error)?;
            let mut modulus = Parser::new(blob);
            modulus.seek(BLOB_HEADER_SIZE).map_err(signing_error)?;
            let mut modulus = modulus
                .read_bytes(header.modulus_size())
                .map_err(signing_error)?
                .to_vec();
            modulus.reverse();
            (
                public_key_blob(&modulus, header.exponent, hash_algorithm)?,
                blob,
            )
        } else {
            let inner = blob
                .get(PUBLIC_KEY_HEADER_SIZE..)
                .ok_or_else(|| Error::SigningFailed("public key blob is truncated".to_string()))?;
            (blob.to_vec(), inner)
        };

        let header = read_blob_header(&mut Parser::new(inner)).map_err(signing_error)?;
        if header.blob_type != PUBLIC_KEY_BLOB || header.magic != RSA1_MAGIC {
            return Err(Error::SigningFailed(
                "public key is not an RSA PUBLICKEYBLOB".to_string(),
            ));
        }

        Ok(StrongNameKey {
            public_key,
            signature_size: header.bit_length / 8,
            signer: Signer::PublicOnly,
        })
    }
}

/// Size of `BLOBHEADER` and `RSAPUBKEY`.
const BLOB_HEADER_SIZE: usize = 20;

struct BlobHeader {
    blob_type: u8,
    magic: u32,
    bit_length: u32,
    exponent: u32,
}

impl BlobHeader {
    fn modulus_size(&self) -> usize {
        self.bit_length as usize / 8
    }
}

fn read_blob_header(parser: &mut Parser) -> Result<BlobHeader> {
    let blob_type = parser.read_le::<u8>()?;
    let _version = parser.read_le::<u8>()?;
    let _reserved = parser.read_le::<u16>()?;
    let _algorithm = parser.read_le::<u32>()?;
    Ok(BlobHeader {
        blob_type,
        magic: parser.read_le::<u32>()?,
        bit_length: parser.read_le::<u32>()?,
        exponent: parser.read_le::<u32>()?,
    })
}

fn exponent_bytes(exponent: u32) -> Vec<u8> {
    let bytes = exponent.to_be_bytes();
    let start = bytes.iter().position(|byte| *byte != 0).unwrap_or(3);
    bytes[start..].to_vec()
}

/// Build the strong-name public key blob for a big-endian modulus.
///
/// # Errors
/// Returns [`crate::Error::SigningFailed`] for a modulus too large to describe.
pub fn public_key_blob(modulus: &[u8], exponent: u32, hash_algorithm: u32) -> Result<Vec<u8>> {
    let modulus_size = u32::try_from(modulus.len())
        .ok()
        .filter(|size| *size <= u32::MAX / 8)
        .ok_or_else(|| Error::SigningFailed("modulus is too large".to_string()))?;

    let mut blob = Vec::with_capacity(PUBLIC_KEY_HEADER_SIZE + BLOB_HEADER_SIZE + modulus.len());
    blob.extend_from_slice(&CALG_RSA_SIGN.to_le_bytes());
    blob.extend_from_slice(&hash_algorithm.to_le_bytes());
    blob.extend_from_slice(&(BLOB_HEADER_SIZE as u32 + modulus_size).to_le_bytes());

    blob.push(PUBLIC_KEY_BLOB);
    blob.push(BLOB_VERSION);
    blob.extend_from_slice(&0u16.to_le_bytes());
    blob.extend_from_slice(&CALG_RSA_SIGN.to_le_bytes());
    blob.extend_from_slice(&RSA1_MAGIC.to_le_bytes());
    blob.extend_from_slice(&(modulus_size * 8).to_le_bytes());
    blob.extend_from_slice(&exponent.to_le_bytes());
    blob.extend(modulus.iter().rev());
    Ok(blob)
}

/// The error for a signing request without [`CryptoCallbacks`].
#[must_use]
pub fn missing_callbacks() -> Error {
    Error::SigningFailed("strong naming requires crypto callbacks".to_string())
}

fn signing_error(error: Error) -> Error {
    match error {
        Error::SigningFailed(_) => error,
        other => Error::SigningFailed(other.to_string()),
    }
}

/// Hash `image` without the `excluded` ranges.
///
/// # Errors
/// Returns [`crate::Error::SigningFailed`] if `crypto` cannot hash with `algorithm`.
pub fn strong_name_hash(
    image: &[u8],
    excluded: &[Range<usize>],
    algorithm: u32,
    crypto: &dyn CryptoCallbacks,
) -> Result<Vec<u8>> {
    let mut excluded = excluded.to_vec();
    excluded.sort_by_key(|range| range.start);

    let mut stream = crypto.create_hash_stream(algorithm).map_err(signing_error)?;
    let mut position = 0;
    for range in excluded {
        if range.start > position {
            stream.update(image.get(position..range.start).ok_or(Error::OutOfBounds)?);
        }
        position = position.max(range.end);
    }
    if position < image.len() {
        stream.update(&image[position..]);
    }
    Ok(stream.finalize())
}

/// Sign `image` in place, writing the signature into `slot`.
///
/// # Errors
/// Returns [`crate::Error::SigningFailed`] for keys without private part, failing callbacks
/// and signatures whose length does not match the slot.
pub fn sign_image(
    image: &mut [u8],
    excluded: &[Range<usize>],
    slot: Range<usize>,
    key: &StrongNameKey,
    algorithm: u32,
    crypto: &dyn CryptoCallbacks,
) -> Result<()> {
    let mut excluded = excluded.to_vec();
    excluded.push(slot.clone());
    let hash = strong_name_hash(image, &excluded, algorithm, crypto)?;

    let rsa = match &key.signer {
        Signer::Parameters(parameters) => crypto.create_rsa_from_params(parameters),
        Signer::Container(name) => crypto.create_rsa_from_container(name),
        Signer::PublicOnly => {
            return Err(Error::SigningFailed(
                "the key has no private part".to_string(),
            ))
        }
    }
    .map_err(signing_error)?;

    let mut signature = crypto
        .sign_hash(rsa.as_ref(), algorithm, &hash)
        .map_err(signing_error)?;
    if signature.len() != slot.len() {
        return Err(Error::SigningFailed(format!(
            "signature of {} bytes does not fit the {} byte slot",
            signature.len(),
            slot.len()
        )));
    }

    signature.reverse();
    image
        .get_mut(slot)
        .ok_or(Error::OutOfBounds)?
        .copy_from_slice(&signature);
    debug!(size = signature.len(), "strong name signature written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeKey;

    impl RsaKey for FakeKey {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// "Signs" by repeating the hash up to the modulus size.
    struct FakeCrypto {
        size: usize,
    }

    impl CryptoCallbacks for FakeCrypto {
        fn create_rsa_from_params(&self, params: &RsaParameters) -> Result<Box<dyn RsaKey>> {
            assert!(!params.modulus.is_empty());
            Ok(Box::new(FakeKey))
        }

        fn create_rsa_from_container(&self, container: &str) -> Result<Box<dyn RsaKey>> {
            if container == "missing" {
                return Err(Error::NotSupported);
            }
            Ok(Box::new(FakeKey))
        }

        fn sign_hash(&self, key: &dyn RsaKey, _algorithm: u32, hash: &[u8]) -> Result<Vec<u8>> {
            assert!(key.as_any().downcast_ref::<FakeKey>().is_some());
            Ok(hash.iter().copied().cycle().take(self.size).collect())
        }

        fn extract_public_key_from_container(&self, _container: &str) -> Result<Vec<u8>> {
            public_key_blob(&[0xC0; 8], 0x10001, CALG_SHA1)
        }
    }

    /// A 64-bit `PRIVATEKEYBLOB`: modulus and private exponent of 8 bytes, the CRT values of 4.
    fn key_pair() -> Vec<u8> {
        #[rustfmt::skip]
        let mut blob = vec![
            0x07, 0x02, 0x00, 0x00, 0x00, 0x24, 0x00, 0x00,
            0x52, 0x53, 0x41, 0x32, // RSA2
            0x40, 0x00, 0x00, 0x00, // 64 bits
            0x01, 0x00, 0x01, 0x00, // 65537
        ];
        blob.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        for value in 0..5u8 {
            blob.extend_from_slice(&[value; 4]);
        }
        blob.extend_from_slice(&[9; 8]);
        blob
    }

    #[test]
    fn parses_key_pair() {
        let key = StrongNameKey::from_key_pair(&key_pair(), CALG_SHA1).unwrap();
        assert_eq!(key.signature_size, 8);

        let Signer::Parameters(parameters) = &key.signer else {
            panic!("key pair without parameters");
        };
        assert_eq!(parameters.modulus, [8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(parameters.exponent, [0x01, 0x00, 0x01]);
        assert_eq!(parameters.p, [0; 4]);
        assert_eq!(parameters.inverse_q, [4; 4]);
        assert_eq!(parameters.d, [9; 8]);

        #[rustfmt::skip]
        let expected = [
            0x00, 0x24, 0x00, 0x00, 0x04, 0x80, 0x00, 0x00, 0x1C, 0x00, 0x00, 0x00,
            0x06, 0x02, 0x00, 0x00, 0x00, 0x24, 0x00, 0x00,
            0x52, 0x53, 0x41, 0x31, 0x40, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00,
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
        ];
        assert_eq!(key.public_key, expected);

        let reloaded = StrongNameKey::from_public_key(&key.public_key, CALG_SHA1).unwrap();
        assert_eq!(reloaded.public_key, key.public_key);
        assert_eq!(reloaded.signature_size, 8);
    }

    #[test]
    fn public_keys() {
        let ecma = StrongNameKey::from_public_key(&ECMA_PUBLIC_KEY, CALG_SHA1).unwrap();
        assert_eq!(ecma.signature_size, 128);

        // a bare PUBLICKEYBLOB gets the strong-name header
        let blob = public_key_blob(&[0xC0; 16], 3, CALG_SHA1).unwrap();
        let bare = StrongNameKey::from_public_key(&blob[12..], CALG_SHA1).unwrap();
        assert_eq!(bare.public_key, blob);
        assert_eq!(bare.signature_size, 16);

        assert!(matches!(
            StrongNameKey::from_key_pair(&blob, CALG_SHA1),
            Err(Error::SigningFailed(_))
        ));
        assert!(matches!(
            StrongNameKey::from_public_key(&[0x00, 0x24], CALG_SHA1),
            Err(Error::SigningFailed(_))
        ));
    }

    #[test]
    fn public_key_requires_delay_signing() {
        let crypto = FakeCrypto { size: 128 };
        let mut options = StrongNameOptions {
            key: StrongNameKeySource::PublicKey(ECMA_PUBLIC_KEY.to_vec()),
            delay_sign: false,
            hash_algorithm: None,
        };
        assert!(matches!(
            StrongNameKey::load(&options, Some(&crypto)),
            Err(Error::SigningFailed(_))
        ));

        options.delay_sign = true;
        assert!(StrongNameKey::load(&options, Some(&crypto)).is_ok());
        assert!(StrongNameKey::load(&options, None).is_ok());

        options.key = StrongNameKeySource::Container("signing".to_string());
        assert!(matches!(
            StrongNameKey::load(&options, None),
            Err(Error::SigningFailed(_))
        ));
    }

    #[test]
    fn signs_with_exclusions() {
        let crypto = FakeCrypto { size: 8 };
        let key = StrongNameKey::from_key_pair(&key_pair(), CALG_SHA1).unwrap();

        let mut image: Vec<u8> = (0..64).collect();
        sign_image(&mut image, &[4..8], 32..40, &key, CALG_SHA1, &crypto).unwrap();

        let mut expected_input: Vec<u8> = (0..4).collect();
        expected_input.extend(8..32);
        expected_input.extend(40..64);
        let hash = hash_stream(CALG_SHA1)
            .map(|mut stream| {
                stream.update(&expected_input);
                stream.finalize()
            })
            .unwrap();
        let mut signature = hash[..8].to_vec();
        signature.reverse();
        assert_eq!(&image[32..40], signature.as_slice());

        // excluded bytes do not change the signature
        let mut changed = image.clone();
        changed[5] = 0xFF;
        sign_image(&mut changed, &[4..8], 32..40, &key, CALG_SHA1, &crypto).unwrap();
        assert_eq!(changed[32..40], image[32..40]);
    }

    #[test]
    fn container_keys() {
        let crypto = FakeCrypto { size: 8 };
        let options = StrongNameOptions {
            key: StrongNameKeySource::Container("signing".to_string()),
            delay_sign: false,
            hash_algorithm: None,
        };
        let key = StrongNameKey::load(&options, Some(&crypto)).unwrap();
        assert_eq!(key.signature_size, 8);

        let mut image = vec![0u8; 32];
        sign_image(&mut image, &[], 16..24, &key, CALG_SHA1, &crypto).unwrap();
        assert_ne!(image[16..24], [0; 8]);

        let missing = StrongNameKey {
            signer: Signer::Container("missing".to_string()),
            ..key
        };
        assert!(matches!(
            sign_image(&mut image, &[], 16..24, &missing, CALG_SHA1, &crypto),
            Err(Error::SigningFailed(_))
        ));
    }

    #[test]
    fn signature_size_mismatch() {
        let crypto = FakeCrypto { size: 16 };
        let key = StrongNameKey::from_key_pair(&key_pair(), CALG_SHA1).unwrap();
        let mut image = vec![0u8; 32];
        assert!(matches!(
            sign_image(&mut image, &[], 16..24, &key, CALG_SHA1, &crypto),
            Err(Error::SigningFailed(_))
        ));
    }

    #[test]
    fn unsupported_hash() {
        let crypto = FakeCrypto { size: 8 };
        assert!(matches!(
            strong_name_hash(&[0; 4], &[], AssemblyHashAlgorithm::SHA256, &crypto),
            Err(Error::SigningFailed(_))
        ));
    }
}
