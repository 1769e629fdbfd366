//! Strong naming of written images through caller-supplied cryptography.

mod common;

use std::{any::Any, cell::RefCell};

use dotmeta::{
    file::{
        pe::{DataDirectoryKind, PeHeaders},
        File,
    },
    metadata::{
        cor20header::{ComImageFlags, Cor20Header, COR20_HEADER_SIZE},
        tables::AssemblyFlags,
    },
    utils::public_key_token,
    writer::{
        strongname::{strong_name_hash, ECMA_PUBLIC_KEY},
        CryptoCallbacks, RsaKey, RsaParameters, StrongNameKeySource, StrongNameOptions,
    },
    CilMetadata, Error, Result, WritingOptions,
};

use common::sample_metadata;

const SHA1: u32 = 0x8004;

struct TestKey(Vec<u8>);

impl RsaKey for TestKey {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Produces the hash itself, padded to the modulus size, as the "signature".
#[derive(Default)]
struct TestCrypto {
    signed: RefCell<Vec<Vec<u8>>>,
}

impl CryptoCallbacks for TestCrypto {
    fn create_rsa_from_params(&self, params: &RsaParameters) -> Result<Box<dyn RsaKey>> {
        Ok(Box::new(TestKey(params.modulus.clone())))
    }

    fn create_rsa_from_container(&self, _container: &str) -> Result<Box<dyn RsaKey>> {
        Err(Error::NotSupported)
    }

    fn sign_hash(&self, key: &dyn RsaKey, _algorithm: u32, hash: &[u8]) -> Result<Vec<u8>> {
        let modulus = &key.as_any().downcast_ref::<TestKey>().unwrap().0;
        self.signed.borrow_mut().push(hash.to_vec());

        let mut signature = hash.to_vec();
        signature.resize(modulus.len(), 0xEE);
        Ok(signature)
    }

    fn extract_public_key_from_container(&self, _container: &str) -> Result<Vec<u8>> {
        Err(Error::NotSupported)
    }
}

/// A `PRIVATEKEYBLOB` with a 256-bit modulus.
fn key_pair() -> Vec<u8> {
    #[rustfmt::skip]
    let mut blob = vec![
        0x07, 0x02, 0x00, 0x00, 0x00, 0x24, 0x00, 0x00,
        0x52, 0x53, 0x41, 0x32, // RSA2
        0x00, 0x01, 0x00, 0x00, // 256 bits
        0x01, 0x00, 0x01, 0x00, // 65537
    ];
    blob.extend((1..=32).map(|value: u8| value | 0x80));
    blob.extend_from_slice(&[0x11; 16 * 5]);
    blob.extend_from_slice(&[0x22; 32]);
    blob
}

fn cor20_of(image: &[u8]) -> Cor20Header {
    let file = File::from_mem(image.to_vec()).unwrap();
    let (offset, _) = file.clr().unwrap();
    Cor20Header::read(file.data_slice(offset, COR20_HEADER_SIZE).unwrap()).unwrap()
}

#[test]
fn signs_images() {
    let crypto = TestCrypto::default();
    let options = WritingOptions {
        strong_name: Some(StrongNameOptions {
            key: StrongNameKeySource::KeyPair(key_pair()),
            delay_sign: false,
            hash_algorithm: None,
        }),
        crypto: Some(&crypto),
        ..sample_metadata().writing_options()
    };
    let image = sample_metadata().write(&options).unwrap();

    let cor20 = cor20_of(&image);
    assert!(cor20.flags.contains(ComImageFlags::STRONG_NAME_SIGNED));
    assert_eq!(cor20.strong_name_signature.size, 32);

    let file = File::from_mem(image.clone()).unwrap();
    let slot_start = file.rva_to_offset(cor20.strong_name_signature.rva).unwrap();
    let slot = slot_start..slot_start + 32;

    // the hash covers everything but the checksum, the security directory and the slot
    let headers = PeHeaders::read(&image).unwrap();
    let check_sum = headers.check_sum_offset();
    let security = headers.data_directory_offset(DataDirectoryKind::Security);
    let hash = strong_name_hash(
        &image,
        &[check_sum..check_sum + 4, security..security + 8, slot.clone()],
        SHA1,
        &crypto,
    )
    .unwrap();
    assert_eq!(crypto.signed.borrow().as_slice(), [hash.clone()]);

    // the big-endian signature is stored little-endian
    let mut stored = image[slot].to_vec();
    stored.reverse();
    assert_eq!(&stored[..20], hash.as_slice());
    assert!(stored[20..].iter().all(|byte| *byte == 0xEE));

    let reread = CilMetadata::from_mem(image).unwrap();
    let assembly = &reread.tables.assembly[0];
    assert!(assembly.flags.contains(AssemblyFlags::PUBLIC_KEY));
    assert_eq!(&assembly.public_key[..4], &[0x00, 0x24, 0x00, 0x00]);
    assert_eq!(assembly.public_key.len(), 12 + 20 + 32);
    assert_eq!(reread.strong_name_signature.len(), 32);
}

#[test]
fn delay_signing() {
    let options = WritingOptions {
        strong_name: Some(StrongNameOptions {
            key: StrongNameKeySource::PublicKey(ECMA_PUBLIC_KEY.to_vec()),
            delay_sign: true,
            hash_algorithm: None,
        }),
        ..sample_metadata().writing_options()
    };
    let image = sample_metadata().write(&options).unwrap();

    let cor20 = cor20_of(&image);
    assert!(!cor20.flags.contains(ComImageFlags::STRONG_NAME_SIGNED));
    assert_eq!(cor20.strong_name_signature.size, 128);

    let reread = CilMetadata::from_mem(image).unwrap();
    assert_eq!(reread.strong_name_signature, vec![0; 128]);
    assert_eq!(reread.tables.assembly[0].public_key, ECMA_PUBLIC_KEY);
    assert_eq!(
        public_key_token(&reread.tables.assembly[0].public_key),
        [0xB7, 0x7A, 0x5C, 0x56, 0x19, 0x34, 0xE0, 0x89]
    );
}

#[test]
fn signing_failures() {
    let key_pair_options = StrongNameOptions {
        key: StrongNameKeySource::KeyPair(key_pair()),
        delay_sign: false,
        hash_algorithm: None,
    };

    // no callbacks to sign with
    let options = WritingOptions {
        strong_name: Some(key_pair_options.clone()),
        ..WritingOptions::default()
    };
    assert!(matches!(
        sample_metadata().write(&options),
        Err(Error::SigningFailed(_))
    ));

    // SHA-256 is not available through the default hash streams
    let crypto = TestCrypto::default();
    let options = WritingOptions {
        strong_name: Some(StrongNameOptions {
            hash_algorithm: Some(0x800C),
            ..key_pair_options
        }),
        crypto: Some(&crypto),
        ..WritingOptions::default()
    };
    assert!(matches!(
        sample_metadata().write(&options),
        Err(Error::SigningFailed(_))
    ));

    let container = WritingOptions {
        strong_name: Some(StrongNameOptions {
            key: StrongNameKeySource::Container("Sample".to_string()),
            delay_sign: false,
            hash_algorithm: None,
        }),
        crypto: Some(&crypto),
        ..WritingOptions::default()
    };
    assert!(matches!(
        sample_metadata().write(&container),
        Err(Error::SigningFailed(_))
    ));
}
