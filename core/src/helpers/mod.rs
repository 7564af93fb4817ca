// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Key derivation, signing and address helpers shared by applets

use bip32::{ChildNumber, XPrv};
use heapless::Vec;
use k256::{
    ecdsa::{signature::hazmat::PrehashSigner, Signature, SigningKey},
    elliptic_curve::sec1::ToEncodedPoint,
    PublicKey,
};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::{apdu::path::HARDENED, Error};

/// Maximum DER encoded signature length
pub const MAX_DER_LEN: usize = 72;

/// Maximum base58check P2PKH address length
pub const MAX_ADDRESS_LEN: usize = 35;

/// Double SHA-256
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

/// RIPEMD-160 over SHA-256, as used for bitcoin key and script hashes
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

/// BIP-32 derivation from a seed and path
pub fn derive_xprv(seed: &[u8], path: &[u32]) -> Result<XPrv, Error> {
    let mut xprv = XPrv::new(seed).map_err(|_| Error::SignError)?;

    for &p in path {
        let child = ChildNumber::new(p & !HARDENED, p & HARDENED != 0)
            .map_err(|_| Error::InvalidData)?;

        xprv = xprv.derive_child(child).map_err(|_| Error::SignError)?;
    }

    Ok(xprv)
}

/// Derive a signing key from a seed and path
pub fn derive_key(seed: &[u8], path: &[u32]) -> Result<SigningKey, Error> {
    Ok(derive_xprv(seed, path)?.private_key().clone())
}

/// Deterministic (RFC6979) ECDSA over a prehashed message, normalised to low-S
pub fn sign_low_s(key: &SigningKey, digest: &[u8; 32]) -> Result<Signature, Error> {
    let sig: Signature = key.sign_prehash(digest).map_err(|_| Error::SignError)?;
    Ok(sig.normalize_s().unwrap_or(sig))
}

/// DER encode a signature
pub fn der_encode(sig: &Signature) -> Result<Vec<u8, MAX_DER_LEN>, Error> {
    let der = sig.to_der();
    Vec::from_slice(der.as_bytes()).map_err(|_| Error::EncodingFailed)
}

/// Compressed SEC1 public key
pub fn compressed_pubkey(key: &SigningKey) -> [u8; 33] {
    let mut b = [0u8; 33];
    b.copy_from_slice(PublicKey::from(key.verifying_key()).to_encoded_point(true).as_bytes());
    b
}

/// Uncompressed SEC1 public key
pub fn uncompressed_pubkey(key: &SigningKey) -> [u8; 65] {
    let mut b = [0u8; 65];
    b.copy_from_slice(PublicKey::from(key.verifying_key()).to_encoded_point(false).as_bytes());
    b
}

/// Base58check P2PKH address for a public key
pub fn p2pkh_address<'a>(
    version: u8,
    public_key: &[u8],
    buff: &'a mut [u8; MAX_ADDRESS_LEN],
) -> Result<&'a str, Error> {
    let mut payload = [0u8; 25];
    payload[0] = version;
    payload[1..21].copy_from_slice(&hash160(public_key));

    let check = sha256d(&payload[..21]);
    payload[21..].copy_from_slice(&check[..4]);

    let n = bs58::encode(&payload)
        .into(&mut buff[..])
        .map_err(|_| Error::EncodingFailed)?;

    core::str::from_utf8(&buff[..n]).map_err(|_| Error::EncodingFailed)
}

/// Write lower-case hex into `buff`, returning the encoded string
pub fn hex_str<'a>(data: &[u8], buff: &'a mut [u8]) -> Result<&'a str, Error> {
    let n = data.len() * 2;
    if buff.len() < n {
        return Err(Error::EncodingFailed);
    }

    hex::encode_to_slice(data, &mut buff[..n]).map_err(|_| Error::EncodingFailed)?;

    core::str::from_utf8(&buff[..n]).map_err(|_| Error::EncodingFailed)
}

#[cfg(test)]
mod test {
    use hex_literal::hex;
    use k256::{
        ecdsa::{signature::hazmat::PrehashVerifier, VerifyingKey},
        elliptic_curve::scalar::IsHigh,
    };

    use super::*;

    #[test]
    fn bip32_vector_1() {
        let seed = hex!("000102030405060708090a0b0c0d0e0f");

        let xprv = derive_xprv(&seed, &[HARDENED]).unwrap();

        assert_eq!(
            xprv.private_key().to_bytes().as_slice(),
            &hex!("edb2e14f9ee77d26dd93b4ecede8d16ed408ce149b6cd80b0715a2d911a0afea")
        );
        assert_eq!(
            xprv.attrs().chain_code,
            hex!("47fdacbd0f1097043b78c63c20c34ef4ed9a111d980047ad16282c7ae6236141")
        );
    }

    #[test]
    fn p2pkh_generator_point() {
        // Private key 1, compressed public key is the generator
        let pk = hex!("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798");

        let mut buff = [0u8; MAX_ADDRESS_LEN];
        let addr = p2pkh_address(0x00, &pk, &mut buff).unwrap();

        assert_eq!(addr, "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
    }

    #[test]
    fn signatures_are_low_s_and_der() {
        let key = derive_key(&[0x42; 32], &[44 | HARDENED, 0, 7]).unwrap();
        let vk = VerifyingKey::from(&key);

        for i in 0..32u8 {
            let digest = sha256d(&[i]);
            let sig = sign_low_s(&key, &digest).unwrap();

            assert!(!bool::from(sig.s().is_high()));
            vk.verify_prehash(&digest, &sig).unwrap();

            let der = der_encode(&sig).unwrap();
            assert_eq!(der[0], 0x30);
            assert_eq!(der[1] as usize, der.len() - 2);

            // RFC6979 signing is deterministic
            assert_eq!(sign_low_s(&key, &digest).unwrap(), sig);
        }
    }

    #[test]
    fn hex_encoding() {
        let mut b = [0u8; 8];
        assert_eq!(hex_str(&[0xde, 0xad, 0x01], &mut b), Ok("dead01"));
        assert!(hex_str(&[0u8; 5], &mut b).is_err());
    }
}
