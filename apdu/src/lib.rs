// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Protocol / APDU definitions for hardware wallet applets
//!
//! This module provides ISO7816-4 command parsing and response framing
//! ([command], [response]), status words ([status]), and the request / response
//! objects exchanged with the Bitcoin, Ethereum, Ripple, symmetric, OTP and
//! bootloader applets.
//!
//! Command APDUs are parsed in place, borrowing the data field from the
//! request buffer. Responses are written to a distinct buffer and terminated
//! by a big-endian status word.
//!
//! Object encodings follow the Bitcoin hardware wallet conventions, so
//! derivation paths, lock times and output indices on the wire are big-endian
//! while values copied from Bitcoin transactions (amounts, trusted input
//! fields) stay little-endian.

#![no_std]

pub use ledger_proto::{ApduError, ApduStatic};

pub mod app_info;
pub mod bldr;
pub mod btc;
pub mod command;
pub mod path;
pub mod prelude;
pub mod response;
pub mod setup;
pub mod status;
pub mod trusted_input;

mod helpers;

/// Class for Bitcoin, Ethereum and Ripple applet commands
pub const WALLET_APDU_CLA: u8 = 0xe0;

/// Class for symmetric and OTP applet commands
pub const SECRET_APDU_CLA: u8 = 0x80;

/// Class for bootloader commands
pub const BLDR_APDU_CLA: u8 = 0xf0;

/// Class for ISO7816 inter-industry commands (`SELECT`)
pub const ISO_APDU_CLA: u8 = 0x00;

/// ISO7816 `SELECT` instruction
pub const ISO_INS_SELECT: u8 = 0xa4;

/// `SELECT` by DF name (AID)
pub const ISO_SELECT_BY_NAME: u8 = 0x04;

/// Maximum response data size for CCID / HID transports
pub const MAX_APDU_DATA: usize = 4096;

/// Applet identifiers
pub mod aid {
    /// Bitcoin applet
    pub const BTC: &[u8] = b"BTCAPPLET";
    /// Ethereum applet
    pub const ETH: &[u8] = b"ETHAPPLET";
    /// Ripple applet
    pub const XRP: &[u8] = b"XRPAPPLET";
    /// Symmetric key applet
    pub const SYM: &[u8] = b"SYMAPPLET";
    /// One time password applet
    pub const OTP: &[u8] = b"OTPAPPLET";
    /// Bootloader / firmware update applet
    pub const BLDR: &[u8] = b"BLDRAPPLET";
}

/// Applet instruction codes
///
/// Codes are shared between applets where the operation matches, each applet
/// accepts only the subset listed in its dispatch table.
#[derive(Copy, Clone, Debug, PartialEq, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum Instruction {
    /// Fetch an account public key (Ethereum / Ripple)
    GetPublicKey = 0x02,

    /// Stream and sign a transaction (Ethereum / Ripple)
    SignTransaction = 0x04,

    /// Install wallet secrets and PIN
    Setup = 0x20,

    /// Verify user PIN
    VerifyPin = 0x22,

    /// Clear the volatile session
    Deinit = 0x24,

    /// AES-256 encrypt (symmetric)
    Encrypt = 0x30,

    /// AES-256 decrypt (symmetric)
    Decrypt = 0x32,

    /// HMAC-SHA256 (symmetric)
    Mac = 0x34,

    /// Fetch Bitcoin public key, address and chain code
    GetWalletPublicKey = 0x40,

    /// Stream a previous transaction to obtain a trusted input
    GetTrustedInput = 0x42,

    /// Stream transaction inputs for signing
    HashInputStart = 0x44,

    /// Sign the streamed transaction
    HashSign = 0x48,

    /// Stream transaction outputs for signing
    HashInputFinalizeFull = 0x4a,

    /// Compute the next one time password
    GetCode = 0x50,

    /// Configure a firmware image update
    SetImageInfo = 0x60,

    /// Load a chunk of firmware image
    LoadImageData = 0x62,

    /// Verify and commit a firmware image
    FinalizeImage = 0x64,

    /// Fetch random bytes
    GetRandom = 0xc0,

    /// Fetch firmware version and flags
    GetFirmwareVersion = 0xc4,
}

/// Helper macro for encoding `bitflags` types
#[macro_export]
macro_rules! encdec_bitflags {
    ($b:ty) => {
        impl encdec::Encode for $b {
            type Error = ApduError;

            fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
                let bits: u8 = self.bits();
                encdec::Encode::encode(&bits, buff).map_err(|e| e.into())
            }

            fn encode_len(&self) -> Result<usize, Self::Error> {
                let bits: u8 = self.bits();
                encdec::Encode::encode_len(&bits).map_err(|e| e.into())
            }
        }

        impl encdec::DecodeOwned for $b {
            type Output = $b;
            type Error = ApduError;

            fn decode_owned(buff: &[u8]) -> Result<(Self, usize), Self::Error> {
                if buff.is_empty() {
                    return Err(ApduError::InvalidLength);
                }
                let v = <$b>::from_bits_truncate(buff[0]);
                Ok((v, 1))
            }
        }
    };
}

#[cfg(test)]
pub(crate) mod test {
    use encdec::EncDec;

    use super::*;

    /// Helper for APDU encode / decode tests
    pub fn encode_decode_apdu<'a, A: EncDec<'a, ApduError> + PartialEq>(
        buff: &'a mut [u8],
        apdu: &A,
    ) -> usize {
        // Encode APDU
        let n = apdu.encode(buff).expect("encode failed");

        // Ensure encoded data fits a short APDU payload
        let m = 256;
        assert!(n < m, "encoded length {n} exceeds maximum APDU payload {m}");

        // Check encoded length matches expected length
        let expected_n = apdu.encode_len().expect("get length failed");
        assert_eq!(n, expected_n, "encode length mismatch");

        // Decode APDU
        let (decoded, decoded_n) = A::decode(&buff[..n]).expect("decode failed");

        // Check decoded object and length match
        assert_eq!(apdu, &decoded);
        assert_eq!(expected_n, decoded_n);

        n
    }
}
