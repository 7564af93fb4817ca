// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Trusted input blobs
//!
//! A trusted input certifies the amount of one output of a previous
//! transaction. Blobs are issued by `GetTrustedInput` and presented back
//! unmodified during `HashInputStart`, the device authenticates them with a
//! MAC keyed by a device-held secret.
//!
//! ## Encoding
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     MAGIC     |     FLAGS     |             NONCE             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! /                     TXID (32-byte, sha256d)                   /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     OUTPUT_INDEX (LE u32)                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                                                               |
//! +                        AMOUNT (LE u64)                        +
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! /                   MAC (32-byte, HMAC-SHA256)                  /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use encdec::{Decode, Encode};

use crate::{helpers::arr, ApduError};

/// Encoded trusted input length
pub const TRUSTED_INPUT_LEN: usize = 80;

/// Offset of the MAC (length of the authenticated prefix)
pub const TRUSTED_INPUT_MAC_OFFSET: usize = 48;

/// Trusted input magic
pub const TRUSTED_INPUT_MAGIC: u8 = 0x32;

/// Trusted input blob
#[derive(Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ApduError")]
pub struct TrustedInput {
    /// Blob magic, [TRUSTED_INPUT_MAGIC]
    pub magic: u8,

    /// Reserved flags
    pub flags: u8,

    /// Random nonce
    #[encdec(with = "arr")]
    pub nonce: [u8; 2],

    /// Transaction hash (internal byte order)
    #[encdec(with = "arr")]
    pub txid: [u8; 32],

    /// Output index
    pub index: u32,

    /// Output amount in satoshi
    pub amount: u64,

    /// MAC over the preceding fields
    #[encdec(with = "arr")]
    pub mac: [u8; 32],
}

impl TrustedInput {
    /// Create an unauthenticated trusted input (MAC zeroed)
    pub fn new(nonce: [u8; 2], txid: [u8; 32], index: u32, amount: u64) -> Self {
        Self {
            magic: TRUSTED_INPUT_MAGIC,
            flags: 0,
            nonce,
            txid,
            index,
            amount,
            mac: [0u8; 32],
        }
    }

    /// Decode a trusted input blob, checking length and magic
    pub fn parse(buff: &[u8]) -> Result<Self, ApduError> {
        if buff.len() != TRUSTED_INPUT_LEN {
            return Err(ApduError::InvalidLength);
        }

        let (t, _) = Self::decode(buff)?;
        if t.magic != TRUSTED_INPUT_MAGIC {
            return Err(ApduError::InvalidEncoding);
        }

        Ok(t)
    }

    /// Serialise to a fixed size array
    pub fn to_bytes(&self) -> [u8; TRUSTED_INPUT_LEN] {
        let mut b = [0u8; TRUSTED_INPUT_LEN];

        b[0] = self.magic;
        b[1] = self.flags;
        b[2..4].copy_from_slice(&self.nonce);
        b[4..36].copy_from_slice(&self.txid);
        b[36..40].copy_from_slice(&self.index.to_le_bytes());
        b[40..48].copy_from_slice(&self.amount.to_le_bytes());
        b[48..].copy_from_slice(&self.mac);

        b
    }

    /// Bitcoin outpoint (txid followed by little-endian index)
    pub fn outpoint(&self) -> [u8; 36] {
        let mut o = [0u8; 36];
        o[..32].copy_from_slice(&self.txid);
        o[32..].copy_from_slice(&self.index.to_le_bytes());
        o
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::encode_decode_apdu;
    use rand::RngCore;

    #[test]
    fn trusted_input_apdu() {
        let mut txid = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut txid);

        let t = TrustedInput::new([0x11, 0x22], txid, 3, 50_000_000);

        let mut buff = [0u8; 128];
        let n = encode_decode_apdu(&mut buff, &t);
        assert_eq!(n, TRUSTED_INPUT_LEN);

        // Derived encoding matches the fixed layout
        assert_eq!(&buff[..n], &t.to_bytes()[..]);
        assert_eq!(&buff[36..40], &[3, 0, 0, 0]);
    }

    #[test]
    fn trusted_input_parse() {
        let t = TrustedInput::new([0x11, 0x22], [0xab; 32], 1, 100);
        let mut b = t.to_bytes();

        assert_eq!(TrustedInput::parse(&b).unwrap(), t);
        assert!(TrustedInput::parse(&b[..79]).is_err());

        b[0] = 0x31;
        assert!(TrustedInput::parse(&b).is_err());
    }
}
