// Copyright (c) 2022-2023 The MobileCoin Foundation

//! BIP32 derivation paths
//!
//! ## Encoding
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     COUNT     |           ELEMENT_0 (big-endian u32)          /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! /               |                 ELEMENT_N...                  /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use byteorder::{BigEndian, ByteOrder};
use encdec::{DecodeOwned, Encode};
use heapless::Vec;

use crate::ApduError;

/// Maximum number of derivation path components
pub const MAX_PATH_LEN: usize = 10;

/// Hardened derivation flag
pub const HARDENED: u32 = 1 << 31;

/// BIP32 derivation path with 1..=[MAX_PATH_LEN] components
#[derive(Clone, PartialEq, Debug)]
pub struct DerivationPath(Vec<u32, MAX_PATH_LEN>);

impl DerivationPath {
    /// Build a derivation path from components
    pub fn new(elements: &[u32]) -> Result<Self, ApduError> {
        if elements.is_empty() {
            return Err(ApduError::InvalidEncoding);
        }

        Vec::from_slice(elements)
            .map(Self)
            .map_err(|_| ApduError::InvalidEncoding)
    }

    /// Path components
    pub fn elements(&self) -> &[u32] {
        &self.0
    }
}

impl Encode for DerivationPath {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(1 + self.0.len() * 4)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let n = self.encode_len()?;
        if buff.len() < n {
            return Err(ApduError::InvalidLength);
        }

        buff[0] = self.0.len() as u8;
        for (i, e) in self.0.iter().enumerate() {
            BigEndian::write_u32(&mut buff[1 + i * 4..], *e);
        }

        Ok(n)
    }
}

impl DecodeOwned for DerivationPath {
    type Output = Self;

    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.is_empty() {
            return Err(ApduError::InvalidLength);
        }

        // Component count must be within bounds
        let count = buff[0] as usize;
        if count == 0 || count > MAX_PATH_LEN {
            return Err(ApduError::InvalidEncoding);
        }

        let n = 1 + count * 4;
        if buff.len() < n {
            return Err(ApduError::InvalidLength);
        }

        let mut elements = Vec::new();
        for c in buff[1..n].chunks_exact(4) {
            // Capacity checked against `count` above
            let _ = elements.push(BigEndian::read_u32(c));
        }

        Ok((Self(elements), n))
    }
}
