// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secondary applets
//!
//! Ethereum and Ripple share the streamed signing flow in [StreamSigner],
//! the first `SignTransaction` block carries the derivation path followed
//! by transaction data, later blocks carry transaction data only.

#[cfg(feature = "firmware")]
use encdec::DecodeOwned;

#[cfg(feature = "firmware")]
use crate::{apdu::path::DerivationPath, Error};

#[cfg(feature = "firmware")]
pub mod eth;

#[cfg(feature = "firmware")]
pub mod xrp;

#[cfg(feature = "firmware")]
pub mod sym;

#[cfg(feature = "firmware")]
pub mod otp;

#[cfg(feature = "bootloader")]
pub mod bldr;

/// P1 (SignTransaction): first block
pub const P1_FIRST: u8 = 0x00;

/// P1 (SignTransaction): subsequent block
pub const P1_MORE: u8 = 0x80;

/// P2 (SignTransaction): more blocks follow
pub const P2_MORE: u8 = 0x00;

/// P2 (SignTransaction): last block
pub const P2_LAST: u8 = 0x01;

/// Streaming 32-byte message digest
pub trait StreamHash: Sized {
    fn new() -> Self;

    fn update(&mut self, data: &[u8]);

    fn finalize(self) -> [u8; 32];
}

/// Streamed transaction hashing context
#[cfg(feature = "firmware")]
#[derive(Clone)]
pub struct StreamSigner<H: StreamHash> {
    path: DerivationPath,
    hasher: H,
}

#[cfg(feature = "firmware")]
impl<H: StreamHash> StreamSigner<H> {
    /// Handle a `SignTransaction` block, returning the path and digest
    /// once the last block is received
    pub fn update(
        ctx: &mut Option<Self>,
        p1: u8,
        p2: u8,
        data: &[u8],
    ) -> Result<Option<(DerivationPath, [u8; 32])>, Error> {
        let last = match p2 {
            P2_MORE => false,
            P2_LAST => true,
            _ => return Err(Error::InvalidParameters),
        };

        let s = match p1 {
            P1_FIRST => {
                let (path, n) = DerivationPath::decode_owned(data)?;
                let mut hasher = H::new();
                hasher.update(&data[n..]);

                ctx.insert(Self { path, hasher })
            }
            P1_MORE => {
                let s = ctx.as_mut().ok_or(Error::InvalidState)?;
                s.hasher.update(data);
                s
            }
            _ => return Err(Error::InvalidParameters),
        };

        if !last {
            return Ok(None);
        }

        let path = s.path.clone();
        let r = ctx.take().map(|s| (path, s.hasher.finalize()));

        Ok(r)
    }
}
