// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Bootloader APDUs

use encdec::{Decode, Encode};

use crate::{
    helpers::{arr, be32},
    ApduError, ApduStatic, Instruction, BLDR_APDU_CLA,
};

/// Fixed firmware image chunk size per `LoadImageData` command
pub const IMAGE_CHUNK_SIZE: usize = 128;

/// Firmware image header, carried by `SetImageInfo`
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                    IMAGE_SIZE (BE u32)                        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      VERSION (BE u32)                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /              SIGNATURE (64-byte secp256k1 r ‖ s)              /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The signature covers SHA-256 over the first 8 bytes of this header
/// followed by the image.
#[derive(Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ApduError")]
pub struct ImageInfo {
    /// Total image size in bytes
    #[encdec(with = "be32")]
    pub size: u32,

    /// Image version
    #[encdec(with = "be32")]
    pub version: u32,

    /// Image signature
    #[encdec(with = "arr")]
    pub signature: [u8; 64],
}

impl ApduStatic for ImageInfo {
    const CLA: u8 = BLDR_APDU_CLA;
    const INS: u8 = Instruction::SetImageInfo as u8;
}

impl ImageInfo {
    /// Signed header prefix (size and version)
    pub fn header(&self) -> [u8; 8] {
        let mut h = [0u8; 8];
        h[..4].copy_from_slice(&self.size.to_be_bytes());
        h[4..].copy_from_slice(&self.version.to_be_bytes());
        h
    }
}
