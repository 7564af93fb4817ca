// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Firmware information APDUs

use encdec::{Decode, Encode};

use super::{ApduError, ApduStatic, Instruction, WALLET_APDU_CLA};

/// Fetch firmware version APDU (no payload)
#[derive(Copy, Clone, PartialEq, Debug, Default, Encode, Decode)]
#[encdec(error = "ApduError")]
pub struct FirmwareVersionReq {}

impl ApduStatic for FirmwareVersionReq {
    /// Firmware version command APDU is class `0xe0`
    const CLA: u8 = WALLET_APDU_CLA;

    /// Firmware version GET APDU is instruction `0xc4`
    const INS: u8 = Instruction::GetFirmwareVersion as u8;
}

/// Firmware version response APDU
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     FLAGS     |     ARCH      |     MAJOR     |     MINOR     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     PATCH     |
/// +-+-+-+-+-+-+-+-+
/// ```
#[derive(Copy, Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ApduError")]
pub struct FirmwareVersion {
    /// Application flags
    pub flags: AppFlags,

    /// Hardware architecture identifier
    pub arch: u8,

    /// Firmware major version
    pub major: u8,

    /// Firmware minor version
    pub minor: u8,

    /// Firmware patch version
    pub patch: u8,
}

bitflags::bitflags! {
    /// Application info flags
    pub struct AppFlags: u8 {
        /// Wallet is operational (setup complete)
        const OPERATIONAL = 1 << 0;

        /// PIN verified for this session
        const PIN_VERIFIED = 1 << 1;

        /// Firmware includes the bootloader applet
        const HAS_BOOTLOADER = 1 << 6;

        /// Firmware includes currency applets
        const HAS_FIRMWARE = 1 << 7;
    }
}

crate::encdec_bitflags!(AppFlags);
