// Copyright (c) 2022-2023 The MobileCoin Foundation

//! ISO7816 status words

use strum::Display;

/// Status words returned by wallet applets
#[derive(Copy, Clone, PartialEq, Debug, Display, num_enum::TryFromPrimitive)]
#[repr(u16)]
pub enum StatusWord {
    /// Command completed
    Ok = 0x9000,

    /// PIN verification failed, low nibble holds the remaining tries
    RemainingTries = 0x63c0,

    /// Wrong length (framing or field length)
    WrongLength = 0x6700,

    /// Security status not satisfied (PIN not verified)
    SecurityStatusNotSatisfied = 0x6982,

    /// Authentication method blocked (PIN retries exhausted)
    PinBlocked = 0x6983,

    /// Conditions of use not satisfied (wrong state, user rejection)
    ConditionsNotSatisfied = 0x6985,

    /// Incorrect data
    WrongData = 0x6a80,

    /// Applet not found
    FileNotFound = 0x6a82,

    /// Incorrect P1 / P2
    WrongP1P2 = 0x6b00,

    /// Instruction not supported
    InsNotSupported = 0x6d00,

    /// Class not supported
    ClaNotSupported = 0x6e00,

    /// Unknown error (response sentinel)
    Unknown = 0x6f00,
}

impl StatusWord {
    /// Status word reporting `n` remaining PIN tries (`0x63Cn`)
    pub const fn remaining_tries(n: u8) -> u16 {
        StatusWord::RemainingTries as u16 | (n & 0x0f) as u16
    }
}

impl From<StatusWord> for u16 {
    fn from(sw: StatusWord) -> Self {
        sw as u16
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn remaining_tries() {
        assert_eq!(StatusWord::remaining_tries(2), 0x63c2);
        assert_eq!(StatusWord::remaining_tries(0), 0x63c0);
    }

    #[test]
    fn decode_status() {
        assert_eq!(
            StatusWord::try_from(0x6982).ok(),
            Some(StatusWord::SecurityStatusNotSatisfied)
        );
        assert!(StatusWord::try_from(0x1234).is_err());
    }
}
