// Copyright (c) 2022-2023 The MobileCoin Foundation

use ledger_proto::ApduError;

use crate::apdu::status::StatusWord;

/// Engine and applet errors, each mapped to exactly one status word
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
pub enum Error {
    /// Malformed APDU or field length
    #[cfg_attr(feature = "thiserror", error("Invalid length"))]
    InvalidLength,

    /// Malformed or inconsistent command data
    #[cfg_attr(feature = "thiserror", error("Invalid data"))]
    InvalidData,

    /// Transaction parsing failed
    #[cfg_attr(feature = "thiserror", error("transaction parsing failed"))]
    ParsingFailed,

    /// Trusted input MAC verification failed
    #[cfg_attr(feature = "thiserror", error("untrusted input"))]
    UntrustedInput,

    /// Transaction changed between signing passes
    #[cfg_attr(feature = "thiserror", error("transaction integrity check failed"))]
    IntegrityMismatch,

    /// Firmware image signature verification failed
    #[cfg_attr(feature = "thiserror", error("invalid image signature"))]
    InvalidSignature,

    /// Unsupported P1 / P2 parameters
    #[cfg_attr(feature = "thiserror", error("invalid P1 / P2"))]
    InvalidParameters,

    /// Instruction not supported in the current state
    #[cfg_attr(feature = "thiserror", error("unsupported instruction"))]
    UnsupportedInstruction,

    /// Class not supported by the applet
    #[cfg_attr(feature = "thiserror", error("unsupported class"))]
    UnsupportedClass,

    /// No applet matches the selected AID
    #[cfg_attr(feature = "thiserror", error("applet not found"))]
    AppletNotFound,

    /// PIN not verified
    #[cfg_attr(feature = "thiserror", error("PIN not verified"))]
    PinRequired,

    /// PIN outside of the allowed length range
    #[cfg_attr(feature = "thiserror", error("invalid PIN length"))]
    InvalidPinLength,

    /// Incorrect PIN
    #[cfg_attr(feature = "thiserror", error("invalid PIN ({remaining} tries remaining)"))]
    InvalidPin { remaining: u8 },

    /// PIN retries exhausted
    #[cfg_attr(feature = "thiserror", error("PIN blocked"))]
    PinBlocked,

    /// Invalid engine state for the requested operation
    #[cfg_attr(feature = "thiserror", error("invalid engine state"))]
    InvalidState,

    /// User rejected the request
    #[cfg_attr(feature = "thiserror", error("rejected by user"))]
    Rejected,

    /// User confirmation timed out
    #[cfg_attr(feature = "thiserror", error("user confirmation timeout"))]
    Timeout,

    /// Persistent state is corrupt
    #[cfg_attr(feature = "thiserror", error("persistent state corrupted"))]
    Tampered,

    /// Persistent storage failure
    #[cfg_attr(feature = "thiserror", error("storage failure"))]
    Storage,

    /// Key derivation or signing failed
    #[cfg_attr(feature = "thiserror", error("signing error"))]
    SignError,

    /// Response encoding failed
    #[cfg_attr(feature = "thiserror", error("response encoding failed"))]
    EncodingFailed,
}

impl Error {
    /// Status word reported for this error
    pub fn status(&self) -> u16 {
        let sw = match self {
            Error::InvalidLength | Error::InvalidPinLength => StatusWord::WrongLength,
            Error::InvalidData
            | Error::ParsingFailed
            | Error::UntrustedInput
            | Error::IntegrityMismatch
            | Error::InvalidSignature => StatusWord::WrongData,
            Error::InvalidParameters => StatusWord::WrongP1P2,
            Error::UnsupportedInstruction => StatusWord::InsNotSupported,
            Error::UnsupportedClass => StatusWord::ClaNotSupported,
            Error::AppletNotFound => StatusWord::FileNotFound,
            Error::PinRequired => StatusWord::SecurityStatusNotSatisfied,
            Error::PinBlocked => StatusWord::PinBlocked,
            Error::InvalidPin { remaining } => return StatusWord::remaining_tries(*remaining),
            Error::InvalidState | Error::Rejected | Error::Timeout => {
                StatusWord::ConditionsNotSatisfied
            }
            Error::Tampered | Error::Storage | Error::SignError | Error::EncodingFailed => {
                StatusWord::Unknown
            }
        };

        sw as u16
    }

    /// Internal failures (corrupt storage, signing errors) that invalidate
    /// the session regardless of applet reset policy
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Tampered | Error::Storage | Error::SignError)
    }
}

impl From<ApduError> for Error {
    fn from(e: ApduError) -> Self {
        match e {
            ApduError::InvalidLength => Error::InvalidLength,
            _ => Error::InvalidData,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_words() {
        assert_eq!(Error::InvalidLength.status(), 0x6700);
        assert_eq!(Error::ParsingFailed.status(), 0x6a80);
        assert_eq!(Error::PinRequired.status(), 0x6982);
        assert_eq!(Error::PinBlocked.status(), 0x6983);
        assert_eq!(Error::Timeout.status(), 0x6985);
        assert_eq!(Error::InvalidPin { remaining: 2 }.status(), 0x63c2);
        assert_eq!(Error::InvalidPin { remaining: 0 }.status(), 0x63c0);
        assert_eq!(Error::UnsupportedClass.status(), 0x6e00);
    }

    #[test]
    fn fatal_errors() {
        assert!(Error::Tampered.is_fatal());
        assert!(Error::SignError.is_fatal());
        assert!(!Error::InvalidData.is_fatal());
        assert!(!Error::Rejected.is_fatal());
    }

    #[test]
    fn apdu_errors() {
        assert_eq!(Error::from(ApduError::InvalidLength), Error::InvalidLength);
        assert_eq!(Error::from(ApduError::InvalidEncoding), Error::InvalidData);
    }
}
