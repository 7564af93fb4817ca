// Copyright (c) 2022-2023 The MobileCoin Foundation

use encdec::Encode;
use heapless::{String, Vec};

use ledger_proto::ApduError;

use crate::{
    apdu::{app_info::FirmwareVersion, btc::WalletPublicKeyResp, trusted_input::TrustedInput},
    consts::MAX_RANDOM_LEN,
    helpers::{MAX_ADDRESS_LEN, MAX_DER_LEN},
};

/// [`Engine`][super::Engine] outputs (in response to events), typically encoded to response [APDUs][crate::apdu]
#[derive(Clone, PartialEq, Debug)]
pub enum Output {
    /// Empty response
    None,

    /// Firmware version and flags
    FirmwareVersion(FirmwareVersion),

    /// Random bytes
    Random(Vec<u8, MAX_RANDOM_LEN>),

    /// Public key, address and chain code
    WalletPublicKey {
        public_key: [u8; 65],
        address: String<MAX_ADDRESS_LEN>,
        chain_code: [u8; 32],
    },

    /// MACed trusted input
    TrustedInput(TrustedInput),

    /// Output block accepted, no user validation required
    FinalizeStatus,

    /// DER signature with appended sighash type
    Signature {
        der: Vec<u8, MAX_DER_LEN>,
        sighash_type: u8,
    },
}

impl Output {
    /// Encode an [`Output`] object to a response [APDU]
    pub fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        match self {
            Output::None => Ok(0),
            Output::FirmwareVersion(v) => v.encode(buff),
            Output::Random(r) => copy(r, buff),
            Output::WalletPublicKey {
                public_key,
                address,
                chain_code,
            } => WalletPublicKeyResp {
                public_key: *public_key,
                address: address.as_str(),
                chain_code: *chain_code,
            }
            .encode(buff),
            Output::TrustedInput(t) => copy(&t.to_bytes(), buff),
            // User validation flag, none required
            Output::FinalizeStatus => copy(&[0x00, 0x00], buff),
            Output::Signature { der, sighash_type } => {
                let n = copy(der, buff)?;
                let n2 = copy(&[*sighash_type], &mut buff[n..])?;
                Ok(n + n2)
            }
        }
    }
}

fn copy(data: &[u8], buff: &mut [u8]) -> Result<usize, ApduError> {
    if buff.len() < data.len() {
        return Err(ApduError::InvalidLength);
    }

    buff[..data.len()].copy_from_slice(data);

    Ok(data.len())
}
