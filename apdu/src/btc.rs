// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Bitcoin applet APDUs
//!
//! Transaction data is streamed to the device across many commands, the
//! P1 / P2 parameters mark first / subsequent blocks and transaction modes.

use byteorder::{BigEndian, ByteOrder};
use encdec::{Decode, DecodeOwned, Encode};

use crate::{
    helpers::arr, path::DerivationPath, ApduError, ApduStatic, Instruction, WALLET_APDU_CLA,
};

/// P1: first block of a streamed sequence
pub const P1_FIRST_BLOCK: u8 = 0x00;

/// P1: subsequent block of a streamed sequence
pub const P1_NEXT_BLOCK: u8 = 0x80;

/// P2 (HashInputStart): start a new legacy transaction
pub const P2_NEW_TX: u8 = 0x00;

/// P2 (HashInputStart): start a new segwit transaction
pub const P2_NEW_SEGWIT_TX: u8 = 0x02;

/// P2 (HashInputStart): continue the current transaction (next input)
pub const P2_CONTINUE_TX: u8 = 0x80;

/// P1 (HashInputFinalizeFull): more output blocks follow
pub const P1_MORE_BLOCKS: u8 = 0x00;

/// P1 (HashInputFinalizeFull): last output block
pub const P1_LAST_BLOCK: u8 = 0x80;

/// P1 (HashInputFinalizeFull): change derivation path
pub const P1_CHANGE_PATH: u8 = 0xff;

/// P1 (GetWalletPublicKey): display address for confirmation
pub const P1_DISPLAY_ADDRESS: u8 = 0x01;

/// Input flag: trusted input blob follows
pub const INPUT_TRUSTED: u8 = 0x01;

/// Input flag: segwit outpoint and amount follow
pub const INPUT_SEGWIT: u8 = 0x02;

/// SIGHASH_ALL, the only supported signature hash type
pub const SIGHASH_ALL: u8 = 0x01;

/// Fetch a wallet public key, address and chain code
///
/// Data is a [DerivationPath], P1 requests on-device display
#[derive(Clone, PartialEq, Debug)]
pub struct WalletPublicKeyReq {
    pub path: DerivationPath,
}

impl ApduStatic for WalletPublicKeyReq {
    const CLA: u8 = WALLET_APDU_CLA;
    const INS: u8 = Instruction::GetWalletPublicKey as u8;
}

impl Encode for WalletPublicKeyReq {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        self.path.encode_len()
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        self.path.encode(buff)
    }
}

impl DecodeOwned for WalletPublicKeyReq {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        let (path, n) = DerivationPath::decode_owned(buff)?;
        Ok((Self { path }, n))
    }
}

/// Wallet public key response
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  KEY_LEN (65) |     PUBLIC_KEY (65-byte uncompressed SEC1)    /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /               |   ADDR_LEN    |      ADDRESS (base58check)    /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                     CHAIN_CODE (32-byte)                      /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct WalletPublicKeyResp<'a> {
    pub public_key: [u8; 65],
    pub address: &'a str,
    pub chain_code: [u8; 32],
}

impl<'a> Encode for WalletPublicKeyResp<'a> {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(1 + 65 + 1 + self.address.len() + 32)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let n = self.encode_len()?;
        if buff.len() < n || self.address.len() > 255 {
            return Err(ApduError::InvalidLength);
        }

        let mut index = 0;

        buff[index] = 65;
        index += 1;
        buff[index..][..65].copy_from_slice(&self.public_key);
        index += 65;

        buff[index] = self.address.len() as u8;
        index += 1;
        buff[index..][..self.address.len()].copy_from_slice(self.address.as_bytes());
        index += self.address.len();

        buff[index..][..32].copy_from_slice(&self.chain_code);
        index += 32;

        Ok(index)
    }
}

impl<'a> Decode<'a> for WalletPublicKeyResp<'a> {
    type Output = Self;
    type Error = ApduError;

    fn decode(buff: &'a [u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.len() < 67 || buff[0] != 65 {
            return Err(ApduError::InvalidEncoding);
        }

        let mut public_key = [0u8; 65];
        public_key.copy_from_slice(&buff[1..66]);

        let addr_len = buff[66] as usize;
        if buff.len() < 67 + addr_len + 32 {
            return Err(ApduError::InvalidLength);
        }

        let address =
            core::str::from_utf8(&buff[67..][..addr_len]).map_err(|_| ApduError::InvalidUtf8)?;

        let (chain_code, _) = arr::dec::<32>(&buff[67 + addr_len..])?;

        Ok((
            Self {
                public_key,
                address,
                chain_code,
            },
            67 + addr_len + 32,
        ))
    }
}

/// Sign the streamed transaction for the input currently being hashed
///
/// ## Encoding
///
/// ```text
/// +-----------------+------------+-----------+---------------+----------+
/// | DERIVATION_PATH | UV_LEN (1) | UV_CODE.. | LOCKTIME (BE) | SIGHASH  |
/// +-----------------+------------+-----------+---------------+----------+
/// ```
///
/// The user validation code is accepted for compatibility and ignored.
#[derive(Clone, PartialEq, Debug)]
pub struct HashSignReq {
    pub path: DerivationPath,
    pub lock_time: u32,
    pub sighash_type: u8,
}

impl ApduStatic for HashSignReq {
    const CLA: u8 = WALLET_APDU_CLA;
    const INS: u8 = Instruction::HashSign as u8;
}

impl Encode for HashSignReq {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(self.path.encode_len()? + 1 + 4 + 1)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        if buff.len() < self.encode_len()? {
            return Err(ApduError::InvalidLength);
        }

        let mut index = self.path.encode(buff)?;

        buff[index] = 0;
        index += 1;

        BigEndian::write_u32(&mut buff[index..], self.lock_time);
        index += 4;

        buff[index] = self.sighash_type;
        index += 1;

        Ok(index)
    }
}

impl DecodeOwned for HashSignReq {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        let (path, mut index) = DerivationPath::decode_owned(buff)?;

        // Skip user validation code
        let uv_len = *buff.get(index).ok_or(ApduError::InvalidLength)? as usize;
        index += 1 + uv_len;

        if buff.len() < index + 5 {
            return Err(ApduError::InvalidLength);
        }

        let lock_time = BigEndian::read_u32(&buff[index..]);
        index += 4;

        let sighash_type = buff[index];
        index += 1;

        Ok((
            Self {
                path,
                lock_time,
                sighash_type,
            },
            index,
        ))
    }
}

/// First block of a `GetTrustedInput` sequence, output index followed by
/// the start of the serialised transaction
#[derive(Clone, PartialEq, Debug)]
pub struct TrustedInputStart<'a> {
    pub index: u32,
    pub tx: &'a [u8],
}

impl<'a> Encode for TrustedInputStart<'a> {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(4 + self.tx.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let n = self.encode_len()?;
        if buff.len() < n {
            return Err(ApduError::InvalidLength);
        }

        BigEndian::write_u32(buff, self.index);
        buff[4..n].copy_from_slice(self.tx);

        Ok(n)
    }
}

impl<'a> Decode<'a> for TrustedInputStart<'a> {
    type Output = Self;
    type Error = ApduError;

    fn decode(buff: &'a [u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.len() < 4 {
            return Err(ApduError::InvalidLength);
        }

        Ok((
            Self {
                index: BigEndian::read_u32(buff),
                tx: &buff[4..],
            },
            buff.len(),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{path::HARDENED, test::encode_decode_apdu};
    use hex_literal::hex;

    #[test]
    fn wallet_public_key_req_apdu() {
        let apdu = WalletPublicKeyReq {
            path: DerivationPath::new(&[44 | HARDENED, 0]).unwrap(),
        };

        let mut buff = [0u8; 64];
        encode_decode_apdu(&mut buff, &apdu);
    }

    #[test]
    fn wallet_public_key_resp_apdu() {
        let mut public_key = [0x11; 65];
        public_key[0] = 0x04;

        let apdu = WalletPublicKeyResp {
            public_key,
            address: "1BoatSLRHtKNngkdXEeobR76b53LETtpyT",
            chain_code: [0x22; 32],
        };

        let mut buff = [0u8; 200];
        let n = encode_decode_apdu(&mut buff, &apdu);
        assert_eq!(n, 1 + 65 + 1 + 34 + 32);
    }

    #[test]
    fn hash_sign_req_apdu() {
        let apdu = HashSignReq {
            path: DerivationPath::new(&[0]).unwrap(),
            lock_time: 0x0102_0304,
            sighash_type: SIGHASH_ALL,
        };

        let mut buff = [0u8; 64];
        let n = encode_decode_apdu(&mut buff, &apdu);
        assert_eq!(&buff[..n], &[1, 0, 0, 0, 0, 0, 1, 2, 3, 4, 1]);
    }

    #[test]
    fn hash_sign_req_skips_user_code() {
        let b = hex!("0100000005" "02aabb" "00000009" "01");
        let (r, n) = HashSignReq::decode_owned(&b).unwrap();

        assert_eq!(n, b.len());
        assert_eq!(r.path.elements(), &[5]);
        assert_eq!(r.lock_time, 9);
    }

    #[test]
    fn trusted_input_start_apdu() {
        let tx = [0x01, 0x00, 0x00, 0x00, 0x01];
        let apdu = TrustedInputStart { index: 1, tx: &tx };

        let mut buff = [0u8; 64];
        let n = encode_decode_apdu(&mut buff, &apdu);
        assert_eq!(&buff[..4], &[0, 0, 0, 1]);
        assert_eq!(n, 9);
    }
}
