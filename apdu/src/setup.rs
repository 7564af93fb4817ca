// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Wallet provisioning APDUs

use encdec::{Decode, Encode};

use crate::ApduError;

/// Setup request, installs a wallet secret and PIN
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  SECRET_LEN   |                  SECRET...                    /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /               |    PIN_LEN    |            PIN...             /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Secret length limits are applet specific and checked by the applet.
#[derive(Clone, PartialEq, Debug)]
pub struct SetupReq<'a> {
    /// Wallet seed or applet secret
    pub secret: &'a [u8],

    /// New user PIN
    pub pin: &'a [u8],
}

impl<'a> Encode for SetupReq<'a> {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(2 + self.secret.len() + self.pin.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let n = self.encode_len()?;
        if buff.len() < n || self.secret.len() > 255 || self.pin.len() > 255 {
            return Err(ApduError::InvalidLength);
        }

        let mut index = 0;

        buff[index] = self.secret.len() as u8;
        index += 1;
        buff[index..][..self.secret.len()].copy_from_slice(self.secret);
        index += self.secret.len();

        buff[index] = self.pin.len() as u8;
        index += 1;
        buff[index..][..self.pin.len()].copy_from_slice(self.pin);
        index += self.pin.len();

        Ok(index)
    }
}

impl<'a> Decode<'a> for SetupReq<'a> {
    type Output = Self;
    type Error = ApduError;

    fn decode(buff: &'a [u8]) -> Result<(Self::Output, usize), Self::Error> {
        let mut index = 0;

        let secret = take_lv(buff, &mut index)?;
        let pin = take_lv(buff, &mut index)?;

        Ok((Self { secret, pin }, index))
    }
}

/// Read a length-prefixed field at `index`
fn take_lv<'a>(buff: &'a [u8], index: &mut usize) -> Result<&'a [u8], ApduError> {
    let len = *buff.get(*index).ok_or(ApduError::InvalidLength)? as usize;
    let v = buff
        .get(*index + 1..*index + 1 + len)
        .ok_or(ApduError::InvalidLength)?;

    *index += 1 + len;

    Ok(v)
}
