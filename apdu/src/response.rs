// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Response APDU construction
//!
//! A [Response] wraps the outgoing buffer, handlers append data and the
//! dispatcher sets the status word before calling [Response::finish].

use encdec::Encode;

use crate::{status::StatusWord, ApduError, MAX_APDU_DATA};

/// Response APDU under construction
#[derive(Debug)]
pub struct Response<'a> {
    buff: &'a mut [u8],
    len: usize,
    max: usize,
    sw: u16,
}

impl<'a> Response<'a> {
    /// Prepare a response over the provided buffer, with no data and an
    /// unknown status word
    pub fn new(buff: &'a mut [u8]) -> Self {
        let max = buff.len().saturating_sub(2).min(MAX_APDU_DATA);

        Self {
            buff,
            len: 0,
            max,
            sw: StatusWord::Unknown as u16,
        }
    }

    /// Current response data
    pub fn data(&self) -> &[u8] {
        &self.buff[..self.len]
    }

    /// Current response data length
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check whether response data is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remaining data capacity
    pub fn remaining(&self) -> usize {
        self.max - self.len
    }

    /// Append raw data to the response
    pub fn push(&mut self, data: &[u8]) -> Result<(), ApduError> {
        if data.len() > self.remaining() {
            return Err(ApduError::InvalidLength);
        }

        self.buff[self.len..][..data.len()].copy_from_slice(data);
        self.len += data.len();

        Ok(())
    }

    /// Append an encodable object to the response
    pub fn encode<E: Encode<Error = ApduError>>(&mut self, v: &E) -> Result<usize, ApduError> {
        let n = v.encode(&mut self.buff[self.len..self.max])?;
        self.len += n;
        Ok(n)
    }

    /// Writable tail of the response buffer, commit with [Response::advance]
    pub fn tail(&mut self) -> &mut [u8] {
        &mut self.buff[self.len..self.max]
    }

    /// Commit `n` bytes written via [Response::tail]
    pub fn advance(&mut self, n: usize) -> Result<(), ApduError> {
        if n > self.remaining() {
            return Err(ApduError::InvalidLength);
        }
        self.len += n;
        Ok(())
    }

    /// Discard response data
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Current status word
    pub fn sw(&self) -> u16 {
        self.sw
    }

    /// Set the response status word
    pub fn set_sw(&mut self, sw: impl Into<u16>) {
        self.sw = sw.into();
    }

    /// Append the status word (big-endian) and return the total response length
    pub fn finish(self) -> usize {
        let sw = self.sw.to_be_bytes();
        self.buff[self.len..][..2].copy_from_slice(&sw);
        self.len + 2
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_status() {
        let mut b = [0u8; 16];
        let r = Response::new(&mut b);
        assert_eq!(r.sw(), 0x6f00);

        let n = r.finish();
        assert_eq!(&b[..n], &[0x6f, 0x00]);
    }

    #[test]
    fn push_finish() {
        let mut b = [0u8; 16];
        let mut r = Response::new(&mut b);

        r.push(&[0x01, 0x02, 0x03]).unwrap();
        r.set_sw(StatusWord::Ok);

        let n = r.finish();
        assert_eq!(&b[..n], &[0x01, 0x02, 0x03, 0x90, 0x00]);
    }

    #[test]
    fn capacity() {
        let mut b = [0u8; 6];
        let mut r = Response::new(&mut b);

        // Two bytes are held back for the status word
        assert_eq!(r.remaining(), 4);
        assert!(r.push(&[0u8; 5]).is_err());
        r.push(&[0u8; 4]).unwrap();
        assert_eq!(r.remaining(), 0);
    }
}
