// Copyright (c) 2022-2023 The MobileCoin Foundation

//! ISO7816-4 command APDU parsing
//!
//! Commands are recognised by total length only, the following shapes are
//! accepted and everything else is rejected:
//!
//! ```text
//! len == 4                       CLA INS P1 P2
//! len == 5                       CLA INS P1 P2 Le
//! len == 5 + Lc   (b4 != 0)      CLA INS P1 P2 Lc DATA
//! len == 6 + Lc   (b4 != 0)      CLA INS P1 P2 Lc DATA Le
//! len == 7        (b4 == 0)      CLA INS P1 P2 00 Le1 Le2
//! len == 7 + Lc   (b4 == 0)      CLA INS P1 P2 00 Lc1 Lc2 DATA
//! len == 9 + Lc   (b4 == 0)      CLA INS P1 P2 00 Lc1 Lc2 DATA Le1 Le2
//! ```

use byteorder::{BigEndian, ByteOrder};

use crate::ApduError;

/// Length of the mandatory command header
pub const HEADER_LEN: usize = 4;

/// Parsed command APDU, borrowing the data field from the request buffer
#[derive(Clone, PartialEq, Debug)]
pub struct Command<'a> {
    /// Class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// First parameter
    pub p1: u8,
    /// Second parameter
    pub p2: u8,
    /// Declared command data length, if present
    pub lc: Option<u16>,
    /// Command data (empty when `lc` is absent)
    pub data: &'a [u8],
    /// Offset of `data` in the request buffer
    pub data_offset: usize,
    /// Expected response length, if present
    pub le: Option<u16>,
    /// Set for extended length encodings
    pub extended: bool,
}

impl<'a> Command<'a> {
    /// Parse a raw command buffer
    pub fn parse(buff: &'a [u8]) -> Result<Self, ApduError> {
        let len = buff.len();
        if len < HEADER_LEN {
            return Err(ApduError::InvalidLength);
        }

        let mut c = Command {
            cla: buff[0],
            ins: buff[1],
            p1: buff[2],
            p2: buff[3],
            lc: None,
            data: &[],
            data_offset: HEADER_LEN,
            le: None,
            extended: false,
        };

        // Header only
        if len == HEADER_LEN {
            return Ok(c);
        }

        // Short Le only
        if len == 5 {
            c.le = Some(buff[4] as u16);
            return Ok(c);
        }

        // Short Lc forms
        if buff[4] != 0 {
            let lc = buff[4] as usize;

            if len == 5 + lc {
                c.lc = Some(lc as u16);
                c.data_offset = 5;
                c.data = &buff[5..][..lc];
                return Ok(c);
            }

            if len == 6 + lc {
                c.lc = Some(lc as u16);
                c.data_offset = 5;
                c.data = &buff[5..][..lc];
                c.le = Some(buff[len - 1] as u16);
                return Ok(c);
            }

            return Err(ApduError::InvalidLength);
        }

        // Extended forms, all of which need the two length bytes after the marker
        if len < 7 {
            return Err(ApduError::InvalidLength);
        }
        c.extended = true;

        // Extended Le only
        if len == 7 {
            c.le = Some(BigEndian::read_u16(&buff[5..7]));
            return Ok(c);
        }

        let lc = BigEndian::read_u16(&buff[5..7]) as usize;
        if lc == 0 {
            return Err(ApduError::InvalidLength);
        }

        if len == 7 + lc {
            c.lc = Some(lc as u16);
            c.data_offset = 7;
            c.data = &buff[7..][..lc];
            return Ok(c);
        }

        if len == 9 + lc {
            c.lc = Some(lc as u16);
            c.data_offset = 7;
            c.data = &buff[7..][..lc];
            c.le = Some(BigEndian::read_u16(&buff[len - 2..]));
            return Ok(c);
        }

        Err(ApduError::InvalidLength)
    }

    /// Combined 16-bit P1P2 parameter
    pub fn p1p2(&self) -> u16 {
        (self.p1 as u16) << 8 | self.p2 as u16
    }

    /// Encode a short command APDU (used by hosts and tests),
    /// returning the encoded length
    pub fn encode_short(
        cla: u8,
        ins: u8,
        p1: u8,
        p2: u8,
        data: &[u8],
        buff: &mut [u8],
    ) -> Result<usize, ApduError> {
        if data.len() > 255 || buff.len() < HEADER_LEN + 1 + data.len() {
            return Err(ApduError::InvalidLength);
        }

        buff[..HEADER_LEN].copy_from_slice(&[cla, ins, p1, p2]);
        if data.is_empty() {
            return Ok(HEADER_LEN);
        }

        buff[4] = data.len() as u8;
        buff[5..][..data.len()].copy_from_slice(data);

        Ok(5 + data.len())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// (lc, le, data offset) expected for each legal shape
    type Shape = (Option<u16>, Option<u16>, usize);

    fn shape(c: &Command) -> Shape {
        (c.lc, c.le, c.data_offset)
    }

    #[test]
    fn header_only() {
        let c = Command::parse(&[0xe0, 0xc4, 0x00, 0x00]).unwrap();
        assert_eq!(shape(&c), (None, None, 4));
        assert!(c.data.is_empty());
    }

    #[test]
    fn short_le() {
        let c = Command::parse(&[0xe0, 0xc0, 0x00, 0x00, 0x20]).unwrap();
        assert_eq!(shape(&c), (None, Some(0x20), 4));

        // A zero Le byte is still a short Le
        let c = Command::parse(&[0xe0, 0xc0, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(shape(&c), (None, Some(0), 4));
    }

    #[test]
    fn short_lc() {
        let b = [0xe0, 0x22, 0x00, 0x00, 0x03, 0xaa, 0xbb, 0xcc];
        let c = Command::parse(&b).unwrap();
        assert_eq!(shape(&c), (Some(3), None, 5));
        assert_eq!(c.data, &[0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn short_lc_le() {
        let b = [0xe0, 0x22, 0x00, 0x00, 0x02, 0xaa, 0xbb, 0x10];
        let c = Command::parse(&b).unwrap();
        assert_eq!(shape(&c), (Some(2), Some(0x10), 5));
        assert_eq!(c.data, &[0xaa, 0xbb]);
    }

    #[test]
    fn extended_le() {
        let b = [0xe0, 0xc0, 0x00, 0x00, 0x00, 0x01, 0x00];
        let c = Command::parse(&b).unwrap();
        assert_eq!(shape(&c), (None, Some(0x0100), 4));
        assert!(c.extended);
    }

    #[test]
    fn extended_lc() {
        let mut b = [0u8; 7 + 300];
        b[..7].copy_from_slice(&[0xe0, 0x42, 0x00, 0x00, 0x00, 0x01, 0x2c]);
        b[7] = 0x55;

        let c = Command::parse(&b).unwrap();
        assert_eq!(shape(&c), (Some(300), None, 7));
        assert_eq!(c.data.len(), 300);
        assert_eq!(c.data[0], 0x55);
    }

    #[test]
    fn extended_lc_le() {
        let mut b = [0u8; 9 + 300];
        b[..7].copy_from_slice(&[0xe0, 0x42, 0x00, 0x00, 0x00, 0x01, 0x2c]);
        b[9 + 300 - 2] = 0x02;
        b[9 + 300 - 1] = 0x00;

        let c = Command::parse(&b).unwrap();
        assert_eq!(shape(&c), (Some(300), Some(0x0200), 7));
        assert_eq!(c.data.len(), 300);
    }

    #[test]
    fn invalid_shapes() {
        // Too short for a header
        assert!(Command::parse(&[]).is_err());
        assert!(Command::parse(&[0xe0, 0xc4, 0x00]).is_err());

        // Short Lc mismatch (one byte missing, two bytes extra)
        assert!(Command::parse(&[0xe0, 0x22, 0x00, 0x00, 0x03, 0xaa, 0xbb]).is_err());
        assert!(Command::parse(&[0xe0, 0x22, 0x00, 0x00, 0x01, 0xaa, 0xbb, 0xcc]).is_err());

        // Extended marker with a truncated length
        assert!(Command::parse(&[0xe0, 0x22, 0x00, 0x00, 0x00, 0x01]).is_err());

        // Extended Lc of zero with data
        assert!(Command::parse(&[0xe0, 0x22, 0x00, 0x00, 0x00, 0x00, 0x00, 0xaa]).is_err());

        // Extended Lc mismatch
        let b = [0xe0, 0x22, 0x00, 0x00, 0x00, 0x00, 0x02, 0xaa, 0xbb, 0xcc];
        assert!(Command::parse(&b).is_err());
    }

    #[test]
    fn encode_parse() {
        let mut b = [0u8; 64];

        let n = Command::encode_short(0xe0, 0x22, 0x01, 0x02, b"1234", &mut b).unwrap();
        let c = Command::parse(&b[..n]).unwrap();

        assert_eq!((c.cla, c.ins, c.p1, c.p2), (0xe0, 0x22, 0x01, 0x02));
        assert_eq!(c.p1p2(), 0x0102);
        assert_eq!(c.data, b"1234");
    }
}
