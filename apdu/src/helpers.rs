// Copyright (c) 2022-2023 The MobileCoin Foundation

/// Encoding helper for fixed size byte arrays
pub(crate) mod arr {
    use encdec::Error;

    pub fn enc<const N: usize>(d: &[u8; N], buff: &mut [u8]) -> Result<usize, Error> {
        if buff.len() < d.len() {
            return Err(Error::Length);
        }

        buff[..d.len()].copy_from_slice(&d[..]);

        Ok(d.len())
    }

    pub fn enc_len<const N: usize>(d: &[u8; N]) -> Result<usize, Error> {
        Ok(d.len())
    }

    pub fn dec<const N: usize>(buff: &[u8]) -> Result<([u8; N], usize), Error> {
        if buff.len() < N {
            return Err(Error::Length);
        }

        let mut d = [0u8; N];
        d.copy_from_slice(&buff[..N]);

        Ok((d, N))
    }
}

/// Encoding helper for big-endian `u32` fields
pub(crate) mod be32 {
    use byteorder::{BigEndian, ByteOrder};
    use encdec::Error;

    pub fn enc(v: &u32, buff: &mut [u8]) -> Result<usize, Error> {
        if buff.len() < 4 {
            return Err(Error::Length);
        }

        BigEndian::write_u32(buff, *v);

        Ok(4)
    }

    pub fn enc_len(_v: &u32) -> Result<usize, Error> {
        Ok(4)
    }

    pub fn dec(buff: &[u8]) -> Result<(u32, usize), Error> {
        if buff.len() < 4 {
            return Err(Error::Length);
        }

        Ok((BigEndian::read_u32(buff), 4))
    }
}
