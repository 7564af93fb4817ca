// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Incremental bitcoin transaction field parsers
//!
//! Transactions arrive in arbitrarily split APDU chunks, parsers consume
//! as much of each chunk as possible and retain partial fields between
//! calls.

use heapless::Vec;

use crate::{consts::MAX_SCRIPT_LEN, Error};

/// Fixed length field accumulator
#[derive(Clone, Debug)]
pub struct Fill<const N: usize> {
    buff: Vec<u8, N>,
}

impl<const N: usize> Default for Fill<N> {
    fn default() -> Self {
        Self { buff: Vec::new() }
    }
}

impl<const N: usize> Fill<N> {
    pub const fn new() -> Self {
        Self { buff: Vec::new() }
    }

    /// Consume bytes from `data` until `n` bytes are held, returning true when complete
    pub fn fill(&mut self, data: &mut &[u8], n: usize) -> bool {
        assert!(n <= N);

        let take = (n - self.buff.len().min(n)).min(data.len());
        // Capacity is checked above
        let _ = self.buff.extend_from_slice(&data[..take]);
        *data = &data[take..];

        self.buff.len() == n
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buff
    }

    pub fn clear(&mut self) {
        self.buff.clear();
    }
}

/// Bitcoin compact size (varint) accumulator
#[derive(Clone, Debug, Default)]
pub struct VarInt {
    buff: Fill<9>,
}

impl VarInt {
    pub const fn new() -> Self {
        Self { buff: Fill::new() }
    }

    /// Consume bytes from `data`, returning the decoded value once complete.
    ///
    /// Non-canonical encodings are rejected.
    pub fn read(&mut self, data: &mut &[u8]) -> Result<Option<u64>, Error> {
        if !self.buff.fill(data, 1) {
            return Ok(None);
        }

        let len = match self.buff.bytes()[0] {
            0xfd => 3,
            0xfe => 5,
            0xff => 9,
            _ => 1,
        };

        if !self.buff.fill(data, len) {
            return Ok(None);
        }

        let b = self.buff.bytes();
        let (v, min) = match len {
            1 => (b[0] as u64, 0),
            3 => (u16::from_le_bytes([b[1], b[2]]) as u64, 0xfd),
            5 => (u32::from_le_bytes([b[1], b[2], b[3], b[4]]) as u64, 0x1_0000),
            _ => {
                let mut a = [0u8; 8];
                a.copy_from_slice(&b[1..9]);
                (u64::from_le_bytes(a), 0x1_0000_0000)
            }
        };

        if v < min {
            return Err(Error::ParsingFailed);
        }

        Ok(Some(v))
    }

    /// Raw encoded bytes (valid once [VarInt::read] completes)
    pub fn bytes(&self) -> &[u8] {
        self.buff.bytes()
    }

    pub fn clear(&mut self) {
        self.buff.clear();
    }
}

/// Encode a compact size, returning the encoded length
pub fn write_varint(v: u64, buff: &mut [u8; 9]) -> usize {
    match v {
        0..=0xfc => {
            buff[0] = v as u8;
            1
        }
        0xfd..=0xffff => {
            buff[0] = 0xfd;
            buff[1..3].copy_from_slice(&(v as u16).to_le_bytes());
            3
        }
        0x1_0000..=0xffff_ffff => {
            buff[0] = 0xfe;
            buff[1..5].copy_from_slice(&(v as u32).to_le_bytes());
            5
        }
        _ => {
            buff[0] = 0xff;
            buff[1..9].copy_from_slice(&v.to_le_bytes());
            9
        }
    }
}

/// Output list fields reported by [OutputsParser]
#[derive(Clone, PartialEq, Debug)]
pub enum OutputField<'a> {
    /// Number of outputs
    Count(u64),
    /// Output amount
    Amount { index: u64, value: u64 },
    /// Output script length
    ScriptLen { index: u64, len: u64 },
    /// Output script bytes, may be split across calls
    Script { index: u64, data: &'a [u8] },
    /// Output script complete
    ScriptEnd { index: u64 },
}

#[derive(Copy, Clone, PartialEq, Debug)]
enum OutputStage {
    Count,
    Amount,
    ScriptLen,
    Script { remaining: u64 },
    Done,
}

/// Incremental parser for a transaction output list (count, then amount
/// and script per output)
#[derive(Clone, Debug)]
pub struct OutputsParser {
    stage: OutputStage,
    count: u64,
    index: u64,
    amount: Fill<8>,
    varint: VarInt,
}

impl Default for OutputsParser {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputsParser {
    pub const fn new() -> Self {
        Self {
            stage: OutputStage::Count,
            count: 0,
            index: 0,
            amount: Fill::new(),
            varint: VarInt::new(),
        }
    }

    /// Check whether all outputs have been parsed
    pub fn is_done(&self) -> bool {
        self.stage == OutputStage::Done
    }

    /// Consume output data, reporting parsed fields to `visit`.
    ///
    /// Stops once the output list is complete, leaving trailing bytes in `data`.
    pub fn feed<F>(&mut self, data: &mut &[u8], mut visit: F) -> Result<(), Error>
    where
        F: FnMut(OutputField) -> Result<(), Error>,
    {
        loop {
            match self.stage {
                OutputStage::Count => {
                    let n = match self.varint.read(data)? {
                        Some(n) => n,
                        None => return Ok(()),
                    };
                    self.varint.clear();

                    if n == 0 {
                        return Err(Error::ParsingFailed);
                    }

                    self.count = n;
                    visit(OutputField::Count(n))?;
                    self.stage = OutputStage::Amount;
                }
                OutputStage::Amount => {
                    if !self.amount.fill(data, 8) {
                        return Ok(());
                    }

                    let mut a = [0u8; 8];
                    a.copy_from_slice(self.amount.bytes());
                    self.amount.clear();

                    visit(OutputField::Amount {
                        index: self.index,
                        value: u64::from_le_bytes(a),
                    })?;
                    self.stage = OutputStage::ScriptLen;
                }
                OutputStage::ScriptLen => {
                    let len = match self.varint.read(data)? {
                        Some(n) => n,
                        None => return Ok(()),
                    };
                    self.varint.clear();

                    if len > MAX_SCRIPT_LEN {
                        return Err(Error::ParsingFailed);
                    }

                    visit(OutputField::ScriptLen {
                        index: self.index,
                        len,
                    })?;
                    self.stage = OutputStage::Script { remaining: len };
                }
                OutputStage::Script { remaining } => {
                    if remaining > 0 {
                        if data.is_empty() {
                            return Ok(());
                        }

                        let n = (remaining as usize).min(data.len());
                        visit(OutputField::Script {
                            index: self.index,
                            data: &data[..n],
                        })?;
                        *data = &data[n..];

                        self.stage = OutputStage::Script {
                            remaining: remaining - n as u64,
                        };
                        continue;
                    }

                    visit(OutputField::ScriptEnd { index: self.index })?;

                    self.index += 1;
                    self.stage = match self.index == self.count {
                        true => OutputStage::Done,
                        false => OutputStage::Amount,
                    };
                }
                OutputStage::Done => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn fill_split() {
        let mut f = Fill::<4>::new();

        let mut d: &[u8] = &[1, 2];
        assert!(!f.fill(&mut d, 4));
        assert!(d.is_empty());

        let mut d: &[u8] = &[3, 4, 5];
        assert!(f.fill(&mut d, 4));
        assert_eq!(f.bytes(), &[1, 2, 3, 4]);
        assert_eq!(d, &[5]);
    }

    #[test]
    fn varint_split() {
        let mut v = VarInt::new();

        let mut d: &[u8] = &[0xfd, 0x00];
        assert_eq!(v.read(&mut d), Ok(None));

        let mut d: &[u8] = &[0x01, 0xaa];
        assert_eq!(v.read(&mut d), Ok(Some(0x100)));
        assert_eq!(v.bytes(), &[0xfd, 0x00, 0x01]);
        assert_eq!(d, &[0xaa]);
    }

    #[test]
    fn varint_non_canonical() {
        let mut v = VarInt::new();
        let mut d: &[u8] = &[0xfd, 0x10, 0x00];
        assert_eq!(v.read(&mut d), Err(Error::ParsingFailed));

        let mut v = VarInt::new();
        let mut d: &[u8] = &[0xfe, 0xff, 0xff, 0x00, 0x00];
        assert_eq!(v.read(&mut d), Err(Error::ParsingFailed));
    }

    #[test]
    fn varint_encode() {
        let mut b = [0u8; 9];
        assert_eq!(write_varint(0xfc, &mut b), 1);
        assert_eq!(write_varint(0xfd, &mut b), 3);
        assert_eq!(&b[..3], &[0xfd, 0xfd, 0x00]);
        assert_eq!(write_varint(0x1_0000, &mut b), 5);
        assert_eq!(write_varint(u64::MAX, &mut b), 9);
    }

    // Two outputs: 0.5 BTC to a P2PKH script, 0.25 BTC to an empty script
    const OUTPUTS: [u8; 44] = hex!(
        "02"
        "80f0fa0200000000"
        "19" "76a914000102030405060708090a0b0c0d0e0f1011121388ac"
        "40787d0100000000"
        "00"
    );

    fn parse_all(chunk: usize) -> (u64, u64, usize) {
        let mut p = OutputsParser::new();
        let (mut count, mut total, mut script) = (0, 0, 0);

        for c in OUTPUTS.chunks(chunk) {
            let mut d = c;
            p.feed(&mut d, |f| {
                match f {
                    OutputField::Count(n) => count = n,
                    OutputField::Amount { value, .. } => total += value,
                    OutputField::Script { data, .. } => script += data.len(),
                    _ => (),
                }
                Ok(())
            })
            .unwrap();
            assert!(d.is_empty());
        }

        assert!(p.is_done());
        (count, total, script)
    }

    #[test]
    fn outputs_any_split() {
        for chunk in 1..=OUTPUTS.len() {
            assert_eq!(parse_all(chunk), (2, 75_000_000, 25), "chunk size {}", chunk);
        }
    }

    #[test]
    fn outputs_trailing_bytes() {
        let mut p = OutputsParser::new();
        let mut d: &[u8] = &[0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0x00, 0xaa];

        p.feed(&mut d, |_| Ok(())).unwrap();
        assert!(p.is_done());
        assert_eq!(d, &[0xaa]);
    }

    #[test]
    fn outputs_rejects_empty_and_oversized() {
        let mut p = OutputsParser::new();
        let mut d: &[u8] = &[0x00];
        assert_eq!(p.feed(&mut d, |_| Ok(())), Err(Error::ParsingFailed));

        let mut p = OutputsParser::new();
        let mut d: &[u8] = &[0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0xfd, 0x11, 0x27];
        assert_eq!(p.feed(&mut d, |_| Ok(())), Err(Error::ParsingFailed));
    }
}
