// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Trusted input generation
//!
//! A previous transaction is streamed to the device, which computes its
//! txid and extracts the amount of the requested output, returning both
//! in a [TrustedInput] blob MACed with a device-held key. Signing later
//! accepts only inputs whose blob MAC verifies, so input amounts shown to
//! the user cannot be forged by the host.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::{
    apdu::trusted_input::{TrustedInput, TRUSTED_INPUT_MAC_OFFSET},
    consts::MAX_SCRIPT_LEN,
    Error,
};

use super::parser::{Fill, OutputField, OutputsParser, VarInt};

type HmacSha256 = Hmac<Sha256>;

/// Trusted input parsing progress
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Progress {
    /// More transaction data required
    GiveMoreInput,
    /// Transaction complete, trusted input available
    Complete,
}

#[derive(Copy, Clone, PartialEq, Debug)]
enum Stage {
    Version,
    InputCount,
    Outpoint,
    ScriptLen,
    Script { remaining: u64 },
    Sequence,
    Outputs,
    LockTime,
    Done,
}

/// Streaming previous-transaction parser
#[derive(Clone, Debug)]
pub struct TrustedInputGenerator {
    stage: Stage,
    index: u32,
    inputs: u64,
    input: u64,
    amount: Option<u64>,
    hasher: Sha256,
    fill: Fill<36>,
    varint: VarInt,
    outputs: OutputsParser,
}

impl TrustedInputGenerator {
    /// Start parsing a transaction, extracting output `index`
    pub fn new(index: u32) -> Self {
        Self {
            stage: Stage::Version,
            index,
            inputs: 0,
            input: 0,
            amount: None,
            hasher: Sha256::new(),
            fill: Fill::new(),
            varint: VarInt::new(),
            outputs: OutputsParser::new(),
        }
    }

    /// Consume a chunk of the serialised transaction
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Progress, Error> {
        if self.stage == Stage::Done {
            return Err(Error::InvalidState);
        }

        self.hasher.update(chunk);

        let mut data = chunk;

        loop {
            match self.stage {
                Stage::Version => {
                    if !self.fill.fill(&mut data, 4) {
                        break;
                    }
                    self.fill.clear();
                    self.stage = Stage::InputCount;
                }
                Stage::InputCount => {
                    let n = match self.varint.read(&mut data)? {
                        Some(n) => n,
                        None => break,
                    };
                    self.varint.clear();

                    // Zero inputs (or a segwit marker) is not supported
                    if n == 0 {
                        return Err(Error::ParsingFailed);
                    }

                    self.inputs = n;
                    self.stage = Stage::Outpoint;
                }
                Stage::Outpoint => {
                    if !self.fill.fill(&mut data, 36) {
                        break;
                    }
                    self.fill.clear();
                    self.stage = Stage::ScriptLen;
                }
                Stage::ScriptLen => {
                    let len = match self.varint.read(&mut data)? {
                        Some(n) => n,
                        None => break,
                    };
                    self.varint.clear();

                    if len > MAX_SCRIPT_LEN {
                        return Err(Error::ParsingFailed);
                    }

                    self.stage = Stage::Script { remaining: len };
                }
                Stage::Script { remaining } => {
                    if remaining > 0 {
                        if data.is_empty() {
                            break;
                        }
                        let n = (remaining as usize).min(data.len());
                        data = &data[n..];
                        self.stage = Stage::Script {
                            remaining: remaining - n as u64,
                        };
                        continue;
                    }
                    self.stage = Stage::Sequence;
                }
                Stage::Sequence => {
                    if !self.fill.fill(&mut data, 4) {
                        break;
                    }
                    self.fill.clear();

                    self.input += 1;
                    self.stage = match self.input == self.inputs {
                        true => Stage::Outputs,
                        false => Stage::Outpoint,
                    };
                }
                Stage::Outputs => {
                    let (index, amount) = (self.index as u64, &mut self.amount);

                    self.outputs.feed(&mut data, |f| {
                        match f {
                            // Fail early when the requested output can not exist
                            OutputField::Count(n) if index >= n => {
                                return Err(Error::ParsingFailed)
                            }
                            OutputField::Amount { index: i, value } if i == index => {
                                *amount = Some(value)
                            }
                            _ => (),
                        }
                        Ok(())
                    })?;

                    if !self.outputs.is_done() {
                        break;
                    }
                    self.stage = Stage::LockTime;
                }
                Stage::LockTime => {
                    if !self.fill.fill(&mut data, 4) {
                        break;
                    }
                    self.fill.clear();
                    self.stage = Stage::Done;
                }
                Stage::Done => break,
            }
        }

        match (self.stage, data.is_empty()) {
            // Trailing bytes after lock time
            (Stage::Done, false) => Err(Error::ParsingFailed),
            (Stage::Done, true) if self.amount.is_some() => Ok(Progress::Complete),
            (Stage::Done, true) => Err(Error::InvalidData),
            _ => Ok(Progress::GiveMoreInput),
        }
    }

    /// Transaction ID (internal byte order), available once complete
    pub fn txid(&self) -> Result<[u8; 32], Error> {
        if self.stage != Stage::Done {
            return Err(Error::InvalidState);
        }

        Ok(Sha256::digest(self.hasher.clone().finalize()).into())
    }

    /// Transaction ID, output index and amount, available once complete
    pub fn hash_index_amount(&self) -> Result<([u8; 32], u32, u64), Error> {
        let amount = self.amount.ok_or(Error::InvalidState)?;
        Ok((self.txid()?, self.index, amount))
    }

    /// Build the MACed trusted input for the parsed transaction
    pub fn trusted_input(&self, nonce: [u8; 2], key: &[u8; 32]) -> Result<TrustedInput, Error> {
        let (txid, index, amount) = self.hash_index_amount()?;

        let mut t = TrustedInput::new(nonce, txid, index, amount);
        t.mac = compute_mac(key, &t)?;

        Ok(t)
    }
}

/// Compute a trusted input MAC
pub fn compute_mac(key: &[u8; 32], t: &TrustedInput) -> Result<[u8; 32], Error> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| Error::InvalidLength)?;
    mac.update(&t.to_bytes()[..TRUSTED_INPUT_MAC_OFFSET]);

    Ok(mac.finalize().into_bytes().into())
}

/// Verify a trusted input MAC
pub fn verify_mac(key: &[u8; 32], t: &TrustedInput) -> Result<(), Error> {
    let b = t.to_bytes();

    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| Error::InvalidLength)?;
    mac.update(&b[..TRUSTED_INPUT_MAC_OFFSET]);

    mac.verify_slice(&b[TRUSTED_INPUT_MAC_OFFSET..])
        .map_err(|_| Error::UntrustedInput)
}

#[cfg(test)]
mod test {
    use hex_literal::hex;

    use super::*;
    use crate::helpers::sha256d;

    /// One input, two outputs (0.5 and 0.25 BTC)
    const TX: [u8; 97] = hex!(
        "01000000"
        "01"
        "1111111111111111111111111111111111111111111111111111111111111111" "00000000"
        "03" "aabbcc"
        "ffffffff"
        "02"
        "80f0fa0200000000" "19" "76a914000102030405060708090a0b0c0d0e0f1011121388ac"
        "40787d0100000000" "00"
        "00000000"
    );

    const KEY: [u8; 32] = [0x77; 32];

    #[test]
    fn trusted_input_any_split() {
        for chunk in 1..=TX.len() {
            let mut g = TrustedInputGenerator::new(1);

            let mut chunks = TX.chunks(chunk).peekable();
            while let Some(c) = chunks.next() {
                let p = g.feed(c).unwrap();
                match chunks.peek() {
                    Some(_) => assert_eq!(p, Progress::GiveMoreInput),
                    None => assert_eq!(p, Progress::Complete),
                }
            }

            let t = g.trusted_input([0xab, 0xcd], &KEY).unwrap();
            assert_eq!(t.txid, sha256d(&TX));
            assert_eq!(t.index, 1);
            assert_eq!(t.amount, 25_000_000);
            verify_mac(&KEY, &t).unwrap();
        }
    }

    #[test]
    fn index_out_of_range() {
        let mut g = TrustedInputGenerator::new(2);
        assert_eq!(g.feed(&TX[..50]), Err(Error::ParsingFailed));
    }

    #[test]
    fn trailing_bytes() {
        let mut g = TrustedInputGenerator::new(0);
        let mut tx = [0u8; 98];
        tx[..97].copy_from_slice(&TX);

        assert_eq!(g.feed(&tx), Err(Error::ParsingFailed));
    }

    #[test]
    fn tampered_mac() {
        let mut g = TrustedInputGenerator::new(0);
        g.feed(&TX).unwrap();

        let mut t = g.trusted_input([0, 0], &KEY).unwrap();
        assert_eq!(t.amount, 50_000_000);

        t.amount += 1;
        assert_eq!(verify_mac(&KEY, &t), Err(Error::UntrustedInput));

        t.amount -= 1;
        assert_eq!(verify_mac(&[0x78; 32], &t), Err(Error::UntrustedInput));
    }

    #[test]
    fn feed_after_complete() {
        let mut g = TrustedInputGenerator::new(0);
        g.feed(&TX).unwrap();
        assert_eq!(g.feed(&[0]), Err(Error::InvalidState));
    }
}
