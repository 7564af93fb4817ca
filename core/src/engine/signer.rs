// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Bitcoin transaction signing context
//!
//! Transactions are streamed in passes, each pass consisting of the inputs
//! (`HashInputStart`) followed by the outputs (`HashInputFinalizeFull`)
//! and a signature (`HashSign`).
//!
//! - Legacy transactions require one pass per input, each pass carries the
//!   script for the input being signed. An integrity hash over the inputs
//!   (excluding scripts) and outputs is recorded on the first pass, later
//!   passes must match it.
//! - Segwit transactions stream all inputs and outputs once to compute the
//!   BIP-143 `hashPrevouts`, `hashSequence` and `hashOutputs`, then one
//!   single-input continuation pass per input to be signed.
//!
//! The user confirms the transaction summary once, before the first
//! signature.

use heapless::Vec;
use sha2::{Digest, Sha256};

use crate::{
    apdu::{
        btc::{INPUT_SEGWIT, INPUT_TRUSTED},
        trusted_input::{TrustedInput, TRUSTED_INPUT_LEN},
    },
    consts::{DISPLAY_BUFFER_LEN, MAX_SCRIPT_LEN},
    Error,
};

use super::{
    parser::{write_varint, Fill, OutputField, OutputsParser, VarInt},
    trusted_input::verify_mac,
};

/// `HashInputStart` transaction mode
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum StartMode {
    /// First pass of a legacy transaction
    New,
    /// First pass of a segwit transaction
    NewSegwit,
    /// Subsequent pass of the current transaction
    Continue,
}

/// Transaction summary presented for user confirmation
#[derive(Clone, PartialEq, Debug, Default)]
pub struct TxSummary {
    /// Number of inputs
    pub inputs: u64,
    /// Sum of input amounts
    pub total_in: u64,
    /// Number of outputs
    pub outputs: u64,
    /// Sum of output amounts
    pub total_out: u64,
    /// Sum of outputs paying to the declared change key
    pub change: u64,
    /// Raw output data for display
    pub body: Vec<u8, DISPLAY_BUFFER_LEN>,
    /// Set where output data exceeded the display buffer
    pub truncated: bool,
}

impl TxSummary {
    /// Transaction fee
    pub fn fee(&self) -> u64 {
        self.total_in.saturating_sub(self.total_out)
    }

    /// Amount leaving the wallet, excluding change
    pub fn spend(&self) -> u64 {
        self.total_out.saturating_sub(self.change)
    }
}

/// Signing context stage
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Stage {
    /// No pass in progress
    Idle,
    /// Receiving inputs
    Inputs,
    /// Inputs complete, awaiting outputs
    InputsDone,
    /// Receiving outputs
    Outputs,
    /// Ready to sign an input
    ReadyToSign,
    /// Segwit transaction authorised, awaiting a continuation pass
    AwaitingInput,
}

#[derive(Copy, Clone, PartialEq, Debug)]
enum Pass {
    New,
    Continue,
}

#[derive(Copy, Clone, PartialEq, Debug)]
enum InputStage {
    Version,
    Count,
    Flag,
    BlobLen,
    Blob,
    Outpoint,
    Amount,
    ScriptLen,
    Script { remaining: u64 },
    Sequence,
    Done,
}

/// Transaction signing context
#[derive(Clone, Debug)]
pub struct TxSigner {
    stage: Stage,
    pass: Pass,
    segwit: bool,
    signed: bool,
    authorized: Option<[u8; 32]>,
    change: Option<[u8; 20]>,

    input_stage: InputStage,
    inputs: u64,
    input: u64,
    amount: [u8; 8],
    fill: Fill<TRUSTED_INPUT_LEN>,
    varint: VarInt,

    signing: Sha256,
    integrity: Sha256,

    prevouts: Sha256,
    sequences: Sha256,
    outputs_hash: Sha256,
    hash_prevouts: [u8; 32],
    hash_sequence: [u8; 32],
    hash_outputs: [u8; 32],

    outputs: OutputsParser,
    output_amount: u64,
    script: Vec<u8, 25>,

    summary: TxSummary,
}

impl Default for TxSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl TxSigner {
    pub fn new() -> Self {
        Self {
            stage: Stage::Idle,
            pass: Pass::New,
            segwit: false,
            signed: false,
            authorized: None,
            change: None,
            input_stage: InputStage::Version,
            inputs: 0,
            input: 0,
            amount: [0u8; 8],
            fill: Fill::new(),
            varint: VarInt::new(),
            signing: Sha256::new(),
            integrity: Sha256::new(),
            prevouts: Sha256::new(),
            sequences: Sha256::new(),
            outputs_hash: Sha256::new(),
            hash_prevouts: [0u8; 32],
            hash_sequence: [0u8; 32],
            hash_outputs: [0u8; 32],
            outputs: OutputsParser::new(),
            output_amount: 0,
            script: Vec::new(),
            summary: TxSummary::default(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_segwit(&self) -> bool {
        self.segwit
    }

    /// Transaction summary, complete once outputs for the first pass are received
    pub fn summary(&self) -> &TxSummary {
        &self.summary
    }

    /// Check whether a signature for this transaction was already approved
    pub fn is_approved(&self) -> bool {
        self.signed
    }

    /// Handle a `HashInputStart` block
    pub fn start(
        &mut self,
        mode: StartMode,
        first_block: bool,
        data: &[u8],
        key: &[u8; 32],
    ) -> Result<(), Error> {
        if first_block {
            match mode {
                StartMode::New | StartMode::NewSegwit => {
                    *self = Self::new();
                    self.segwit = mode == StartMode::NewSegwit;
                }
                StartMode::Continue => {
                    // Continuation requires an authorised transaction
                    if self.authorized.is_none() {
                        return Err(Error::InvalidState);
                    }
                    self.pass = Pass::Continue;
                }
            }

            self.signing = Sha256::new();
            self.integrity = Sha256::new();
            self.input_stage = InputStage::Version;
            self.inputs = 0;
            self.input = 0;
            self.fill.clear();
            self.varint.clear();
            self.outputs = OutputsParser::new();
            self.stage = Stage::Inputs;
        } else if self.stage != Stage::Inputs {
            return Err(Error::InvalidState);
        }

        self.feed_inputs(data, key)
    }

    fn legacy_hashing(&self) -> bool {
        !self.segwit
    }

    fn segwit_new(&self) -> bool {
        self.segwit && self.pass == Pass::New
    }

    fn segwit_continue(&self) -> bool {
        self.segwit && self.pass == Pass::Continue
    }

    fn feed_inputs(&mut self, mut data: &[u8], key: &[u8; 32]) -> Result<(), Error> {
        loop {
            match self.input_stage {
                InputStage::Version => {
                    if !self.fill.fill(&mut data, 4) {
                        break;
                    }

                    self.integrity.update(self.fill.bytes());
                    if self.legacy_hashing() {
                        self.signing.update(self.fill.bytes());
                    } else if self.segwit_continue() {
                        self.signing.update(self.fill.bytes());
                        self.signing.update(self.hash_prevouts);
                        self.signing.update(self.hash_sequence);
                    }

                    self.fill.clear();
                    self.input_stage = InputStage::Count;
                }
                InputStage::Count => {
                    let n = match self.varint.read(&mut data)? {
                        Some(n) => n,
                        None => break,
                    };

                    if n == 0 || (self.segwit_continue() && n != 1) {
                        return Err(Error::InvalidData);
                    }

                    self.integrity.update(self.varint.bytes());
                    if self.legacy_hashing() {
                        self.signing.update(self.varint.bytes());
                    }
                    self.varint.clear();

                    self.inputs = n;
                    if self.pass == Pass::New {
                        self.summary.inputs = n;
                    }
                    self.input_stage = InputStage::Flag;
                }
                InputStage::Flag => {
                    if !self.fill.fill(&mut data, 1) {
                        break;
                    }
                    let flag = self.fill.bytes()[0];
                    self.fill.clear();

                    self.input_stage = match flag {
                        INPUT_TRUSTED => InputStage::BlobLen,
                        INPUT_SEGWIT if self.segwit => InputStage::Outpoint,
                        _ => return Err(Error::InvalidData),
                    };
                }
                InputStage::BlobLen => {
                    if !self.fill.fill(&mut data, 1) {
                        break;
                    }
                    let len = self.fill.bytes()[0] as usize;
                    self.fill.clear();

                    if len != TRUSTED_INPUT_LEN {
                        return Err(Error::InvalidData);
                    }
                    self.input_stage = InputStage::Blob;
                }
                InputStage::Blob => {
                    if !self.fill.fill(&mut data, TRUSTED_INPUT_LEN) {
                        break;
                    }

                    let t = TrustedInput::parse(self.fill.bytes())?;
                    verify_mac(key, &t)?;
                    self.fill.clear();

                    self.prevout(&t.outpoint(), t.amount)?;
                    self.input_stage = InputStage::ScriptLen;
                }
                InputStage::Outpoint => {
                    if !self.fill.fill(&mut data, 36 + 8) {
                        break;
                    }

                    let mut outpoint = [0u8; 36];
                    outpoint.copy_from_slice(&self.fill.bytes()[..36]);
                    let mut amount = [0u8; 8];
                    amount.copy_from_slice(&self.fill.bytes()[36..]);
                    self.fill.clear();

                    self.prevout(&outpoint, u64::from_le_bytes(amount))?;
                    self.input_stage = InputStage::ScriptLen;
                }
                InputStage::Amount => {
                    // Segwit continuation, amount follows the script code
                    self.signing.update(self.amount);
                    self.input_stage = InputStage::Sequence;
                }
                InputStage::ScriptLen => {
                    let len = match self.varint.read(&mut data)? {
                        Some(n) => n,
                        None => break,
                    };

                    if len > MAX_SCRIPT_LEN {
                        return Err(Error::ParsingFailed);
                    }

                    if !self.segwit_new() {
                        self.signing.update(self.varint.bytes());
                    }
                    self.varint.clear();

                    self.input_stage = InputStage::Script { remaining: len };
                }
                InputStage::Script { remaining } => {
                    if remaining > 0 {
                        if data.is_empty() {
                            break;
                        }

                        let n = (remaining as usize).min(data.len());
                        if !self.segwit_new() {
                            self.signing.update(&data[..n]);
                        }
                        data = &data[n..];

                        self.input_stage = InputStage::Script {
                            remaining: remaining - n as u64,
                        };
                        continue;
                    }

                    self.input_stage = match self.segwit_continue() {
                        true => InputStage::Amount,
                        false => InputStage::Sequence,
                    };
                }
                InputStage::Sequence => {
                    if !self.fill.fill(&mut data, 4) {
                        break;
                    }

                    self.integrity.update(self.fill.bytes());
                    match self.segwit_new() {
                        true => self.sequences.update(self.fill.bytes()),
                        false => self.signing.update(self.fill.bytes()),
                    }
                    self.fill.clear();

                    self.input += 1;
                    if self.input < self.inputs {
                        self.input_stage = InputStage::Flag;
                        continue;
                    }

                    self.input_stage = InputStage::Done;
                    self.inputs_complete();
                }
                InputStage::Done => break,
            }
        }

        if !data.is_empty() {
            return Err(Error::ParsingFailed);
        }

        Ok(())
    }

    /// Process an input outpoint and amount
    fn prevout(&mut self, outpoint: &[u8; 36], amount: u64) -> Result<(), Error> {
        self.integrity.update(outpoint);
        self.integrity.update(amount.to_le_bytes());

        if self.pass == Pass::New {
            self.summary.total_in = self
                .summary
                .total_in
                .checked_add(amount)
                .ok_or(Error::InvalidData)?;
        }

        match self.segwit_new() {
            true => self.prevouts.update(outpoint),
            false => self.signing.update(outpoint),
        }

        self.amount = amount.to_le_bytes();

        Ok(())
    }

    fn inputs_complete(&mut self) {
        if self.segwit_new() {
            self.hash_prevouts = Sha256::digest(self.prevouts.clone().finalize()).into();
            self.hash_sequence = Sha256::digest(self.sequences.clone().finalize()).into();
        }

        self.stage = match self.segwit_continue() {
            true => Stage::ReadyToSign,
            false => Stage::InputsDone,
        };
    }

    /// Declare the change key hash for the first pass
    pub fn set_change(&mut self, key_hash: [u8; 20]) -> Result<(), Error> {
        if self.pass != Pass::New || !matches!(self.stage, Stage::InputsDone | Stage::Outputs) {
            return Err(Error::InvalidState);
        }

        self.change = Some(key_hash);
        Ok(())
    }

    /// Handle a `HashInputFinalizeFull` output block
    pub fn finalize(&mut self, last: bool, data: &[u8]) -> Result<(), Error> {
        match self.stage {
            Stage::InputsDone => {
                self.stage = Stage::Outputs;
                self.outputs = OutputsParser::new();
            }
            Stage::Outputs => (),
            _ => return Err(Error::InvalidState),
        }

        let new_pass = self.pass == Pass::New;
        let segwit_new = self.segwit_new();

        if self.legacy_hashing() {
            self.signing.update(data);
        }
        self.integrity.update(data);

        let summary = &mut self.summary;
        if new_pass && summary.body.extend_from_slice(data).is_err() {
            summary.truncated = true;
        }

        let (script, output_amount, outputs_hash, change) = (
            &mut self.script,
            &mut self.output_amount,
            &mut self.outputs_hash,
            self.change,
        );

        let mut d = data;
        self.outputs.feed(&mut d, |f| {
            match f {
                OutputField::Count(n) => {
                    if new_pass {
                        summary.outputs = n;
                    }
                }
                OutputField::Amount { value, .. } => {
                    if new_pass {
                        summary.total_out = summary
                            .total_out
                            .checked_add(value)
                            .ok_or(Error::InvalidData)?;
                    }
                    if segwit_new {
                        outputs_hash.update(value.to_le_bytes());
                    }
                    *output_amount = value;
                    script.clear();
                }
                OutputField::ScriptLen { len, .. } => {
                    if segwit_new {
                        let mut b = [0u8; 9];
                        let n = write_varint(len, &mut b);
                        outputs_hash.update(&b[..n]);
                    }
                }
                OutputField::Script { data, .. } => {
                    if segwit_new {
                        outputs_hash.update(data);
                    }
                    // Over-long scripts never match a change template
                    if script.extend_from_slice(data).is_err() {
                        script.clear();
                        let _ = script.push(0xff);
                    }
                }
                OutputField::ScriptEnd { .. } => {
                    if let Some(h) = &change {
                        if new_pass && is_change_script(&script[..], h) {
                            summary.change = summary
                                .change
                                .checked_add(*output_amount)
                                .ok_or(Error::InvalidData)?;
                        }
                    }
                }
            }
            Ok(())
        })?;

        if !d.is_empty() {
            return Err(Error::ParsingFailed);
        }

        if !last {
            return Ok(());
        }

        if !self.outputs.is_done() {
            return Err(Error::ParsingFailed);
        }

        let digest: [u8; 32] = self.integrity.clone().finalize().into();
        match self.pass {
            Pass::New => self.authorized = Some(digest),
            Pass::Continue if self.authorized != Some(digest) => {
                #[cfg(feature = "log")]
                log::warn!("transaction changed between passes");

                return Err(Error::IntegrityMismatch);
            }
            Pass::Continue => (),
        }

        if self.segwit {
            self.hash_outputs = Sha256::digest(self.outputs_hash.clone().finalize()).into();
            self.stage = Stage::AwaitingInput;
        } else {
            self.stage = Stage::ReadyToSign;
        }

        Ok(())
    }

    /// Compute the signature hash for the current input
    pub fn digest(&self, lock_time: u32, sighash_type: u8) -> Result<[u8; 32], Error> {
        if self.stage != Stage::ReadyToSign {
            return Err(Error::InvalidState);
        }

        let mut h = self.signing.clone();
        if self.segwit {
            h.update(self.hash_outputs);
        }
        h.update(lock_time.to_le_bytes());
        h.update((sighash_type as u32).to_le_bytes());

        Ok(Sha256::digest(h.finalize()).into())
    }

    /// Mark the current input as signed, completing the pass
    pub fn signed(&mut self) {
        self.signed = true;
        self.stage = match self.segwit {
            true => Stage::AwaitingInput,
            false => Stage::Idle,
        };
    }
}

/// Match P2PKH and P2WPKH scripts paying to `key_hash`
fn is_change_script(script: &[u8], key_hash: &[u8; 20]) -> bool {
    match script {
        [0x76, 0xa9, 0x14, h @ .., 0x88, 0xac] if h.len() == 20 => h == key_hash,
        [0x00, 0x14, h @ ..] if h.len() == 20 => h == key_hash,
        _ => false,
    }
}
