// Copyright (c) 2022-2023 The MobileCoin Foundation

//! The [Engine] implements the Bitcoin applet.
//!
//! This handles [Event] inputs and returns [Output] responses to the caller,
//! see [apdu][crate::apdu] for APDU protocol / encoding specifications.
//!
//! ## Operations
//!
//! Prior to signing, each input of a transaction is certified by streaming
//! the previous transaction via `GetTrustedInput`, returning a MACed
//! [`TrustedInput`][crate::apdu::trusted_input::TrustedInput] blob.
//!
//! Signing then proceeds in passes, each consisting of:
//!
//! 1. `HashInputStart` streaming the inputs (trusted input blobs or, for
//!    segwit transactions, outpoints and amounts)
//! 2. `HashInputFinalizeFull` streaming the outputs, optionally preceded by
//!    the change derivation path
//! 3. `HashSign` returning a DER signature for the input carrying a script
//!
//! The user confirms the transaction on the first `HashSign`, subsequent
//! passes must reproduce the confirmed inputs and outputs.
//!
//! Unlike the other applets, errors only clear the failing sub-context
//! (trusted input generation or signing), the session is retained.

use heapless::String;
use rand_core::CryptoRngCore;
use strum::{Display, EnumIter, EnumString, EnumVariantNames};
use zeroize::Zeroize;

use crate::{
    apdu::{
        aid, btc::SIGHASH_ALL, command::Command, path::DerivationPath, response::Response,
        Instruction, WALLET_APDU_CLA,
    },
    applet::{firmware_version, random, setup, verify_unprovisioned, wallet_precheck, Applet},
    consts::{CONFIRM_TIMEOUT_MS, P2PKH_VERSION, SEED_MAX_LEN, SEED_MIN_LEN},
    helpers::{
        compressed_pubkey, der_encode, hash160, p2pkh_address, sign_low_s,
        uncompressed_pubkey, MAX_ADDRESS_LEN,
    },
    pin::Pin,
    platform::{AppletId, Driver, Request},
    wallet::{Lifecycle, Wallet},
    Error,
};

mod event;
pub use event::Event;

mod function;
pub use function::Function;

mod output;
pub use output::Output;

mod parser;

mod signer;
pub use signer::{Stage, StartMode, TxSigner, TxSummary};

mod trusted_input;
pub use trusted_input::{compute_mac, verify_mac, Progress, TrustedInputGenerator};

/// Engine internal state enumeration
#[derive(Copy, Clone, PartialEq, Debug, EnumString, Display, EnumVariantNames, EnumIter)]
pub enum State {
    /// Idle, no streaming operation running
    Idle,
    /// Receiving a previous transaction
    TrustedInput,
    /// Receiving transaction inputs
    ReceivingInputs,
    /// Receiving transaction outputs
    ReceivingOutputs,
    /// Ready to sign an input
    ReadyToSign,
}

/// [Engine] provides the Bitcoin wallet applet
#[derive(Default)]
pub struct Engine {
    pin: Pin,
    function: Function,
}

impl Engine {
    /// Create a new engine instance
    pub const fn new() -> Self {
        Self {
            pin: Pin::new(),
            function: Function::new(),
        }
    }

    /// Fetch the current engine state
    pub fn state(&self) -> State {
        if self.function.is_trusted_input() {
            return State::TrustedInput;
        }

        match self.function.signer_ref().map(|s| s.stage()) {
            Some(Stage::Inputs) => State::ReceivingInputs,
            Some(Stage::InputsDone | Stage::Outputs) => State::ReceivingOutputs,
            Some(Stage::ReadyToSign) => State::ReadyToSign,
            _ => State::Idle,
        }
    }

    /// Check whether the PIN was verified for this session
    pub fn is_unlocked(&self) -> bool {
        self.pin.is_verified()
    }

    /// Fetch the current transaction summary
    pub fn summary(&self) -> Option<&TxSummary> {
        self.function.signer_ref().map(|s| s.summary())
    }

    /// Clear session state
    pub fn reset(&mut self) {
        self.pin.clear();
        self.function.clear();
    }

    /// Handle incoming events
    pub fn update<DRV: Driver, RNG: CryptoRngCore>(
        &mut self,
        drv: &mut DRV,
        rng: &mut RNG,
        lifecycle: Lifecycle,
        evt: &Event,
    ) -> Result<Output, Error> {
        #[cfg(feature = "log")]
        log::debug!("state: {} lifecycle: {}", self.state(), lifecycle);

        match (lifecycle, evt) {
            (_, Event::None) => Ok(Output::None),

            (_, Event::GetFirmwareVersion) => Ok(Output::FirmwareVersion(firmware_version(
                lifecycle,
                Some(&self.pin),
            ))),

            (_, Event::GetRandom { len }) => Ok(Output::Random(random(rng, *len)?)),

            (Lifecycle::Initialization, Event::Setup { seed, pin }) => {
                setup(
                    drv,
                    AppletId::Bitcoin,
                    rng,
                    seed,
                    pin,
                    SEED_MIN_LEN..=SEED_MAX_LEN,
                    true,
                )?;
                Ok(Output::None)
            }

            (Lifecycle::Operational, Event::VerifyPin { pin }) => {
                let r = self
                    .pin
                    .verify(&mut Wallet::new(drv, AppletId::Bitcoin), pin);

                // Lockout wipes the wallet, nothing in flight survives
                if r == Err(Error::InvalidPin { remaining: 0 }) {
                    self.function.clear();
                }

                r.map(|_| Output::None)
            }

            (Lifecycle::Initialization, Event::VerifyPin { .. }) => {
                verify_unprovisioned(drv, AppletId::Bitcoin)?;
                Ok(Output::None)
            }

            (Lifecycle::Operational, Event::Deinit) => {
                self.reset();
                Ok(Output::None)
            }

            (Lifecycle::Operational, Event::Setup { .. })
            | (Lifecycle::Initialization, _) => Err(Error::UnsupportedInstruction),

            (Lifecycle::Operational, evt) => {
                self.pin.check()?;
                self.update_unlocked(drv, rng, evt)
            }
        }
    }

    /// Handle PIN gated events
    fn update_unlocked<DRV: Driver, RNG: CryptoRngCore>(
        &mut self,
        drv: &mut DRV,
        rng: &mut RNG,
        evt: &Event,
    ) -> Result<Output, Error> {
        match evt {
            Event::GetWalletPublicKey { path, display } => {
                self.wallet_public_key(drv, path, *display)
            }

            Event::GetTrustedInput { index, data } => {
                let r = self.trusted_input(drv, rng, *index, data);
                if r.is_err() {
                    self.function.clear();
                }
                r
            }

            Event::HashInputStart { .. }
            | Event::HashInputFinalizeFull { .. }
            | Event::HashInputChangePath { .. }
            | Event::HashSign { .. } => {
                let r = self.sign(drv, evt);
                if r.is_err() {
                    #[cfg(feature = "log")]
                    log::warn!("signing context cleared");

                    self.function.clear();
                }
                r
            }

            _ => Err(Error::UnsupportedInstruction),
        }
    }

    fn wallet_public_key<DRV: Driver>(
        &mut self,
        drv: &mut DRV,
        path: &DerivationPath,
        display: bool,
    ) -> Result<Output, Error> {
        let xprv = Wallet::new(drv, AppletId::Bitcoin).derive(path.elements())?;

        let key = xprv.private_key();
        let public_key = uncompressed_pubkey(key);

        let mut buff = [0u8; MAX_ADDRESS_LEN];
        let address = p2pkh_address(P2PKH_VERSION, &compressed_pubkey(key), &mut buff)?;

        if display {
            drv.confirm(&Request::Address(address), CONFIRM_TIMEOUT_MS)
                .check()?;
        }

        let mut a = String::new();
        a.push_str(address).map_err(|_| Error::EncodingFailed)?;

        Ok(Output::WalletPublicKey {
            public_key,
            address: a,
            chain_code: xprv.attrs().chain_code,
        })
    }

    fn trusted_input<DRV: Driver, RNG: CryptoRngCore>(
        &mut self,
        drv: &mut DRV,
        rng: &mut RNG,
        index: Option<u32>,
        data: &[u8],
    ) -> Result<Output, Error> {
        let g = match index {
            Some(i) => self.function.trusted_input_init(i),
            None => self.function.trusted_input().ok_or(Error::InvalidState)?,
        };

        if g.feed(data)? == Progress::GiveMoreInput {
            return Ok(Output::None);
        }

        let mut key = Wallet::new(drv, AppletId::Bitcoin).trusted_input_key()?;
        let mut nonce = [0u8; 2];
        rng.fill_bytes(&mut nonce);

        let t = g.trusted_input(nonce, &key);
        key.zeroize();

        self.function.clear();

        Ok(Output::TrustedInput(t?))
    }

    fn sign<DRV: Driver>(&mut self, drv: &mut DRV, evt: &Event) -> Result<Output, Error> {
        match evt {
            Event::HashInputStart {
                mode,
                first_block,
                data,
            } => {
                let mut key = Wallet::new(drv, AppletId::Bitcoin).trusted_input_key()?;

                let s = match *first_block {
                    true => self.function.signer_or_init(),
                    false => self.function.signer().ok_or(Error::InvalidState)?,
                };
                let r = s.start(*mode, *first_block, data, &key);
                key.zeroize();

                r.map(|_| Output::None)
            }

            Event::HashInputChangePath { path } => {
                let xprv = Wallet::new(drv, AppletId::Bitcoin).derive(path.elements())?;
                let h = hash160(&compressed_pubkey(xprv.private_key()));

                let s = self.function.signer().ok_or(Error::InvalidState)?;
                s.set_change(h)?;

                Ok(Output::None)
            }

            Event::HashInputFinalizeFull { last, data } => {
                let s = self.function.signer().ok_or(Error::InvalidState)?;
                s.finalize(*last, data)?;

                match *last {
                    true => Ok(Output::FinalizeStatus),
                    false => Ok(Output::None),
                }
            }

            Event::HashSign {
                path,
                lock_time,
                sighash_type,
            } => {
                if *sighash_type != SIGHASH_ALL {
                    return Err(Error::InvalidData);
                }

                let s = self.function.signer().ok_or(Error::InvalidState)?;
                let digest = s.digest(*lock_time, *sighash_type)?;

                // One confirmation per transaction
                if !s.is_approved() {
                    #[cfg(feature = "log")]
                    log::info!(
                        "requesting approval: {} inputs, {} outputs, fee {}",
                        s.summary().inputs,
                        s.summary().outputs,
                        s.summary().fee()
                    );

                    drv.confirm(&Request::Transaction(s.summary()), CONFIRM_TIMEOUT_MS)
                        .check()?;
                }

                let xprv = Wallet::new(drv, AppletId::Bitcoin).derive(path.elements())?;
                let sig = sign_low_s(xprv.private_key(), &digest)?;
                let der = der_encode(&sig)?;

                s.signed();

                Ok(Output::Signature {
                    der,
                    sighash_type: *sighash_type,
                })
            }

            _ => Err(Error::UnsupportedInstruction),
        }
    }
}

/// Instructions continuing a trusted input or signing context
fn streams_context(ins: u8) -> bool {
    matches!(
        Instruction::try_from(ins),
        Ok(Instruction::GetTrustedInput
            | Instruction::HashInputStart
            | Instruction::HashInputFinalizeFull
            | Instruction::HashSign)
    )
}

impl<DRV: Driver> Applet<DRV> for Engine {
    const ID: AppletId = AppletId::Bitcoin;
    const CLA: u8 = WALLET_APDU_CLA;
    const AID: &'static [u8] = aid::BTC;

    fn precheck(&mut self, drv: &mut DRV) -> Result<Lifecycle, Error> {
        let l = wallet_precheck(drv, AppletId::Bitcoin, &mut self.pin)?;
        if l == Lifecycle::Initialization {
            self.function.clear();
        }
        Ok(l)
    }

    fn handle<RNG: CryptoRngCore>(
        &mut self,
        drv: &mut DRV,
        rng: &mut RNG,
        lifecycle: Lifecycle,
        cmd: &Command,
        resp: &mut Response,
    ) -> Result<(), Error> {
        let evt = match Event::parse(cmd) {
            Ok(e) => e,
            Err(e) => {
                // Malformed blocks abort the trusted input or transaction in progress
                if streams_context(cmd.ins) {
                    #[cfg(feature = "log")]
                    log::warn!("malformed block, context cleared");

                    self.function.clear();
                }
                return Err(e);
            }
        };

        let out = self.update(drv, rng, lifecycle, &evt)?;

        let n = out.encode(resp.tail())?;
        resp.advance(n)?;

        Ok(())
    }

    fn reset(&mut self) {
        Engine::reset(self)
    }

    /// Sub-contexts are cleared by the failing operation, the session is retained
    /// unless the failure is internal
    fn reset_on_error(&self, _err: &Error) -> bool {
        false
    }
}

#[cfg(test)]
mod test {
    use rand::rngs::OsRng;
    use strum::IntoEnumIterator;

    use super::*;
    use crate::platform::{Confirmation, MemStore, Storage, File};

    /// In-memory driver approving every request
    #[derive(Default)]
    struct Approve {
        store: MemStore,
        confirms: usize,
    }

    impl Storage for Approve {
        fn read(&self, file: File, buff: &mut [u8]) -> Result<Option<usize>, Error> {
            self.store.read(file, buff)
        }

        fn write(&mut self, file: File, data: &[u8]) -> Result<(), Error> {
            self.store.write(file, data)
        }

        fn erase(&mut self, file: File) -> Result<(), Error> {
            self.store.erase(file)
        }
    }

    impl Driver for Approve {
        fn confirm(&mut self, _req: &Request<'_>, _timeout_ms: u32) -> Confirmation {
            self.confirms += 1;
            Confirmation::Approved
        }
    }

    fn provisioned() -> (Engine, Approve) {
        let mut e = Engine::new();
        let mut d = Approve::default();

        e.update(
            &mut d,
            &mut OsRng,
            Lifecycle::Initialization,
            &Event::Setup {
                seed: &[0x11; 32],
                pin: b"1234",
            },
        )
        .unwrap();

        (e, d)
    }

    #[test]
    fn states() {
        for s in State::iter() {
            assert_eq!(s.to_string().parse::<State>().unwrap(), s);
        }
        assert_eq!(Engine::new().state(), State::Idle);
    }

    #[test]
    fn pin_gates_wallet_operations() {
        let (mut e, mut d) = provisioned();

        let evt = Event::GetWalletPublicKey {
            path: DerivationPath::new(&[0]).unwrap(),
            display: false,
        };
        assert_eq!(
            e.update(&mut d, &mut OsRng, Lifecycle::Operational, &evt),
            Err(Error::PinRequired)
        );

        e.update(
            &mut d,
            &mut OsRng,
            Lifecycle::Operational,
            &Event::VerifyPin { pin: b"1234" },
        )
        .unwrap();
        assert!(e.is_unlocked());

        match e.update(&mut d, &mut OsRng, Lifecycle::Operational, &evt) {
            Ok(Output::WalletPublicKey { public_key, address, .. }) => {
                assert_eq!(public_key[0], 0x04);
                assert!(address.starts_with('1'));
            }
            r => panic!("unexpected response: {:?}", r),
        }

        e.update(&mut d, &mut OsRng, Lifecycle::Operational, &Event::Deinit)
            .unwrap();
        assert!(!e.is_unlocked());
    }

    #[test]
    fn setup_only_before_operational() {
        let (mut e, mut d) = provisioned();

        let evt = Event::Setup {
            seed: &[0x22; 32],
            pin: b"1234",
        };
        assert_eq!(
            e.update(&mut d, &mut OsRng, Lifecycle::Operational, &evt),
            Err(Error::UnsupportedInstruction)
        );
        assert_eq!(
            e.update(
                &mut d,
                &mut OsRng,
                Lifecycle::Initialization,
                &Event::VerifyPin { pin: b"1234" }
            ),
            Err(Error::UnsupportedInstruction)
        );
    }

    #[test]
    fn trusted_input_errors_clear_context() {
        let (mut e, mut d) = provisioned();
        e.update(
            &mut d,
            &mut OsRng,
            Lifecycle::Operational,
            &Event::VerifyPin { pin: b"1234" },
        )
        .unwrap();

        // Version and zero inputs
        let evt = Event::GetTrustedInput {
            index: Some(0),
            data: &[1, 0, 0, 0, 0],
        };
        assert_eq!(
            e.update(&mut d, &mut OsRng, Lifecycle::Operational, &evt),
            Err(Error::ParsingFailed)
        );
        assert_eq!(e.state(), State::Idle);

        // Continuation without a first block
        let evt = Event::GetTrustedInput {
            index: None,
            data: &[0],
        };
        assert_eq!(
            e.update(&mut d, &mut OsRng, Lifecycle::Operational, &evt),
            Err(Error::InvalidState)
        );
        assert!(e.is_unlocked());
    }

    #[test]
    fn sign_requires_ready_state() {
        let (mut e, mut d) = provisioned();
        e.update(
            &mut d,
            &mut OsRng,
            Lifecycle::Operational,
            &Event::VerifyPin { pin: b"1234" },
        )
        .unwrap();

        let evt = Event::HashSign {
            path: DerivationPath::new(&[0]).unwrap(),
            lock_time: 0,
            sighash_type: SIGHASH_ALL,
        };
        assert_eq!(
            e.update(&mut d, &mut OsRng, Lifecycle::Operational, &evt),
            Err(Error::InvalidState)
        );
        assert_eq!(d.confirms, 0);
    }
}
